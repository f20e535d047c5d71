//! Canonical encoding and majority-vote fingerprinting (§4.6, §6).
//!
//! Both the encryption envelope and the voting fingerprint are built on the
//! same canonical representation of a result: a JSON list of `[key, value]`
//! pairs sorted ascending by key, padded with ASCII spaces to a multiple of
//! 16 bytes. Two replicas that computed the same logical mapping, even if
//! their in-memory iteration order differs, canonicalize identically.

use serde::Deserialize;
use serde::Serialize;

use crate::chunk::compare_keys;
use crate::chunk::Key;
use crate::chunk::Val;

/// A structural fingerprint over a replica's canonicalized result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// AES operates on 16-byte blocks; the source pads to a multiple of 8, but
/// AES-128-CBC (§6) requires 16-byte alignment, so this implementation pads
/// to 16 rather than the source's 8.
const BLOCK_SIZE: usize = 16;

/// Encodes a mapping as the canonical `[["a", 2], ["b", 1]]`-style JSON list,
/// sorted ascending by key and space-padded to a block boundary (§6, §8
/// scenario 6).
pub fn encode_canonical(pairs: &[(Key, Val)]) -> String {
    let mut sorted: Vec<&(Key, Val)> = pairs.iter().collect();
    sorted.sort_by(|(a, _), (b, _)| compare_keys(a, b));
    let list: Vec<serde_json::Value> = sorted
        .into_iter()
        .map(|(k, v)| serde_json::json!([k, v]))
        .collect();
    let mut encoded = serde_json::to_string(&list).expect("JSON values always serialize");
    let remainder = encoded.len() % BLOCK_SIZE;
    if remainder != 0 {
        encoded.extend(std::iter::repeat(' ').take(BLOCK_SIZE - remainder));
    }
    encoded
}

/// Decodes a canonical JSON list back into pairs. Inverse of [`encode_canonical`]
/// once the caller strips any padding beyond the closing `]` (trailing spaces
/// are valid JSON whitespace and `serde_json` ignores them automatically).
pub fn decode_canonical(encoded: &str) -> Result<Vec<(Key, Val)>, serde_json::Error> {
    let list: Vec<(Key, Val)> = serde_json::from_str(encoded)?;
    Ok(list)
}

/// Computes the fingerprint of a replica's result: the `blake3` hash of its
/// canonical encoding.
pub fn fingerprint(pairs: &[(Key, Val)]) -> Fingerprint {
    let canonical = encode_canonical(pairs);
    Fingerprint(*blake3::hash(canonical.as_bytes()).as_bytes())
}

/// Tallies fingerprints from R replicas and returns the index of a replica
/// whose fingerprint won strictly more than R/2 votes, if any (§4.6).
pub fn majority_index(fingerprints: &[Fingerprint]) -> Option<usize> {
    let r = fingerprints.len();
    let mut votes: Vec<(Fingerprint, usize, usize)> = Vec::new(); // (fp, count, first_index)
    for (i, fp) in fingerprints.iter().enumerate() {
        match votes.iter_mut().find(|(seen, _, _)| seen == fp) {
            Some((_, count, _)) => *count += 1,
            None => votes.push((*fp, 1, i)),
        }
    }
    votes
        .into_iter()
        .find(|(_, count, _)| *count * 2 > r)
        .map(|(_, _, first_index)| first_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_encoding_matches_spec_example() {
        let pairs = vec![(Key::from("b"), Val::from(1)), (Key::from("a"), Val::from(2))];
        let encoded = encode_canonical(&pairs);
        assert!(encoded.starts_with(r#"[["a",2],["b",1]]"#));
        assert_eq!(encoded.len() % 16, 0);
    }

    #[test]
    fn canonical_encoding_round_trips() {
        let pairs = vec![(Key::from("a"), Val::from(2)), (Key::from("b"), Val::from(1))];
        let encoded = encode_canonical(&pairs);
        let decoded = decode_canonical(&encoded).unwrap();
        assert_eq!(decoded, pairs);
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = vec![(Key::from("a"), Val::from(1)), (Key::from("b"), Val::from(2))];
        let b = vec![(Key::from("b"), Val::from(2)), (Key::from("a"), Val::from(1))];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn majority_found_with_two_of_three_agreeing() {
        let agree = fingerprint(&[(Key::from("a"), Val::from(1))]);
        let dissent = fingerprint(&[(Key::from("a"), Val::from(2))]);
        let fps = vec![agree, agree, dissent];
        assert_eq!(majority_index(&fps), Some(0));
    }

    #[test]
    fn no_majority_when_all_replicas_disagree() {
        let a = fingerprint(&[(Key::from("a"), Val::from(1))]);
        let b = fingerprint(&[(Key::from("a"), Val::from(2))]);
        let c = fingerprint(&[(Key::from("a"), Val::from(3))]);
        assert_eq!(majority_index(&[a, b, c]), None);
    }
}
