//! The word-count program shipped with this crate, grounded on
//! `examples/original_source/example.py` and `mobydick.py`'s `mapfn`/`reducefn`
//! pair (split a line into words, count occurrences per word).

use anyhow::Context;
use mr_messages::Key;
use mr_messages::Val;

use crate::program::MapFn;
use crate::program::ProgramEntry;
use crate::program::ReduceFn;

pub const PROGRAM_ID: &str = "builtin.wordcount";

/// The only capability this program needs: splitting a text value on
/// whitespace. Named as a capability (not silently assumed) so a descriptor
/// must opt in, per §4.2's allow-list model.
const REQUIRED_CAPABILITIES: &[&str] = &["text.split_whitespace"];

struct WordCountMap;

impl MapFn for WordCountMap {
    fn call(&self, _key: &Key, value: &Val) -> anyhow::Result<Vec<(Key, Val)>> {
        let text = value
            .as_str()
            .with_context(|| format!("wordcount map expects a string value, got {value}"))?;
        Ok(text
            .split_whitespace()
            .map(|word| (Key::from(word), Val::from(1)))
            .collect())
    }
}

struct WordCountReduce;

impl ReduceFn for WordCountReduce {
    fn call(&self, key: &Key, values: &[Val]) -> anyhow::Result<(Key, Val)> {
        let mut total: i64 = 0;
        for v in values {
            total += v
                .as_i64()
                .with_context(|| format!("wordcount reduce expects integer values, got {v}"))?;
        }
        Ok((key.clone(), Val::from(total)))
    }
}

pub fn entry() -> ProgramEntry {
    ProgramEntry {
        map: Box::new(WordCountMap),
        reduce: Box::new(WordCountReduce),
        required_capabilities: REQUIRED_CAPABILITIES,
    }
}
