//! The data model shared between foreman and worker: opaque keyed data, and
//! the chunks carved out of it for a single task.

use serde::Deserialize;
use serde::Serialize;

/// An opaque identifier. Keys and values both travel as JSON so that the
/// canonical encoding used for voting and encryption (see [`crate::vote`])
/// never has to reinterpret a foreign wire format. `serde_json::Value` has no
/// `Ord` impl (a `Number` may hold an `f64`), so key spaces are kept sorted
/// and looked up with [`compare_keys`] rather than a `BTreeMap`/`HashMap`.
pub type Key = serde_json::Value;
pub type Val = serde_json::Value;

/// A read-only, iterable mapping from opaque keys to values, sorted
/// ascending by [`compare_keys`]. Constructed by the caller and held for the
/// lifetime of one job.
#[derive(Debug, Clone, Default)]
pub struct DataSource {
    data: Vec<(Key, Val)>,
}

impl DataSource {
    pub fn new(mut data: Vec<(Key, Val)>) -> Self {
        data.sort_by(|(a, _), (b, _)| compare_keys(a, b));
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Val)> {
        self.data.iter().map(|(k, v)| (k, v))
    }
}

impl FromIterator<(Key, Val)> for DataSource {
    fn from_iter<T: IntoIterator<Item = (Key, Val)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Orders two JSON keys so that key spaces without a native `Ord` (they
/// travel as `serde_json::Value`) can still be sorted and looked up
/// deterministically. Same-typed keys compare naturally; differently-typed
/// keys fall back to comparing their serialized form, which is stable but
/// arbitrary (mixed-type key spaces are not expected in practice).
pub fn compare_keys(a: &Key, b: &Key) -> std::cmp::Ordering {
    use serde_json::Value;
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Finds the value for `key` in an ordered key/value sequence (as carried by
/// [`DataSource`] or a job's reduced output), without requiring `Key: Ord`.
pub fn find<'a>(pairs: &'a [(Key, Val)], key: &Key) -> Option<&'a Val> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Inserts or overwrites `key`'s value, preserving the position of an
/// existing entry (last write wins, mirroring `BTreeMap::insert`'s
/// replace-in-place semantics without requiring `Key: Ord`).
pub fn upsert(pairs: &mut Vec<(Key, Val)>, key: Key, value: Val) {
    match pairs.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => pairs.push((key, value)),
    }
}

/// An ordered sequence of (K, V) pairs carved from a [`DataSource`].
pub type Chunk = Vec<(Key, Val)>;

/// Groups a chunk by key for the reduce phase: `K -> [V]`.
pub type GroupedChunk = Vec<(Key, Vec<Val>)>;

/// Produces a lazy sequence of input chunks from a [`DataSource`].
///
/// `rows` controls how many pairs go into each chunk (default 1). Iteration
/// order follows the data source's iteration order. Restartable by
/// constructing a fresh chunker over the same source.
pub struct DataChunker<'a> {
    inner: std::slice::Iter<'a, (Key, Val)>,
    rows: usize,
    done: bool,
}

impl<'a> DataChunker<'a> {
    pub fn new(data: &'a DataSource, rows: usize) -> Self {
        assert!(rows > 0, "chunk size must be at least 1");
        Self {
            inner: data.data.iter(),
            rows,
            done: false,
        }
    }

    /// Whether the chunker has yielded its final, possibly-partial chunk.
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl<'a> Iterator for DataChunker<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let chunk: Chunk = self
            .inner
            .by_ref()
            .take(self.rows)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if chunk.is_empty() {
            self.done = true;
            return None;
        }
        if chunk.len() < self.rows {
            self.done = true;
        }
        Some(chunk)
    }
}

/// Groups a map-phase chunk's output pairs by key, concatenating values for
/// repeated keys — the per-replica reducer of §4.8 (`K' -> tuple(V')`).
pub fn group_by_key(pairs: Vec<(Key, Val)>) -> GroupedChunk {
    let mut grouped: Vec<(Key, Vec<Val>)> = Vec::new();
    for (k, v) in pairs {
        match grouped.iter_mut().find(|(gk, _)| *gk == k) {
            Some((_, values)) => values.push(v),
            None => grouped.push((k, vec![v])),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(n: usize) -> DataSource {
        (0..n)
            .map(|i| (Key::from(i as i64), Val::from(format!("row-{i}"))))
            .collect()
    }

    #[test]
    fn default_chunk_size_is_one_row() {
        let ds = source(3);
        let chunks: Vec<_> = DataChunker::new(&ds, 1).collect();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn chunker_handles_uneven_final_chunk() {
        let ds = source(5);
        let mut chunker = DataChunker::new(&ds, 2);
        let chunks: Vec<_> = chunker.by_ref().collect();
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert!(chunker.is_done());
    }

    #[test]
    fn chunking_commutativity() {
        let ds = source(7);
        let one_row: Vec<_> = DataChunker::new(&ds, 1).flatten().collect();
        let seven_rows: Vec<_> = DataChunker::new(&ds, 7).flatten().collect();
        assert_eq!(one_row, seven_rows);
    }

    #[test]
    fn upsert_replaces_in_place_and_appends_new_keys() {
        let mut pairs = vec![(Key::from("a"), Val::from(1)), (Key::from("b"), Val::from(2))];
        upsert(&mut pairs, Key::from("a"), Val::from(9));
        upsert(&mut pairs, Key::from("c"), Val::from(3));
        assert_eq!(
            pairs,
            vec![
                (Key::from("a"), Val::from(9)),
                (Key::from("b"), Val::from(2)),
                (Key::from("c"), Val::from(3)),
            ]
        );
    }

    #[test]
    fn find_looks_up_by_key_equality() {
        let pairs = vec![(Key::from("a"), Val::from(1)), (Key::from("b"), Val::from(2))];
        assert_eq!(find(&pairs, &Key::from("b")), Some(&Val::from(2)));
        assert_eq!(find(&pairs, &Key::from("z")), None);
    }

    #[test]
    fn data_source_sorts_on_construction() {
        let ds = DataSource::new(vec![
            (Key::from("b"), Val::from(2)),
            (Key::from("a"), Val::from(1)),
        ]);
        let keys: Vec<&Key> = ds.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&Key::from("a"), &Key::from("b")]);
    }

    #[test]
    fn group_by_key_concatenates_values() {
        let pairs = vec![
            (Key::from("a"), Val::from(1)),
            (Key::from("b"), Val::from(2)),
            (Key::from("a"), Val::from(3)),
        ];
        let grouped = group_by_key(pairs);
        assert_eq!(
            grouped,
            vec![
                (Key::from("a"), vec![Val::from(1), Val::from(3)]),
                (Key::from("b"), vec![Val::from(2)]),
            ]
        );
    }
}
