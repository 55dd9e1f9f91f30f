//! Size-capped JSON chunking.
//!
//! Transport files are single JSON objects, `{"key":record,...}`. A
//! corpus partition can hold far more data than one consumer wants to
//! load, so records are split across several objects, each at most
//! [`ChunkPlanner::cap`] bytes once serialized.
//!
//! The byte count of a chunk with entries `e1..ek` is
//! `2 + len(e1) + ... + len(ek) + (k - 1)`: the braces plus one comma
//! between entries. An entry that alone exceeds the cap still gets a
//! chunk of its own rather than being dropped.

use serde::Serialize;

/// Default chunk cap: 100 MiB.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 100 * 1024 * 1024;

/// Where the next entry goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Append to the open chunk.
    Append,
    /// Close the open chunk and start a new one with this entry.
    StartNew,
}

/// Tracks the framed size of the open chunk.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    cap: usize,
    /// Framed size of the open chunk, `0` if it has no entries.
    open_bytes: usize,
    entries: usize,
}

impl ChunkPlanner {
    /// Create a planner with the given byte cap.
    #[must_use]
    pub const fn new(cap: usize) -> Self {
        Self {
            cap,
            open_bytes: 0,
            entries: 0,
        }
    }

    /// Configured cap in bytes.
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.cap
    }

    /// Framed size of the open chunk.
    #[must_use]
    pub const fn open_bytes(&self) -> usize {
        self.open_bytes
    }

    /// Entries in the open chunk.
    #[must_use]
    pub const fn entries(&self) -> usize {
        self.entries
    }

    /// Place an entry of `entry_bytes` serialized bytes.
    ///
    /// A new chunk starts only when the open chunk is non-empty and the
    /// entry plus its comma would push it over the cap.
    pub const fn place(&mut self, entry_bytes: usize) -> Placement {
        if self.entries == 0 {
            self.open_bytes = entry_bytes.saturating_add(2);
            self.entries = 1;
            return Placement::Append;
        }
        let grown = self.open_bytes.saturating_add(entry_bytes).saturating_add(1);
        if grown > self.cap {
            self.open_bytes = entry_bytes.saturating_add(2);
            self.entries = 1;
            Placement::StartNew
        } else {
            self.open_bytes = grown;
            self.entries += 1;
            Placement::Append
        }
    }
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_BYTES)
    }
}

/// Builds capped JSON object strings from `(key, value)` entries.
///
/// ```
/// use houghscan_export::JsonChunker;
///
/// let mut chunker = JsonChunker::new(16);
/// assert!(chunker.push("a", &1).unwrap().is_none());
/// assert!(chunker.push("b", &2).unwrap().is_none());
/// let first = chunker.push("c", &333_333).unwrap();
/// assert_eq!(first.as_deref(), Some(r#"{"a":1,"b":2}"#));
/// assert_eq!(chunker.finish().as_deref(), Some(r#"{"c":333333}"#));
/// ```
#[derive(Debug, Clone)]
pub struct JsonChunker {
    planner: ChunkPlanner,
    open: String,
}

impl JsonChunker {
    /// Create a chunker with the given byte cap.
    #[must_use]
    pub const fn new(cap: usize) -> Self {
        Self {
            planner: ChunkPlanner::new(cap),
            open: String::new(),
        }
    }

    /// Add an entry. Returns the previous chunk, closed, if this entry
    /// did not fit in it.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if `key` or `value` fail to
    /// serialize.
    pub fn push<V: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &V,
    ) -> Result<Option<String>, serde_json::Error> {
        let mut entry = serde_json::to_string(key)?;
        entry.push(':');
        entry.push_str(&serde_json::to_string(value)?);

        match self.planner.place(entry.len()) {
            Placement::StartNew => {
                let mut closed = std::mem::replace(&mut self.open, String::from("{"));
                closed.push('}');
                self.open.push_str(&entry);
                Ok(Some(closed))
            }
            Placement::Append => {
                if self.open.is_empty() {
                    self.open.push('{');
                } else {
                    self.open.push(',');
                }
                self.open.push_str(&entry);
                Ok(None)
            }
        }
    }

    /// Close and return the open chunk, or `None` if nothing was pushed
    /// since the last chunk was handed out.
    #[must_use]
    pub fn finish(mut self) -> Option<String> {
        if self.open.is_empty() {
            return None;
        }
        self.open.push('}');
        Some(self.open)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    /// Push every `(key, value)` and collect all chunks.
    fn chunk_all(cap: usize, entries: &[(String, String)]) -> Vec<String> {
        let mut chunker = JsonChunker::new(cap);
        let mut chunks = Vec::new();
        for (k, v) in entries {
            if let Some(done) = chunker.push(k, v).unwrap() {
                chunks.push(done);
            }
        }
        chunks.extend(chunker.finish());
        chunks
    }

    fn entries(sizes: &[usize]) -> Vec<(String, String)> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| (format!("k{i}"), "x".repeat(n)))
            .collect()
    }

    #[test]
    fn planner_counts_braces_and_commas() {
        let mut planner = ChunkPlanner::new(20);
        assert_eq!(planner.place(8), Placement::Append);
        assert_eq!(planner.open_bytes(), 10);
        assert_eq!(planner.place(9), Placement::Append);
        assert_eq!(planner.open_bytes(), 20);
        assert_eq!(planner.entries(), 2);
        assert_eq!(planner.place(1), Placement::StartNew);
        assert_eq!(planner.open_bytes(), 3);
    }

    #[test]
    fn oversized_entry_gets_its_own_chunk() {
        let mut planner = ChunkPlanner::new(10);
        assert_eq!(planner.place(50), Placement::Append);
        assert_eq!(planner.place(1), Placement::StartNew);
        assert_eq!(planner.place(60), Placement::StartNew);
        assert_eq!(planner.entries(), 1);
    }

    #[test]
    fn no_entries_no_chunks() {
        assert!(chunk_all(100, &[]).is_empty());
        assert_eq!(ChunkPlanner::default().cap(), DEFAULT_MAX_CHUNK_BYTES);
    }

    #[test]
    fn chunks_respect_cap_and_keep_every_entry() {
        let cap = 120;
        let sizes = [10, 40, 3, 70, 90, 1, 1, 1, 55, 200, 5, 30, 30, 30];
        let input = entries(&sizes);
        let chunks = chunk_all(cap, &input);
        assert!(chunks.len() > 1);

        let mut seen = BTreeMap::new();
        for chunk in &chunks {
            let object: BTreeMap<String, String> = serde_json::from_str(chunk).unwrap();
            assert!(
                chunk.len() <= cap || object.len() == 1,
                "chunk of {} bytes with {} entries exceeds cap",
                chunk.len(),
                object.len(),
            );
            seen.extend(object);
        }
        let expected: BTreeMap<String, String> = input.into_iter().collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn chunk_that_exactly_fills_cap_is_kept_whole() {
        // `{"k0":"xx"}` is 11 bytes, two such entries make 21.
        let input = entries(&[2, 2]);
        let chunks = chunk_all(21, &input);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 21);
        assert_eq!(chunk_all(20, &input).len(), 2);
    }

    #[test]
    fn keys_are_json_escaped() {
        let mut chunker = JsonChunker::new(1024);
        chunker.push("a\"b", &1).unwrap();
        let chunk = chunker.finish().unwrap();
        let object: BTreeMap<String, u8> = serde_json::from_str(&chunk).unwrap();
        assert_eq!(object["a\"b"], 1);
    }
}
