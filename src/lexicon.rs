//! The lexicon: a bijection between lemma strings and dense integer ids.
//!
//! Built once during indexing, frozen on completion, then memory-mapped
//! read-only for the life of the engine. Ids are assigned in first-seen
//! order starting at 0 and are stable for the lifetime of one index; a
//! rebuild may reassign.
//!
//! # File layout (little-endian)
//!
//! ```text
//! magic    "CLXL"
//! version  u32
//! total_tokens     u64
//! total_sentences  u64
//! entry_count      u32
//! per id 0..entry_count:
//!   lemma_len  u16, lemma utf-8
//!   total_freq u64
//!   pos_len    u8, most-frequent-pos utf-8
//! ```

use std::collections::HashMap;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::types::normalize;
use crate::util::{map_file, write_atomic};

pub const LEXICON_MAGIC: [u8; 4] = *b"CLXL";
pub const LEXICON_VERSION: u32 = 1;

/// Default lexicon filename inside an index directory.
pub const LEXICON_FILE: &str = "lexicon.bin";

// =============================================================================
// BUILD SIDE
// =============================================================================

/// Mutable lexicon used during a corpus build.
#[derive(Debug, Default)]
pub struct LexiconBuilder {
    ids: HashMap<String, u32>,
    entries: Vec<BuildEntry>,
    total_tokens: u64,
    total_sentences: u64,
}

#[derive(Debug, Default)]
struct BuildEntry {
    lemma: String,
    frequency: u64,
    pos_counts: HashMap<String, u64>,
}

impl LexiconBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a stable id for a normalized lemma, assigning the next dense
    /// id on first sight.
    pub fn get_or_assign(&mut self, lemma: &str) -> Result<u32> {
        let key = normalize(lemma);
        if let Some(&id) = self.ids.get(&key) {
            return Ok(id);
        }
        if key.len() > u16::MAX as usize {
            return Err(Error::invariant(format!(
                "lemma exceeds {} bytes: {}…",
                u16::MAX,
                &key[..32.min(key.len())]
            )));
        }
        let id = self.entries.len() as u32;
        self.entries.push(BuildEntry {
            lemma: key.clone(),
            ..BuildEntry::default()
        });
        self.ids.insert(key, id);
        Ok(id)
    }

    /// Count one occurrence of `id` with the given tag.
    pub fn record_occurrence(&mut self, id: u32, tag: &str) {
        self.total_tokens += 1;
        let entry = &mut self.entries[id as usize];
        entry.frequency += 1;
        *entry.pos_counts.entry(tag.to_string()).or_insert(0) += 1;
    }

    pub fn record_sentence(&mut self) {
        self.total_sentences += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_sentences(&self) -> u64 {
        self.total_sentences
    }

    pub fn frequency_of_id(&self, id: u32) -> u64 {
        self.entries
            .get(id as usize)
            .map(|e| e.frequency)
            .unwrap_or(0)
    }

    pub fn lemma_of(&self, id: u32) -> Option<&str> {
        self.entries.get(id as usize).map(|e| e.lemma.as_str())
    }

    /// Most frequent tag for an id; ties resolve to the lexicographically
    /// smallest tag so builds stay deterministic.
    fn most_frequent_pos(entry: &BuildEntry) -> &str {
        entry
            .pos_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(tag, _)| tag.as_str())
            .unwrap_or("")
    }

    /// Serialize and atomically publish the frozen lexicon.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::with_capacity(32 + self.entries.len() * 24);
        buf.extend_from_slice(&LEXICON_MAGIC);
        buf.extend_from_slice(&LEXICON_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.total_tokens.to_le_bytes());
        buf.extend_from_slice(&self.total_sentences.to_le_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());

        for entry in &self.entries {
            buf.extend_from_slice(&(entry.lemma.len() as u16).to_le_bytes());
            buf.extend_from_slice(entry.lemma.as_bytes());
            buf.extend_from_slice(&entry.frequency.to_le_bytes());
            let pos = Self::most_frequent_pos(entry);
            let pos = if pos.len() > u8::MAX as usize {
                &pos[..u8::MAX as usize]
            } else {
                pos
            };
            buf.push(pos.len() as u8);
            buf.extend_from_slice(pos.as_bytes());
        }

        write_atomic(path, &buf)
    }
}

// =============================================================================
// READ SIDE
// =============================================================================

/// Read-only, memory-mapped lexicon. String accessors borrow from the map.
pub struct LexiconReader {
    map: Mmap,
    total_tokens: u64,
    total_sentences: u64,
    /// Byte offset of each entry, indexed by id.
    offsets: Vec<u32>,
    /// Ids sorted by lemma string, for binary-search lookup by string.
    by_lemma: Vec<u32>,
}

const HEADER_LEN: usize = 4 + 4 + 8 + 8 + 4;

impl LexiconReader {
    pub fn open(path: &Path) -> Result<Self> {
        let map = map_file(path)?;
        Self::from_map(map)
    }

    fn from_map(map: Mmap) -> Result<Self> {
        let bytes: &[u8] = &map;
        if bytes.len() < HEADER_LEN {
            return Err(Error::format("lexicon file shorter than header"));
        }
        if bytes[..4] != LEXICON_MAGIC {
            return Err(Error::format("bad lexicon magic"));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap_or_default());
        if version != LEXICON_VERSION {
            return Err(Error::format(format!(
                "unsupported lexicon version {version}"
            )));
        }
        let total_tokens = u64::from_le_bytes(bytes[8..16].try_into().unwrap_or_default());
        let total_sentences = u64::from_le_bytes(bytes[16..24].try_into().unwrap_or_default());
        let entry_count = u32::from_le_bytes(bytes[24..28].try_into().unwrap_or_default()) as usize;

        let mut offsets = Vec::with_capacity(entry_count);
        let mut pos = HEADER_LEN;
        for id in 0..entry_count {
            if pos + 2 > bytes.len() {
                return Err(Error::format(format!("lexicon truncated at entry {id}")));
            }
            offsets.push(pos as u32);
            let lemma_len =
                u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
            pos += 2 + lemma_len + 8;
            if pos + 1 > bytes.len() {
                return Err(Error::format(format!("lexicon truncated at entry {id}")));
            }
            let pos_len = bytes[pos] as usize;
            pos += 1 + pos_len;
            if pos > bytes.len() {
                return Err(Error::format(format!("lexicon truncated at entry {id}")));
            }
        }

        let mut reader = Self {
            map,
            total_tokens,
            total_sentences,
            offsets,
            by_lemma: Vec::new(),
        };

        let mut by_lemma: Vec<u32> = (0..entry_count as u32).collect();
        by_lemma.sort_by(|&a, &b| reader.lemma_bytes(a).cmp(reader.lemma_bytes(b)));
        for pair in by_lemma.windows(2) {
            if reader.lemma_bytes(pair[0]) == reader.lemma_bytes(pair[1]) {
                return Err(Error::format(format!(
                    "duplicate lexicon entry for \"{}\"",
                    String::from_utf8_lossy(reader.lemma_bytes(pair[0]))
                )));
            }
        }
        reader.by_lemma = by_lemma;
        Ok(reader)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_sentences(&self) -> u64 {
        self.total_sentences
    }

    fn lemma_bytes(&self, id: u32) -> &[u8] {
        let pos = self.offsets[id as usize] as usize;
        let bytes: &[u8] = &self.map;
        let len = u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
        &bytes[pos + 2..pos + 2 + len]
    }

    /// The lemma string for an id. O(1) via the offset array; the returned
    /// view borrows from the map.
    pub fn lemma_of(&self, id: u32) -> Result<&str> {
        if id as usize >= self.offsets.len() {
            return Err(Error::invariant(format!(
                "lemma id {id} out of range ({} entries)",
                self.offsets.len()
            )));
        }
        std::str::from_utf8(self.lemma_bytes(id))
            .map_err(|e| Error::format(format!("lexicon entry {id} not utf-8: {e}")))
    }

    /// The id for a lemma string, if present.
    pub fn id_of(&self, lemma: &str) -> Option<u32> {
        let key = normalize(lemma);
        self.by_lemma
            .binary_search_by(|&id| self.lemma_bytes(id).cmp(key.as_bytes()))
            .ok()
            .map(|rank| self.by_lemma[rank])
    }

    pub fn frequency_of_id(&self, id: u32) -> u64 {
        let Some(&off) = self.offsets.get(id as usize) else {
            return 0;
        };
        let pos = off as usize;
        let bytes: &[u8] = &self.map;
        let lemma_len =
            u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
        let freq_pos = pos + 2 + lemma_len;
        u64::from_le_bytes(bytes[freq_pos..freq_pos + 8].try_into().unwrap_or_default())
    }

    /// Total frequency of a lemma; 0 when absent.
    pub fn frequency_of(&self, lemma: &str) -> u64 {
        self.id_of(lemma)
            .map(|id| self.frequency_of_id(id))
            .unwrap_or(0)
    }

    /// Most-frequent POS tag recorded for an id.
    pub fn most_frequent_pos_of(&self, id: u32) -> Result<&str> {
        if id as usize >= self.offsets.len() {
            return Err(Error::invariant(format!("lemma id {id} out of range")));
        }
        let pos = self.offsets[id as usize] as usize;
        let bytes: &[u8] = &self.map;
        let lemma_len =
            u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
        let pos_len_at = pos + 2 + lemma_len + 8;
        let pos_len = bytes[pos_len_at] as usize;
        std::str::from_utf8(&bytes[pos_len_at + 1..pos_len_at + 1 + pos_len])
            .map_err(|e| Error::format(format!("lexicon entry {id} pos not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_sample() -> LexiconBuilder {
        let mut builder = LexiconBuilder::new();
        for (lemma, tag) in [
            ("dog", "nn"),
            ("run", "vbz"),
            ("dog", "nn"),
            ("big", "jj"),
            ("dog", "nnp"),
        ] {
            let id = builder.get_or_assign(lemma).unwrap();
            builder.record_occurrence(id, tag);
        }
        builder.record_sentence();
        builder.record_sentence();
        builder
    }

    #[test]
    fn test_ids_assigned_in_first_seen_order() {
        let mut builder = LexiconBuilder::new();
        assert_eq!(builder.get_or_assign("zebra").unwrap(), 0);
        assert_eq!(builder.get_or_assign("Apple").unwrap(), 1);
        assert_eq!(builder.get_or_assign("zebra").unwrap(), 0);
        assert_eq!(builder.get_or_assign("apple").unwrap(), 1);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEXICON_FILE);
        let builder = build_sample();
        builder.write(&path).unwrap();

        let reader = LexiconReader::open(&path).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.total_tokens(), 5);
        assert_eq!(reader.total_sentences(), 2);
        assert_eq!(reader.lemma_of(0).unwrap(), "dog");
        assert_eq!(reader.lemma_of(1).unwrap(), "run");
        assert_eq!(reader.lemma_of(2).unwrap(), "big");
        assert_eq!(reader.frequency_of("dog"), 3);
        assert_eq!(reader.frequency_of("DOG"), 3);
        assert_eq!(reader.frequency_of("missing"), 0);
        assert_eq!(reader.most_frequent_pos_of(0).unwrap(), "nn");
        assert_eq!(reader.id_of("big"), Some(2));
        assert_eq!(reader.id_of("cat"), None);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEXICON_FILE);
        std::fs::write(&path, b"XXXX0000000000000000000000000000").unwrap();
        assert!(matches!(
            LexiconReader::open(&path),
            Err(Error::IndexFormat(_))
        ));
    }

    #[test]
    fn test_oversized_lemma_is_invariant_error() {
        let mut builder = LexiconBuilder::new();
        let huge = "x".repeat(70_000);
        assert!(matches!(
            builder.get_or_assign(&huge),
            Err(Error::Invariant(_))
        ));
    }
}
