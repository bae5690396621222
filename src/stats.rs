//! Statistics sidecar: corpus totals plus per-lemma frequency, document
//! frequency and POS distribution.
//!
//! Written once at the end of a build, then memory-mapped read-only. Both
//! query scoring and precompute reduce read from here. A human-readable TSV
//! sibling carries the same information for diagnostics; neither file
//! changes once written.
//!
//! # File layout (little-endian)
//!
//! ```text
//! magic    "CLXT"
//! version  u32
//! total_tokens     u64
//! total_sentences  u64
//! entry_count      u32
//! per lemma id 0..entry_count:
//!   lemma_len u16, lemma utf-8
//!   total_freq u64
//!   doc_freq   u64
//!   tag_count  u16
//!   per tag: tag_len u8, tag utf-8, count u64
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::lexicon::LexiconBuilder;
use crate::types::normalize;
use crate::util::{map_file, write_atomic};

pub const STATS_MAGIC: [u8; 4] = *b"CLXT";
pub const STATS_VERSION: u32 = 1;

pub const STATS_FILE: &str = "stats.bin";
pub const STATS_TSV_FILE: &str = "stats.tsv";

// =============================================================================
// BUILD SIDE
// =============================================================================

/// Accumulates per-lemma statistics during a corpus build.
///
/// Entries are indexed by lemma id, so the builder grows in lockstep with
/// the lexicon.
#[derive(Debug, Default)]
pub struct StatsBuilder {
    entries: Vec<StatEntry>,
    seen_in_sentence: HashSet<u32>,
}

#[derive(Debug, Default, Clone)]
struct StatEntry {
    frequency: u64,
    doc_frequency: u64,
    pos_counts: HashMap<String, u64>,
}

impl StatsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new sentence: resets the per-sentence dedup set used for
    /// document frequency.
    pub fn start_sentence(&mut self) {
        self.seen_in_sentence.clear();
    }

    /// Count one token occurrence of `id` with the given tag.
    pub fn record_occurrence(&mut self, id: u32, tag: &str) {
        if id as usize >= self.entries.len() {
            self.entries.resize(id as usize + 1, StatEntry::default());
        }
        let entry = &mut self.entries[id as usize];
        entry.frequency += 1;
        *entry.pos_counts.entry(tag.to_string()).or_insert(0) += 1;
        if self.seen_in_sentence.insert(id) {
            entry.doc_frequency += 1;
        }
    }

    /// Serialize and atomically publish `stats.bin`; lemma strings and
    /// corpus totals come from the finished lexicon.
    pub fn write(&self, path: &Path, lexicon: &LexiconBuilder) -> Result<()> {
        if self.entries.len() > lexicon.len() {
            return Err(Error::invariant(format!(
                "stats has {} entries but lexicon only {}",
                self.entries.len(),
                lexicon.len()
            )));
        }

        let mut buf = Vec::with_capacity(32 + self.entries.len() * 40);
        buf.extend_from_slice(&STATS_MAGIC);
        buf.extend_from_slice(&STATS_VERSION.to_le_bytes());
        buf.extend_from_slice(&lexicon.total_tokens().to_le_bytes());
        buf.extend_from_slice(&lexicon.total_sentences().to_le_bytes());
        buf.extend_from_slice(&(lexicon.len() as u32).to_le_bytes());

        for id in 0..lexicon.len() as u32 {
            let lemma = lexicon.lemma_of(id).unwrap_or("");
            let entry = self.entries.get(id as usize);
            buf.extend_from_slice(&(lemma.len() as u16).to_le_bytes());
            buf.extend_from_slice(lemma.as_bytes());
            let (freq, doc_freq) = entry
                .map(|e| (e.frequency, e.doc_frequency))
                .unwrap_or((0, 0));
            buf.extend_from_slice(&freq.to_le_bytes());
            buf.extend_from_slice(&doc_freq.to_le_bytes());

            let mut tags: Vec<(&str, u64)> = entry
                .map(|e| {
                    e.pos_counts
                        .iter()
                        .map(|(t, &c)| (t.as_str(), c))
                        .collect()
                })
                .unwrap_or_default();
            tags.sort_by(|a, b| a.0.cmp(b.0));
            buf.extend_from_slice(&(tags.len() as u16).to_le_bytes());
            for (tag, count) in tags {
                let tag = if tag.len() > u8::MAX as usize {
                    &tag[..u8::MAX as usize]
                } else {
                    tag
                };
                buf.push(tag.len() as u8);
                buf.extend_from_slice(tag.as_bytes());
                buf.extend_from_slice(&count.to_le_bytes());
            }
        }

        write_atomic(path, &buf)
    }

    /// Emit the diagnostic TSV sibling: one line per lemma,
    /// `lemma<TAB>freq<TAB>doc_freq<TAB>tag:count,…`.
    pub fn write_tsv(&self, path: &Path, lexicon: &LexiconBuilder) -> Result<()> {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "#total_tokens\t{}\n#total_sentences\t{}",
            lexicon.total_tokens(),
            lexicon.total_sentences()
        );
        for id in 0..lexicon.len() as u32 {
            let lemma = lexicon.lemma_of(id).unwrap_or("");
            let entry = self.entries.get(id as usize);
            let (freq, doc_freq) = entry
                .map(|e| (e.frequency, e.doc_frequency))
                .unwrap_or((0, 0));
            let mut tags: Vec<(&str, u64)> = entry
                .map(|e| {
                    e.pos_counts
                        .iter()
                        .map(|(t, &c)| (t.as_str(), c))
                        .collect()
                })
                .unwrap_or_default();
            tags.sort_by(|a, b| a.0.cmp(b.0));
            let dist: Vec<String> = tags.iter().map(|(t, c)| format!("{t}:{c}")).collect();
            let _ = writeln!(out, "{lemma}\t{freq}\t{doc_freq}\t{}", dist.join(","));
        }
        write_atomic(path, out.as_bytes())
    }
}

// =============================================================================
// READ SIDE
// =============================================================================

/// Read-only, memory-mapped statistics store.
pub struct StatsReader {
    map: Mmap,
    total_tokens: u64,
    total_sentences: u64,
    offsets: Vec<u32>,
    by_lemma: Vec<u32>,
}

const HEADER_LEN: usize = 4 + 4 + 8 + 8 + 4;

impl StatsReader {
    pub fn open(path: &Path) -> Result<Self> {
        let map = map_file(path)?;
        let bytes: &[u8] = &map;
        if bytes.len() < HEADER_LEN {
            return Err(Error::format("stats file shorter than header"));
        }
        if bytes[..4] != STATS_MAGIC {
            return Err(Error::format("bad stats magic"));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap_or_default());
        if version != STATS_VERSION {
            return Err(Error::format(format!("unsupported stats version {version}")));
        }
        let total_tokens = u64::from_le_bytes(bytes[8..16].try_into().unwrap_or_default());
        let total_sentences = u64::from_le_bytes(bytes[16..24].try_into().unwrap_or_default());
        let entry_count = u32::from_le_bytes(bytes[24..28].try_into().unwrap_or_default()) as usize;

        let mut offsets = Vec::with_capacity(entry_count);
        let mut pos = HEADER_LEN;
        for id in 0..entry_count {
            if pos + 2 > bytes.len() {
                return Err(Error::format(format!("stats truncated at entry {id}")));
            }
            offsets.push(pos as u32);
            let lemma_len =
                u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
            pos += 2 + lemma_len + 8 + 8;
            if pos + 2 > bytes.len() {
                return Err(Error::format(format!("stats truncated at entry {id}")));
            }
            let tag_count =
                u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
            pos += 2;
            for _ in 0..tag_count {
                if pos + 1 > bytes.len() {
                    return Err(Error::format(format!("stats truncated at entry {id}")));
                }
                let tag_len = bytes[pos] as usize;
                pos += 1 + tag_len + 8;
            }
            if pos > bytes.len() {
                return Err(Error::format(format!("stats truncated at entry {id}")));
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
        reader.by_lemma = by_lemma;
        Ok(reader)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_sentences(&self) -> u64 {
        self.total_sentences
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn lemma_bytes(&self, id: u32) -> &[u8] {
        let pos = self.offsets[id as usize] as usize;
        let bytes: &[u8] = &self.map;
        let len = u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
        &bytes[pos + 2..pos + 2 + len]
    }

    fn id_of(&self, lemma: &str) -> Option<u32> {
        let key = normalize(lemma);
        self.by_lemma
            .binary_search_by(|&id| self.lemma_bytes(id).cmp(key.as_bytes()))
            .ok()
            .map(|rank| self.by_lemma[rank])
    }

    fn freqs_at(&self, id: u32) -> (u64, u64) {
        let pos = self.offsets[id as usize] as usize;
        let bytes: &[u8] = &self.map;
        let lemma_len =
            u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
        let at = pos + 2 + lemma_len;
        let freq = u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap_or_default());
        let doc_freq = u64::from_le_bytes(bytes[at + 8..at + 16].try_into().unwrap_or_default());
        (freq, doc_freq)
    }

    pub fn frequency_of_id(&self, id: u32) -> u64 {
        if id as usize >= self.offsets.len() {
            return 0;
        }
        self.freqs_at(id).0
    }

    /// Total frequency of a lemma; 0 when absent (a miss is not an error).
    pub fn frequency_of(&self, lemma: &str) -> u64 {
        self.id_of(lemma).map(|id| self.freqs_at(id).0).unwrap_or(0)
    }

    pub fn doc_frequency_of(&self, lemma: &str) -> u64 {
        self.id_of(lemma).map(|id| self.freqs_at(id).1).unwrap_or(0)
    }

    /// POS distribution for a lemma id, tags in lexicographic order.
    pub fn pos_distribution(&self, id: u32) -> Result<Vec<(String, u64)>> {
        if id as usize >= self.offsets.len() {
            return Err(Error::invariant(format!("stats id {id} out of range")));
        }
        let pos = self.offsets[id as usize] as usize;
        let bytes: &[u8] = &self.map;
        let lemma_len =
            u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap_or_default()) as usize;
        let mut at = pos + 2 + lemma_len + 16;
        let tag_count =
            u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap_or_default()) as usize;
        at += 2;
        let mut dist = Vec::with_capacity(tag_count);
        for _ in 0..tag_count {
            let tag_len = bytes[at] as usize;
            let tag = std::str::from_utf8(&bytes[at + 1..at + 1 + tag_len])
                .map_err(|e| Error::format(format!("stats tag not utf-8: {e}")))?
                .to_string();
            at += 1 + tag_len;
            let count = u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap_or_default());
            at += 8;
            dist.push((tag, count));
        }
        Ok(dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_sample() -> (LexiconBuilder, StatsBuilder) {
        let mut lexicon = LexiconBuilder::new();
        let mut stats = StatsBuilder::new();
        let sentences: &[&[(&str, &str)]] = &[
            &[("big", "jj"), ("dog", "nn"), ("run", "vbz")],
            &[("dog", "nn"), ("run", "vbz"), ("run", "vb")],
        ];
        for sentence in sentences {
            lexicon.record_sentence();
            stats.start_sentence();
            for (lemma, tag) in *sentence {
                let id = lexicon.get_or_assign(lemma).unwrap();
                lexicon.record_occurrence(id, tag);
                stats.record_occurrence(id, tag);
            }
        }
        (lexicon, stats)
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATS_FILE);
        let (lexicon, stats) = build_sample();
        stats.write(&path, &lexicon).unwrap();

        let reader = StatsReader::open(&path).unwrap();
        assert_eq!(reader.total_tokens(), 6);
        assert_eq!(reader.total_sentences(), 2);
        assert_eq!(reader.frequency_of("dog"), 2);
        assert_eq!(reader.frequency_of("run"), 3);
        assert_eq!(reader.doc_frequency_of("dog"), 2);
        assert_eq!(reader.doc_frequency_of("big"), 1);
        assert_eq!(reader.frequency_of("absent"), 0);

        let run_id = 2;
        let dist = reader.pos_distribution(run_id).unwrap();
        assert_eq!(dist, vec![("vb".to_string(), 1), ("vbz".to_string(), 2)]);
    }

    #[test]
    fn test_frequency_sum_matches_totals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATS_FILE);
        let (lexicon, stats) = build_sample();
        stats.write(&path, &lexicon).unwrap();
        let reader = StatsReader::open(&path).unwrap();

        let sum: u64 = (0..reader.len() as u32)
            .map(|id| reader.frequency_of_id(id))
            .sum();
        assert_eq!(sum, reader.total_tokens());
    }

    #[test]
    fn test_tsv_sidecar_lists_every_lemma() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATS_TSV_FILE);
        let (lexicon, stats) = build_sample();
        stats.write_tsv(&path, &lexicon).unwrap();

        let tsv = std::fs::read_to_string(&path).unwrap();
        assert!(tsv.contains("dog\t2\t2\tnn:2"));
        assert!(tsv.contains("run\t3\t2\tvb:1,vbz:2"));
        assert!(tsv.starts_with("#total_tokens\t6"));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATS_FILE);
        std::fs::write(&path, b"NOPE0000000000000000000000000000").unwrap();
        assert!(matches!(StatsReader::open(&path), Err(Error::IndexFormat(_))));
    }
}
