//! Single-writer append path for the sentence index.
//!
//! Sentences stream in build order; the writer accumulates them into an
//! in-memory segment and flushes to disk when the segment reaches its
//! budget. A JSON manifest lists the sealed segments and is replaced
//! write-then-rename after every flush, so an interrupted build leaves a
//! readable index of everything flushed so far.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::codec::{encode_lemma_ids, encode_tokens};
use crate::error::{Error, Result};
use crate::index::segment::{field_code, FormatFlags, SegmentBuilder, SegmentDoc};
use crate::types::{Field, Sentence};
use crate::util::write_atomic;

pub const MANIFEST_FILE: &str = "index.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Default number of sentences per segment.
pub const DEFAULT_SEGMENT_DOCS: u32 = 4096;

/// On-disk index manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub has_deprels: bool,
    pub doc_count: u32,
    pub segments: Vec<SegmentMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub file: String,
    pub base_doc_id: u32,
    pub doc_count: u32,
}

impl IndexManifest {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)?;
        let manifest: IndexManifest = serde_json::from_str(&content)
            .map_err(|e| Error::format(format!("invalid index manifest: {e}")))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::format(format!(
                "unsupported index manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    fn store(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::invariant(format!("manifest serialization failed: {e}")))?;
        write_atomic(&dir.join(MANIFEST_FILE), json.as_bytes())
    }
}

/// Serialized single-writer appender. Sentence ids must arrive in strict
/// insertion order starting at 0.
pub struct IndexWriter {
    dir: PathBuf,
    has_deprels: bool,
    segment_docs: u32,
    current: SegmentBuilder,
    manifest: IndexManifest,
}

impl IndexWriter {
    /// Create a writer over an empty directory. `has_deprels` is decided
    /// once per index and recorded in every segment header.
    pub fn create(dir: &Path, has_deprels: bool) -> Result<Self> {
        Self::with_segment_docs(dir, has_deprels, DEFAULT_SEGMENT_DOCS)
    }

    pub fn with_segment_docs(dir: &Path, has_deprels: bool, segment_docs: u32) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let manifest = IndexManifest {
            version: MANIFEST_VERSION,
            has_deprels,
            doc_count: 0,
            segments: Vec::new(),
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            has_deprels,
            segment_docs: segment_docs.max(1),
            current: SegmentBuilder::new(0, FormatFlags::new().with_deprels(has_deprels)),
            manifest,
        })
    }

    pub fn doc_count(&self) -> u32 {
        self.manifest.doc_count + self.current.doc_count()
    }

    /// Append one sentence with its lemma-id column.
    ///
    /// Enforces the id invariants: insertion order, and token count equal to
    /// the lemma-id count.
    pub fn append(&mut self, sentence: &Sentence, lemma_ids: &[u32]) -> Result<()> {
        let expected = self.doc_count();
        if sentence.id != expected {
            return Err(Error::invariant(format!(
                "sentence id {} out of order, expected {expected}",
                sentence.id
            )));
        }
        if sentence.tokens.len() != lemma_ids.len() {
            return Err(Error::invariant(format!(
                "sentence {} has {} tokens but {} lemma ids",
                sentence.id,
                sentence.tokens.len(),
                lemma_ids.len()
            )));
        }

        let mut terms = Vec::with_capacity(sentence.tokens.len() * 3);
        for token in &sentence.tokens {
            // Terms are normalized at index time; every comparison in the
            // engine is case-insensitive.
            push_term(&mut terms, Field::Lemma, &token.lemma, token.position);
            push_term(
                &mut terms,
                Field::Word,
                &token.word.to_lowercase(),
                token.position,
            );
            push_term(&mut terms, Field::Tag, &token.tag, token.position);
            if self.has_deprels {
                if let Some(deprel) = &token.deprel {
                    push_term(&mut terms, Field::Deprel, deprel, token.position);
                }
            }
        }

        let mut tokens_blob = Vec::new();
        encode_tokens(&sentence.tokens, self.has_deprels, &mut tokens_blob);
        let mut lemma_ids_blob = Vec::new();
        encode_lemma_ids(lemma_ids, &mut lemma_ids_blob);

        self.current.add(SegmentDoc {
            terms,
            tokens_blob,
            lemma_ids_blob,
            text: sentence.text.clone(),
        });

        if self.current.doc_count() >= self.segment_docs {
            self.flush_segment()?;
        }
        Ok(())
    }

    fn flush_segment(&mut self) -> Result<()> {
        if self.current.is_empty() {
            return Ok(());
        }
        let base = self.current.base_doc_id();
        let docs = self.current.doc_count();
        let next_base = base + docs;
        let builder = std::mem::replace(
            &mut self.current,
            SegmentBuilder::new(next_base, FormatFlags::new().with_deprels(self.has_deprels)),
        );
        let bytes = builder.finish();
        let file = format!("seg-{:05}.clxs", self.manifest.segments.len());
        write_atomic(&self.dir.join(&file), &bytes)?;
        info!("sealed segment {file}: {docs} sentences from id {base}");

        self.manifest.segments.push(SegmentMeta {
            file,
            base_doc_id: base,
            doc_count: docs,
        });
        self.manifest.doc_count = next_base;
        self.manifest.store(&self.dir)
    }

    /// Seal the final segment and publish the manifest. Returns the total
    /// sentence count.
    pub fn finalize(mut self) -> Result<u32> {
        self.flush_segment()?;
        self.manifest.store(&self.dir)?;
        Ok(self.manifest.doc_count)
    }
}

fn push_term(terms: &mut Vec<(u8, String, u32)>, field: Field, value: &str, position: u32) {
    if value.is_empty() {
        return;
    }
    if let Some(code) = field_code(field) {
        terms.push((code, value.to_string(), position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Token;

    fn sentence(id: u32, words: &[&str]) -> (Sentence, Vec<u32>) {
        let tokens: Vec<Token> = words
            .iter()
            .enumerate()
            .map(|(i, w)| Token {
                position: i as u32,
                word: w.to_string(),
                lemma: w.to_lowercase(),
                tag: "nn".into(),
                start: 0,
                end: w.len() as u32,
                deprel: None,
            })
            .collect();
        let ids = (0..words.len() as u32).collect();
        (
            Sentence {
                id,
                text: words.join(" "),
                tokens,
            },
            ids,
        )
    }

    #[test]
    fn test_append_enforces_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::create(dir.path(), false).unwrap();
        let (s0, ids0) = sentence(0, &["a"]);
        writer.append(&s0, &ids0).unwrap();
        let (bad, bad_ids) = sentence(5, &["b"]);
        assert!(matches!(
            writer.append(&bad, &bad_ids),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn test_append_enforces_column_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::create(dir.path(), false).unwrap();
        let (s0, _) = sentence(0, &["a", "b"]);
        assert!(matches!(writer.append(&s0, &[1]), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_segments_roll_over_at_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::with_segment_docs(dir.path(), false, 2).unwrap();
        for id in 0..5u32 {
            let (s, ids) = sentence(id, &["tok"]);
            writer.append(&s, &ids).unwrap();
        }
        let total = writer.finalize().unwrap();
        assert_eq!(total, 5);

        let manifest = IndexManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.doc_count, 5);
        assert_eq!(manifest.segments.len(), 3);
        assert_eq!(manifest.segments[1].base_doc_id, 2);
        assert_eq!(manifest.segments[2].doc_count, 1);
    }
}
