// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Corpus build pipeline: CoNLL-U stream → sentence index + lexicon +
//! statistics, in one pass behind a single writer.
//!
//! The pipeline is deterministic: the same input produces byte-identical
//! lexicon and statistics files and the same sentence ids, which is what
//! makes rebuilt collocation counts reproducible.

use std::io::BufRead;
use std::path::Path;

use log::info;

use crate::cancel::CancellationToken;
use crate::conllu::ConlluReader;
use crate::error::{Error, Result};
use crate::index::writer::{IndexWriter, DEFAULT_SEGMENT_DOCS};
use crate::lexicon::{LexiconBuilder, LEXICON_FILE};
use crate::stats::{StatsBuilder, STATS_FILE, STATS_TSV_FILE};

/// Subdirectory holding the sentence index inside a corpus directory.
pub const INDEX_DIR: &str = "index";

/// Build-time knobs.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Sentences per index segment.
    pub segment_docs: u32,
    /// Whether token deprel labels are encoded. Decided once per index and
    /// recorded in the segment headers.
    pub with_deprels: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            segment_docs: DEFAULT_SEGMENT_DOCS,
            with_deprels: true,
        }
    }
}

/// What a finished build processed. Deliberately free of wall-clock data so
/// two identical builds report identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub sentences: u64,
    pub tokens: u64,
    /// Malformed CoNLL-U token lines skipped by the reader.
    pub skipped_lines: u64,
}

/// Build a corpus directory from a CoNLL-U stream.
///
/// Produces `<dir>/index/`, `<dir>/lexicon.bin`, `<dir>/stats.bin` and the
/// `stats.tsv` diagnostic sibling. Cancellation aborts with
/// [`Error::Cancelled`]; already-flushed segments remain on disk.
pub fn build_corpus<R: BufRead>(
    input: R,
    dir: &Path,
    config: &BuildConfig,
    cancel: &CancellationToken,
) -> Result<BuildReport> {
    std::fs::create_dir_all(dir)?;
    let mut writer =
        IndexWriter::with_segment_docs(&dir.join(INDEX_DIR), config.with_deprels, config.segment_docs)?;
    let mut lexicon = LexiconBuilder::new();
    let mut stats = StatsBuilder::new();
    let mut report = BuildReport::default();

    let mut reader = ConlluReader::new(input);
    let mut lemma_ids: Vec<u32> = Vec::new();
    for sentence in &mut reader {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let sentence = sentence?;

        lexicon.record_sentence();
        stats.start_sentence();
        lemma_ids.clear();
        for token in &sentence.tokens {
            let id = lexicon.get_or_assign(&token.lemma)?;
            lexicon.record_occurrence(id, &token.tag);
            stats.record_occurrence(id, &token.tag);
            lemma_ids.push(id);
        }
        writer.append(&sentence, &lemma_ids)?;

        report.sentences += 1;
        report.tokens += sentence.tokens.len() as u64;
    }
    report.skipped_lines = reader.skipped_lines();

    let doc_count = writer.finalize()?;
    lexicon.write(&dir.join(LEXICON_FILE))?;
    stats.write(&dir.join(STATS_FILE), &lexicon)?;
    stats.write_tsv(&dir.join(STATS_TSV_FILE), &lexicon)?;

    info!(
        "built corpus: {} sentences, {} tokens, {} lemmas ({} lines skipped)",
        doc_count,
        report.tokens,
        lexicon.len(),
        report.skipped_lines
    );
    Ok(report)
}
