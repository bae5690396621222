//! Read side of the sentence index: memory-mapped segments, postings
//! iteration, and distance-constrained positional (span) queries.
//!
//! All segments are mapped read-only and shared freely among query tasks;
//! nothing here takes a lock.

use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::codec::{decode_lemma_ids_into, decode_tokens};
use crate::error::{Error, Result};
use crate::index::segment::{DocColumns, SegmentView};
use crate::index::writer::IndexManifest;
use crate::types::{Field, Sentence};
use crate::util::map_file;

// =============================================================================
// SPAN QUERIES
// =============================================================================

/// Selects the token positions one pattern element contributes to a span
/// query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermSelector {
    /// Exact term in a field.
    Exact { field: Field, value: String },
    /// Any of several exact terms (value alternation).
    OneOf { field: Field, values: Vec<String> },
    /// Any term sharing a prefix (glob with a literal stem).
    Prefix { field: Field, prefix: String },
    /// Any term sharing one of several prefixes (POS classes).
    Prefixes { field: Field, prefixes: Vec<String> },
}

/// A positional candidate query: every selector must occur within `window`
/// token positions; `ordered` additionally requires selector order to match
/// text order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanSpec {
    pub selectors: Vec<TermSelector>,
    pub window: u32,
    pub ordered: bool,
}

/// One matching sentence with the span's token extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanMatch {
    pub doc_id: u32,
    pub start: u32,
    pub end: u32,
}

// =============================================================================
// READER
// =============================================================================

/// Read-only view over a built sentence index.
pub struct IndexReader {
    #[allow(dead_code)]
    dir: PathBuf,
    manifest: IndexManifest,
    segments: Vec<SegmentView<Mmap>>,
}

impl IndexReader {
    pub fn open(dir: &Path) -> Result<Self> {
        let manifest = IndexManifest::load(dir)?;
        let mut segments = Vec::with_capacity(manifest.segments.len());
        for meta in &manifest.segments {
            let map = map_file(&dir.join(&meta.file))?;
            let segment = SegmentView::open(map)?;
            if segment.base_doc_id() != meta.base_doc_id
                || segment.doc_count() != meta.doc_count
            {
                return Err(Error::format(format!(
                    "segment {} disagrees with manifest",
                    meta.file
                )));
            }
            segments.push(segment);
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            segments,
        })
    }

    pub fn doc_count(&self) -> u32 {
        self.manifest.doc_count
    }

    pub fn has_deprels(&self) -> bool {
        self.manifest.has_deprels
    }

    /// Postings for a term across all segments: `(sentence id, positions)`
    /// in sentence-id order.
    pub fn postings(&self, field: Field, term: &str) -> Result<Vec<(u32, Vec<u32>)>> {
        let mut out = Vec::new();
        for segment in &self.segments {
            for (ordinal, positions) in segment.postings(field, term)? {
                out.push((segment.base_doc_id() + ordinal, positions));
            }
        }
        Ok(out)
    }

    /// Evaluate a span query. Matches are returned in sentence-id order,
    /// one per matching sentence, with a minimal witnessing extent.
    pub fn span_matches(&self, spec: &SpanSpec) -> Result<Vec<SpanMatch>> {
        if spec.selectors.is_empty() {
            return Err(Error::invariant("span query with no selectors"));
        }
        let mut out = Vec::new();
        for segment in &self.segments {
            self.segment_span_matches(segment, spec, &mut out)?;
        }
        Ok(out)
    }

    fn segment_span_matches(
        &self,
        segment: &SegmentView<Mmap>,
        spec: &SpanSpec,
        out: &mut Vec<SpanMatch>,
    ) -> Result<()> {
        // Per selector: ordinal → sorted positions.
        let mut per_selector: Vec<Vec<(u32, Vec<u32>)>> = Vec::with_capacity(spec.selectors.len());
        for selector in &spec.selectors {
            let postings = selector_postings(segment, selector)?;
            if postings.is_empty() {
                return Ok(()); // a required selector is absent from this segment
            }
            per_selector.push(postings);
        }

        // Intersect ordinals by merging the sorted lists.
        let mut cursors = vec![0usize; per_selector.len()];
        'docs: loop {
            // Find the highest current ordinal, then advance everyone to it.
            let mut target = 0u32;
            for (list, &cursor) in per_selector.iter().zip(&cursors) {
                match list.get(cursor) {
                    Some(&(ordinal, _)) => target = target.max(ordinal),
                    None => break 'docs,
                }
            }
            let mut aligned = true;
            for (list, cursor) in per_selector.iter().zip(cursors.iter_mut()) {
                while let Some(&(ordinal, _)) = list.get(*cursor) {
                    if ordinal >= target {
                        break;
                    }
                    *cursor += 1;
                }
                match list.get(*cursor) {
                    Some(&(ordinal, _)) if ordinal == target => {}
                    Some(_) => aligned = false,
                    None => break 'docs,
                }
            }
            if !aligned {
                continue;
            }

            let position_lists: Vec<&[u32]> = per_selector
                .iter()
                .zip(&cursors)
                .map(|(list, &cursor)| list[cursor].1.as_slice())
                .collect();
            let hit = if spec.ordered {
                ordered_window(&position_lists, spec.window)
            } else {
                unordered_window(&position_lists, spec.window)
            };
            if let Some((start, end)) = hit {
                out.push(SpanMatch {
                    doc_id: segment.base_doc_id() + target,
                    start,
                    end,
                });
            }
            for cursor in cursors.iter_mut() {
                *cursor += 1;
            }
        }
        Ok(())
    }

    fn segment_for(&self, doc_id: u32) -> Result<(&SegmentView<Mmap>, u32)> {
        let rank = self
            .segments
            .partition_point(|s| s.base_doc_id() + s.doc_count() <= doc_id);
        let segment = self
            .segments
            .get(rank)
            .filter(|s| doc_id >= s.base_doc_id())
            .ok_or_else(|| {
                Error::invariant(format!(
                    "sentence id {doc_id} out of range ({} sentences)",
                    self.manifest.doc_count
                ))
            })?;
        Ok((segment, doc_id - segment.base_doc_id()))
    }

    /// Zero-copy access to one sentence's columns.
    pub fn columns(&self, doc_id: u32) -> Result<DocColumns<'_>> {
        let (segment, ordinal) = self.segment_for(doc_id)?;
        segment.doc_columns(ordinal)
    }

    /// Decode one sentence completely (tokens and text).
    pub fn sentence(&self, doc_id: u32) -> Result<Sentence> {
        let columns = self.columns(doc_id)?;
        let tokens = decode_tokens(columns.tokens_blob, self.has_deprels())?;
        Ok(Sentence {
            id: doc_id,
            text: columns.text.to_string(),
            tokens,
        })
    }

    /// Decode one sentence's lemma-id column into a reusable buffer.
    pub fn lemma_ids_into(&self, doc_id: u32, out: &mut Vec<u32>) -> Result<usize> {
        let columns = self.columns(doc_id)?;
        decode_lemma_ids_into(columns.lemma_ids_blob, out)
    }
}

fn selector_postings(
    segment: &SegmentView<Mmap>,
    selector: &TermSelector,
) -> Result<Vec<(u32, Vec<u32>)>> {
    match selector {
        TermSelector::Exact { field, value } => segment.postings(*field, value),
        TermSelector::Prefix { field, prefix } => segment.postings_with_prefix(*field, prefix),
        TermSelector::OneOf { field, values } => {
            let lists = values
                .iter()
                .map(|v| segment.postings(*field, v))
                .collect::<Result<Vec<_>>>()?;
            Ok(merge_postings(lists))
        }
        TermSelector::Prefixes { field, prefixes } => {
            let lists = prefixes
                .iter()
                .map(|p| segment.postings_with_prefix(*field, p))
                .collect::<Result<Vec<_>>>()?;
            Ok(merge_postings(lists))
        }
    }
}

/// Merge several ordinal-sorted postings lists, unioning positions per
/// ordinal.
fn merge_postings(lists: Vec<Vec<(u32, Vec<u32>)>>) -> Vec<(u32, Vec<u32>)> {
    let mut merged: std::collections::BTreeMap<u32, Vec<u32>> = std::collections::BTreeMap::new();
    for list in lists {
        for (ordinal, mut positions) in list {
            merged.entry(ordinal).or_default().append(&mut positions);
        }
    }
    merged
        .into_iter()
        .map(|(ordinal, mut positions)| {
            positions.sort_unstable();
            positions.dedup();
            (ordinal, positions)
        })
        .collect()
}

/// Ordered check: one position per list, strictly increasing, total extent
/// within `window`. Returns the minimal witnessing extent found.
fn ordered_window(lists: &[&[u32]], window: u32) -> Option<(u32, u32)> {
    let first = lists.first()?;
    let mut best: Option<(u32, u32)> = None;
    for &p1 in *first {
        let mut prev = p1;
        let mut ok = true;
        for list in &lists[1..] {
            let rank = list.partition_point(|&p| p <= prev);
            match list.get(rank) {
                Some(&p) => prev = p,
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if ok && prev - p1 <= window {
            let span = (p1, prev);
            if best.map(|(s, e)| prev - p1 < e - s).unwrap_or(true) {
                best = Some(span);
            }
        }
    }
    best
}

/// Unordered check: sliding window over the tagged union of all positions;
/// a window of width ≤ `window` must cover every selector.
fn unordered_window(lists: &[&[u32]], window: u32) -> Option<(u32, u32)> {
    let mut tagged: Vec<(u32, usize)> = Vec::new();
    for (idx, list) in lists.iter().enumerate() {
        for &p in *list {
            tagged.push((p, idx));
        }
    }
    tagged.sort_unstable();

    let needed = lists.len();
    let mut counts = vec![0usize; needed];
    let mut covered = 0usize;
    let mut lo = 0usize;
    let mut best: Option<(u32, u32)> = None;
    for hi in 0..tagged.len() {
        let (pos_hi, idx_hi) = tagged[hi];
        if counts[idx_hi] == 0 {
            covered += 1;
        }
        counts[idx_hi] += 1;
        while covered == needed {
            let (pos_lo, idx_lo) = tagged[lo];
            if pos_hi - pos_lo <= window
                && best.map(|(s, e)| pos_hi - pos_lo < e - s).unwrap_or(true)
            {
                best = Some((pos_lo, pos_hi));
            }
            counts[idx_lo] -= 1;
            if counts[idx_lo] == 0 {
                covered -= 1;
            }
            lo += 1;
        }
    }
    best
}
