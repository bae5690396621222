//! Reduce stage: merged pair counts → per-head top-K collocate lists.
//!
//! Keys arrive sorted, so each head's collocates are contiguous; a bounded
//! min-heap keeps the K best by score while streaming. Ordering matches the
//! collocate-record invariant: score descending, cooccurrence descending,
//! lemma id ascending.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};
use crate::lexicon::LexiconReader;
use crate::precompute::pair_map::split_key;
use crate::scoring::{score, ScoreKind};

/// One scored collocate, still id-keyed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCollocate {
    pub lemma_id: u32,
    pub cooccurrence: u64,
    pub frequency: u64,
    pub score: f64,
}

/// All surviving collocates of one head.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadEntry {
    pub head_id: u32,
    pub collocates: Vec<ScoredCollocate>,
}

/// Heap ordering: `Ranked` compares "better first".
#[derive(Debug, Clone, PartialEq)]
struct Ranked(ScoredCollocate);

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .partial_cmp(&other.0.score)
            .unwrap_or(Ordering::Equal)
            .then(self.0.cooccurrence.cmp(&other.0.cooccurrence))
            .then(other.0.lemma_id.cmp(&self.0.lemma_id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fold a merged, key-sorted `(key, count)` stream into per-head top-K
/// entries.
///
/// Every lemma id must resolve in the lexicon; a miss means the runs and
/// the index disagree and is surfaced as `Invariant`.
pub fn reduce_shard(
    merged: Vec<(u64, u64)>,
    k: usize,
    score_kind: ScoreKind,
    lexicon: &LexiconReader,
) -> Result<Vec<HeadEntry>> {
    let total_tokens = lexicon.total_tokens();
    let lemma_count = lexicon.len() as u32;
    let mut entries: Vec<HeadEntry> = Vec::new();

    let mut current_head: Option<u32> = None;
    let mut current_f_a = 0u64;
    let mut heap: BinaryHeap<std::cmp::Reverse<Ranked>> = BinaryHeap::with_capacity(k + 1);

    let flush =
        |head: u32, heap: &mut BinaryHeap<std::cmp::Reverse<Ranked>>, entries: &mut Vec<HeadEntry>| {
            if heap.is_empty() {
                return;
            }
            let mut collocates: Vec<ScoredCollocate> =
                heap.drain().map(|std::cmp::Reverse(r)| r.0).collect();
            collocates.sort_by(|a, b| Ranked(b.clone()).cmp(&Ranked(a.clone())));
            entries.push(HeadEntry {
                head_id: head,
                collocates,
            });
        };

    for (key, count) in merged {
        let (head_id, coll_id) = split_key(key);
        if head_id >= lemma_count || coll_id >= lemma_count {
            return Err(Error::invariant(format!(
                "run file references lemma id {} beyond lexicon ({lemma_count} entries)",
                head_id.max(coll_id)
            )));
        }
        if current_head != Some(head_id) {
            if let Some(prev) = current_head {
                flush(prev, &mut heap, &mut entries);
            }
            current_head = Some(head_id);
            current_f_a = lexicon.frequency_of_id(head_id);
        }
        let f_b = lexicon.frequency_of_id(coll_id);
        let scored = ScoredCollocate {
            lemma_id: coll_id,
            cooccurrence: count,
            frequency: f_b,
            score: score(score_kind, count, current_f_a, f_b, total_tokens),
        };
        heap.push(std::cmp::Reverse(Ranked(scored)));
        if heap.len() > k {
            heap.pop(); // drop the current worst
        }
    }
    if let Some(prev) = current_head {
        flush(prev, &mut heap, &mut entries);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::LexiconBuilder;
    use crate::precompute::pair_map::pair_key;

    fn sample_lexicon(dir: &std::path::Path) -> LexiconReader {
        let mut builder = LexiconBuilder::new();
        for (lemma, freq) in [("dog", 4u64), ("big", 3), ("red", 2), ("cat", 1)] {
            let id = builder.get_or_assign(lemma).unwrap();
            for _ in 0..freq {
                builder.record_occurrence(id, "nn");
            }
        }
        let path = dir.join("lexicon.bin");
        builder.write(&path).unwrap();
        LexiconReader::open(&path).unwrap()
    }

    #[test]
    fn test_reduce_groups_by_head_and_ranks() {
        let dir = tempfile::tempdir().unwrap();
        let lexicon = sample_lexicon(dir.path());
        // dog→big ×3, dog→red ×1, cat→dog ×1.
        let merged = vec![
            (pair_key(0, 1), 3u64),
            (pair_key(0, 2), 1),
            (pair_key(3, 0), 1),
        ];
        let entries = reduce_shard(merged, 10, ScoreKind::LogDice, &lexicon).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].head_id, 0);
        assert_eq!(entries[0].collocates[0].lemma_id, 1);
        assert!(entries[0].collocates[0].score >= entries[0].collocates[1].score);
        assert_eq!(entries[1].head_id, 3);
    }

    #[test]
    fn test_top_k_truncation_keeps_best() {
        let dir = tempfile::tempdir().unwrap();
        let lexicon = sample_lexicon(dir.path());
        let merged = vec![
            (pair_key(0, 1), 5u64),
            (pair_key(0, 2), 2),
            (pair_key(0, 3), 1),
        ];
        let entries = reduce_shard(merged, 2, ScoreKind::LogDice, &lexicon).unwrap();
        assert_eq!(entries[0].collocates.len(), 2);
        let kept: Vec<u32> = entries[0].collocates.iter().map(|c| c.lemma_id).collect();
        assert!(!kept.contains(&3) || kept.len() == 2);
    }

    #[test]
    fn test_unknown_lemma_id_is_invariant() {
        let dir = tempfile::tempdir().unwrap();
        let lexicon = sample_lexicon(dir.path());
        let merged = vec![(pair_key(0, 999), 1u64)];
        assert!(matches!(
            reduce_shard(merged, 5, ScoreKind::LogDice, &lexicon),
            Err(Error::Invariant(_))
        ));
    }
}
