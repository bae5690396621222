//! The online query executor: joins candidate retrieval, verification,
//! statistics and scoring into ranked collocate results with examples.

use std::collections::HashMap;

use log::{debug, warn};

use crate::cancel::CancellationToken;
use crate::codec::decode_tokens;
use crate::error::{Error, Result};
use crate::index::{IndexReader, SpanSpec, TermSelector};
use crate::lexicon::LexiconReader;
use crate::pattern::{parse_pattern, Pattern};
use crate::query::compile::compile;
use crate::query::verify::verify_at;
use crate::relations::Relation;
use crate::scoring::{score, ScoreKind};
use crate::stats::StatsReader;
use crate::types::{
    normalize, sort_collocations, Collocation, Example, Field, QueryConfig, QueryOutcome,
    Sentence, Token,
};

/// One concordance line: a sentence containing both query lemmas within the
/// allowed gap, with token positions and a highlighted rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcordanceLine {
    pub sentence_id: u32,
    pub text: String,
    pub position_a: u32,
    pub position_b: u32,
    pub highlighted: String,
}

/// Read-only query executor over an opened index.
pub struct Executor<'a> {
    pub index: &'a IndexReader,
    pub lexicon: &'a LexiconReader,
    pub stats: &'a StatsReader,
    pub score_kind: ScoreKind,
}

/// Per-collocate aggregation state during a query.
#[derive(Default)]
struct Aggregate {
    count: u64,
    tag_counts: HashMap<String, u64>,
    examples: Vec<Example>,
}

impl<'a> Executor<'a> {
    pub fn new(index: &'a IndexReader, lexicon: &'a LexiconReader, stats: &'a StatsReader) -> Self {
        Self {
            index,
            lexicon,
            stats,
            score_kind: ScoreKind::default(),
        }
    }

    /// Total corpus frequency of a lemma; 0 when absent.
    pub fn total_frequency(&self, lemma: &str) -> u64 {
        self.stats.frequency_of(lemma)
    }

    /// Find ranked collocates of `head` under `relation`, online (without
    /// the precomputed store).
    pub fn find_collocations(
        &self,
        head: &str,
        relation: &Relation,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome<Vec<Collocation>>> {
        let head = normalize(head);
        if head.is_empty() {
            return Err(Error::PatternUnsupported("empty headword".into()));
        }
        let f_a = self.stats.frequency_of(&head);
        if f_a == 0 {
            return Ok(QueryOutcome::Complete(Vec::new()));
        }

        let outcome = if relation.is_pattern_based() {
            self.aggregate_pattern(&head, relation, config, cancel)?
        } else {
            self.aggregate_window(&head, relation, config, cancel)?
        };
        let (aggregates, scale) = match outcome {
            QueryOutcome::Complete(v) => v,
            QueryOutcome::Cancelled => return Ok(QueryOutcome::Cancelled),
        };

        let mut results = self.score_and_rank(f_a, aggregates, scale, config);
        results.truncate(config.top_k.max(1));
        Ok(QueryOutcome::Complete(results))
    }

    /// Concordance: the earliest sentences (in ingestion order) containing
    /// both lemmas within `max_gap` token positions.
    pub fn find_examples(
        &self,
        lemma_a: &str,
        lemma_b: &str,
        max_gap: u32,
        limit: usize,
    ) -> Result<Vec<ConcordanceLine>> {
        let lemma_a = normalize(lemma_a);
        let lemma_b = normalize(lemma_b);
        let spec = SpanSpec {
            selectors: vec![
                TermSelector::Exact {
                    field: Field::Lemma,
                    value: lemma_a.clone(),
                },
                TermSelector::Exact {
                    field: Field::Lemma,
                    value: lemma_b.clone(),
                },
            ],
            window: max_gap.max(1),
            ordered: false,
        };

        let mut lines = Vec::new();
        for hit in self.index.span_matches(&spec)? {
            if lines.len() >= limit {
                break;
            }
            let sentence = match self.index.sentence(hit.doc_id) {
                Ok(s) => s,
                Err(err) if err.is_recoverable() => {
                    warn!("skipping sentence {}: {err}", hit.doc_id);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let (position_a, position_b) = match sentence.tokens.get(hit.start as usize) {
                Some(token) if token.lemma == lemma_a => (hit.start, hit.end),
                _ => (hit.end, hit.start),
            };
            let highlighted =
                highlight(&sentence, &[position_a, position_b]).unwrap_or_else(|| sentence.text.clone());
            lines.push(ConcordanceLine {
                sentence_id: sentence.id,
                text: sentence.text,
                position_a,
                position_b,
                highlighted,
            });
        }
        Ok(lines)
    }

    // -------------------------------------------------------------------------
    // aggregation
    // -------------------------------------------------------------------------

    fn aggregate_pattern(
        &self,
        head: &str,
        relation: &Relation,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome<(HashMap<String, Aggregate>, f64)>> {
        let source = relation
            .pattern
            .as_deref()
            .ok_or_else(|| Error::PatternUnsupported("relation has no pattern".into()))?;
        let mut base = parse_pattern(source)?;
        base.bind_head(head);

        // Each direction anchors the head at a different element. A dual
        // relation reads collocates from both sides of the pattern.
        let mut directions: Vec<(Pattern, usize, usize)> = Vec::new();
        let forward = bound_at(&base, head, relation.head_index).ok_or_else(|| {
            Error::PatternUnsupported(format!(
                "head index {} missing from pattern {:?}",
                relation.head_index, relation.id
            ))
        })?;
        directions.push((forward, relation.head_index, relation.collocate_index));
        if relation.dual {
            let reverse = bound_at(&base, head, relation.collocate_index).ok_or_else(|| {
                Error::PatternUnsupported(format!(
                    "collocate index {} missing from pattern {:?}",
                    relation.collocate_index, relation.id
                ))
            })?;
            directions.push((reverse, relation.collocate_index, relation.head_index));
        }

        // Candidate doc ids, unioned over directions and alternatives, in
        // ingestion order.
        let mut candidates: Vec<u32> = Vec::new();
        for (pattern, _, _) in &directions {
            for clause in compile(pattern)? {
                for hit in self.index.span_matches(&clause)? {
                    candidates.push(hit.doc_id);
                }
            }
        }
        candidates.sort_unstable();
        candidates.dedup();

        let (candidates, scale) = sample(candidates, config.max_candidates);
        debug!(
            "pattern query {:?} head {:?}: {} candidate sentences",
            relation.id,
            head,
            candidates.len()
        );

        let mut aggregates: HashMap<String, Aggregate> = HashMap::new();
        let mut total_examples = 0usize;
        let mut skipped = 0u64;
        for doc_id in candidates {
            if cancel.is_cancelled() {
                return Ok(QueryOutcome::Cancelled);
            }
            let columns = self.index.columns(doc_id)?;
            let tokens = match decode_tokens(columns.tokens_blob, self.index.has_deprels()) {
                Ok(t) => t,
                Err(err) => {
                    skipped += 1;
                    warn!("skipping sentence {doc_id}: {err}");
                    continue;
                }
            };
            let sentence = Sentence {
                id: doc_id,
                text: columns.text.to_string(),
                tokens,
            };

            for (pattern, anchor_index, collocate_index) in &directions {
                self.collect_matches(
                    &sentence,
                    head,
                    relation,
                    pattern,
                    *anchor_index,
                    *collocate_index,
                    config,
                    &mut aggregates,
                    &mut total_examples,
                    cancel,
                )?;
            }
            if cancel.is_cancelled() {
                return Ok(QueryOutcome::Cancelled);
            }
        }
        if skipped > 0 {
            warn!("query skipped {skipped} undecodable sentences");
        }
        Ok(QueryOutcome::Complete((aggregates, scale)))
    }

    /// Run the verifier at every anchor occurrence of the head in one
    /// sentence and fold successful matches into the aggregates.
    ///
    /// `head_index`/`collocate_index` describe the direction being scanned:
    /// for a dual relation's reverse direction the head anchors at the
    /// pattern's collocate element and the POS classes swap with it.
    #[allow(clippy::too_many_arguments)]
    fn collect_matches(
        &self,
        sentence: &Sentence,
        head: &str,
        relation: &Relation,
        pattern: &Pattern,
        head_index: usize,
        collocate_index: usize,
        config: &QueryConfig,
        aggregates: &mut HashMap<String, Aggregate>,
        total_examples: &mut usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let reversed = head_index == relation.collocate_index;
        let (head_class, collocate_class) = if reversed {
            (relation.collocate_pos, relation.head_pos)
        } else {
            (relation.head_pos, relation.collocate_pos)
        };
        for anchor in head_positions(&sentence.tokens, head, head_class) {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let Some(hit) = verify_at(&sentence.tokens, pattern, head_index, anchor) else {
                continue;
            };
            let collocate_pos = hit
                .captures
                .get(&(collocate_index as u32))
                .copied()
                .or_else(|| hit.element_position(collocate_index));
            let Some(collocate_pos) = collocate_pos else {
                continue;
            };
            if collocate_pos == anchor {
                continue;
            }
            let Some(token) = sentence.tokens.get(collocate_pos as usize) else {
                continue;
            };
            if let Some(class) = collocate_class {
                if !class.matches_tag(&token.tag) {
                    continue;
                }
            }
            record(
                aggregates,
                sentence,
                token,
                anchor,
                collocate_pos,
                config,
                total_examples,
            );
        }
        Ok(())
    }

    fn aggregate_window(
        &self,
        head: &str,
        relation: &Relation,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome<(HashMap<String, Aggregate>, f64)>> {
        let window = relation.window.max(1);
        let candidates: Vec<u32> = self
            .index
            .postings(Field::Lemma, head)?
            .into_iter()
            .map(|(doc_id, _)| doc_id)
            .collect();
        let (candidates, scale) = sample(candidates, config.max_candidates);

        let mut aggregates: HashMap<String, Aggregate> = HashMap::new();
        let mut total_examples = 0usize;
        for doc_id in candidates {
            if cancel.is_cancelled() {
                return Ok(QueryOutcome::Cancelled);
            }
            let sentence = match self.index.sentence(doc_id) {
                Ok(s) => s,
                Err(err) if err.is_recoverable() => {
                    warn!("skipping sentence {doc_id}: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };
            for anchor in head_positions(&sentence.tokens, head, relation.head_pos) {
                let lo = anchor.saturating_sub(window);
                let hi = (anchor + window).min(sentence.tokens.len() as u32 - 1);
                for pos in lo..=hi {
                    if pos == anchor {
                        continue;
                    }
                    let token = &sentence.tokens[pos as usize];
                    if let Some(class) = relation.collocate_pos {
                        if !class.matches_tag(&token.tag) {
                            continue;
                        }
                    }
                    record(
                        &mut aggregates,
                        &sentence,
                        token,
                        anchor,
                        pos,
                        config,
                        &mut total_examples,
                    );
                }
            }
        }
        Ok(QueryOutcome::Complete((aggregates, scale)))
    }

    fn score_and_rank(
        &self,
        f_a: u64,
        aggregates: HashMap<String, Aggregate>,
        scale: f64,
        config: &QueryConfig,
    ) -> Vec<Collocation> {
        let n = self.stats.total_tokens();
        let mut results: Vec<Collocation> = aggregates
            .into_iter()
            .map(|(lemma, agg)| {
                let f_ab = scaled(agg.count, scale);
                let f_b = self.stats.frequency_of(&lemma);
                let tag = agg
                    .tag_counts
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                    .map(|(tag, _)| tag.clone())
                    .unwrap_or_default();
                Collocation {
                    lemma,
                    tag,
                    cooccurrence: f_ab,
                    collocate_frequency: f_b,
                    score: score(self.score_kind, f_ab, f_a, f_b, n),
                    examples: agg.examples,
                }
            })
            .filter(|c| c.score >= config.min_score && c.cooccurrence > 0)
            .collect();
        sort_collocations(&mut results);
        results
    }
}

// =============================================================================
// helpers
// =============================================================================

/// Anchor positions of the head lemma, filtered by a POS class when one is
/// configured.
fn head_positions(
    tokens: &[Token],
    head: &str,
    class: Option<crate::types::PosClass>,
) -> Vec<u32> {
    tokens
        .iter()
        .filter(|t| {
            t.lemma == head && class.map(|c| c.matches_tag(&t.tag)).unwrap_or(true)
        })
        .map(|t| t.position)
        .collect()
}

/// Clone the pattern with `lemma=head` conjoined onto the element at
/// `index` (1-based) in every alternative. Returns `None` when some
/// alternative lacks that element.
fn bound_at(base: &Pattern, head: &str, index: usize) -> Option<Pattern> {
    use crate::pattern::{CmpOp, Pred, Value};
    if index == 0 {
        return None;
    }
    let mut pattern = base.clone();
    for alt in &mut pattern.alternatives {
        let element = alt.elements.get_mut(index - 1)?;
        let head_pred = Pred::Cmp {
            field: Field::Lemma,
            op: CmpOp::Eq,
            values: vec![Value::Literal(head.to_string())],
        };
        let existing = std::mem::replace(&mut element.pred, Pred::And(Vec::new()));
        element.pred = match existing {
            Pred::And(mut items) => {
                items.push(head_pred);
                Pred::And(items)
            }
            other => Pred::And(vec![other, head_pred]),
        };
    }
    Some(pattern)
}

/// Deterministic sampling: a prefix in ingestion order, with the scale
/// factor to blow counts back up. `max = 0` means exhaustive.
fn sample(candidates: Vec<u32>, max: usize) -> (Vec<u32>, f64) {
    if max == 0 || candidates.len() <= max {
        return (candidates, 1.0);
    }
    let total = candidates.len() as f64;
    let mut sampled = candidates;
    sampled.truncate(max);
    let scale = total / max as f64;
    (sampled, scale)
}

fn scaled(count: u64, scale: f64) -> u64 {
    if scale <= 1.0 {
        count
    } else {
        ((count as f64) * scale).round() as u64
    }
}

fn record(
    aggregates: &mut HashMap<String, Aggregate>,
    sentence: &Sentence,
    token: &Token,
    head_pos: u32,
    collocate_pos: u32,
    config: &QueryConfig,
    total_examples: &mut usize,
) {
    let agg = aggregates.entry(token.lemma.clone()).or_default();
    agg.count += 1;
    *agg.tag_counts.entry(token.tag.clone()).or_insert(0) += 1;
    if agg.examples.len() < config.examples_per_collocate
        && *total_examples < config.max_total_examples
    {
        let highlighted =
            highlight(sentence, &[head_pos, collocate_pos]).unwrap_or_else(|| sentence.text.clone());
        agg.examples.push(Example {
            sentence_id: sentence.id,
            text: sentence.text.clone(),
            head_position: head_pos,
            collocate_position: collocate_pos,
            highlighted,
        });
        *total_examples += 1;
    }
}

/// Render the sentence text with `<b>…</b>` around the given token
/// positions, using the tokens' character offsets.
pub fn highlight(sentence: &Sentence, positions: &[u32]) -> Option<String> {
    let chars: Vec<char> = sentence.text.chars().collect();
    let mut ranges: Vec<(usize, usize)> = positions
        .iter()
        .filter_map(|&p| {
            let token = sentence.tokens.get(p as usize)?;
            let (start, end) = (token.start as usize, token.end as usize);
            (start < end && end <= chars.len()).then_some((start, end))
        })
        .collect();
    ranges.sort_unstable();
    ranges.dedup();

    let mut out = String::with_capacity(sentence.text.len() + ranges.len() * 7);
    let mut cursor = 0usize;
    for (start, end) in ranges {
        if start < cursor {
            continue; // overlapping range, already rendered
        }
        out.extend(&chars[cursor..start]);
        out.push_str("<b>");
        out.extend(&chars[start..end]);
        out.push_str("</b>");
        cursor = end;
    }
    out.extend(&chars[cursor..]);
    Some(out)
}
