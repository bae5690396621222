//! Exact per-window verifier.
//!
//! Candidate retrieval is deliberately permissive; this module does the
//! honest work. Given a decoded token window and an anchor (the position
//! where one designated element must start), it walks the pattern sequence
//! outward from the anchor with bounded backtracking, enumerating the
//! positions each element's distance range allows and the run lengths its
//! repetition allows.
//!
//! Semantics worth calling out:
//!
//! - A repetition `{m,n}` matches a run of m..=n consecutive tokens, each
//!   satisfying the element predicate. An element matched with zero tokens
//!   is transparent: the next element's distance is measured from the last
//!   present element.
//! - Distances relate `start(element) − end(previous present element)`;
//!   negative values place the element before its predecessor.
//! - Agreement rules are evaluated only after a full sequence match; their
//!   failure backtracks into other position assignments rather than
//!   rejecting outright. A rule referencing an unbound capture is false.
//! - Anything reaching past the window boundary fails quietly.

use std::collections::BTreeMap;

use crate::pattern::{Agreement, CmpOp, Pattern, PatternSeq, Pred, Value};
use crate::types::{Field, PosClass, Token};

/// A successful verification: which alternative matched, the token extent of
/// every element (`None` for zero-width matches), and the capture map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub alternative: usize,
    /// Per element: inclusive (start, end) token positions.
    pub spans: Vec<Option<(u32, u32)>>,
    /// Capture label → position of the element's first token. Ordered by
    /// label, deterministic across runs.
    pub captures: BTreeMap<u32, u32>,
}

impl MatchResult {
    /// Position of an element by its 1-based sequence index.
    pub fn element_position(&self, index_1based: usize) -> Option<u32> {
        self.spans
            .get(index_1based.checked_sub(1)?)
            .copied()
            .flatten()
            .map(|(start, _)| start)
    }
}

/// Verify a pattern against a token window, requiring the element at
/// `anchor_element` (1-based) to start exactly at `anchor_pos`.
///
/// Alternatives are tried in order; alternatives with fewer elements than
/// `anchor_element` are skipped.
pub fn verify_at(
    tokens: &[Token],
    pattern: &Pattern,
    anchor_element: usize,
    anchor_pos: u32,
) -> Option<MatchResult> {
    if anchor_element == 0 {
        return None;
    }
    for (alt_idx, seq) in pattern.alternatives.iter().enumerate() {
        if anchor_element > seq.elements.len() {
            continue;
        }
        if let Some((spans, captures)) = verify_seq_at(tokens, seq, anchor_element - 1, anchor_pos)
        {
            return Some(MatchResult {
                alternative: alt_idx,
                spans,
                captures,
            });
        }
    }
    None
}

type Spans = Vec<Option<(u32, u32)>>;

fn verify_seq_at(
    tokens: &[Token],
    seq: &PatternSeq,
    anchor_idx: usize,
    anchor_pos: u32,
) -> Option<(Spans, BTreeMap<u32, u32>)> {
    let element = &seq.elements[anchor_idx];
    let mut spans: Spans = vec![None; seq.elements.len()];

    // The anchored element must be present, whatever its repetition minimum.
    let rep_lo = element.repeat.0.max(1);
    for rep in rep_lo..=element.repeat.1 {
        if !run_matches(tokens, &element.pred, anchor_pos as i64, rep) {
            // Longer runs only add constraints; once a run fails, stop.
            break;
        }
        spans[anchor_idx] = Some((anchor_pos, anchor_pos + rep - 1));
        if extend_right(
            tokens,
            seq,
            anchor_idx,
            anchor_pos,
            anchor_idx + 1,
            (anchor_pos + rep - 1) as i64,
            &mut spans,
        ) {
            let captures = collect_captures(seq, &spans);
            return Some((spans, captures));
        }
    }
    None
}

/// Place elements to the right of the anchor, then hand off to the left
/// side. Returns true when a full assignment (agreements included) exists
/// with the current prefix.
#[allow(clippy::too_many_arguments)]
fn extend_right(
    tokens: &[Token],
    seq: &PatternSeq,
    anchor_idx: usize,
    anchor_pos: u32,
    idx: usize,
    prev_end: i64,
    spans: &mut Spans,
) -> bool {
    if idx >= seq.elements.len() {
        let anchor_dist = seq.elements[anchor_idx].dist;
        return extend_left(
            tokens,
            seq,
            anchor_idx.checked_sub(1),
            anchor_pos as i64,
            anchor_dist,
            spans,
        );
    }
    let element = &seq.elements[idx];

    if element.repeat.0 == 0 {
        // Transparent zero-width match.
        spans[idx] = None;
        if extend_right(tokens, seq, anchor_idx, anchor_pos, idx + 1, prev_end, spans) {
            return true;
        }
    }

    let (dmin, dmax) = element.dist;
    for d in dmin..=dmax {
        let start = prev_end + d as i64;
        for rep in element.repeat.0.max(1)..=element.repeat.1 {
            if !run_matches(tokens, &element.pred, start, rep) {
                break;
            }
            spans[idx] = Some((start as u32, start as u32 + rep - 1));
            let end = start + rep as i64 - 1;
            if extend_right(tokens, seq, anchor_idx, anchor_pos, idx + 1, end, spans) {
                return true;
            }
        }
    }
    spans[idx] = None;
    false
}

/// Place elements to the left of the anchor, right to left. `right_start`
/// is the start of the nearest present element already placed; `right_dist`
/// is that element's distance range, which links it to whatever present
/// element we place next.
fn extend_left(
    tokens: &[Token],
    seq: &PatternSeq,
    idx: Option<usize>,
    right_start: i64,
    right_dist: (i32, i32),
    spans: &mut Spans,
) -> bool {
    let Some(idx) = idx else {
        return agreements_hold(tokens, seq, spans);
    };
    let element = &seq.elements[idx];

    if element.repeat.0 == 0 {
        spans[idx] = None;
        if extend_left(tokens, seq, idx.checked_sub(1), right_start, right_dist, spans) {
            return true;
        }
    }

    let (dmin, dmax) = right_dist;
    for d in dmin..=dmax {
        let end = right_start - d as i64;
        for rep in element.repeat.0.max(1)..=element.repeat.1 {
            let start = end - rep as i64 + 1;
            if !run_matches(tokens, &element.pred, start, rep) {
                continue;
            }
            spans[idx] = Some((start as u32, end as u32));
            if extend_left(tokens, seq, idx.checked_sub(1), start, element.dist, spans) {
                return true;
            }
        }
    }
    spans[idx] = None;
    false
}

/// All `rep` consecutive tokens from `start` satisfy the predicate and lie
/// within the window.
fn run_matches(tokens: &[Token], pred: &Pred, start: i64, rep: u32) -> bool {
    if start < 0 || start + rep as i64 > tokens.len() as i64 {
        return false;
    }
    (0..rep as i64).all(|offset| eval_pred(pred, &tokens[(start + offset) as usize]))
}

fn collect_captures(seq: &PatternSeq, spans: &Spans) -> BTreeMap<u32, u32> {
    let mut captures = BTreeMap::new();
    for (element, span) in seq.elements.iter().zip(spans) {
        if let (Some(label), Some((start, _))) = (element.label, span) {
            captures.insert(label, *start);
        }
    }
    captures
}

// =============================================================================
// PREDICATES
// =============================================================================

/// Evaluate a predicate against one token. All comparisons are over
/// normalized strings.
pub fn eval_pred(pred: &Pred, token: &Token) -> bool {
    match pred {
        Pred::Cmp { field, op, values } => {
            let any = if *field == Field::PosGroup {
                values.iter().any(|v| pos_group_matches(v, &token.tag))
            } else {
                match token.attr(*field) {
                    Some(attr) => values.iter().any(|v| v.matches(&attr)),
                    None => false,
                }
            };
            match op {
                CmpOp::Eq => any,
                CmpOp::Ne => !any,
            }
        }
        Pred::And(items) => items.iter().all(|p| eval_pred(p, token)),
        Pred::Or(items) => items.iter().any(|p| eval_pred(p, token)),
        Pred::Not(inner) => !eval_pred(inner, token),
    }
}

fn pos_group_matches(value: &Value, tag: &str) -> bool {
    match value {
        Value::Literal(name) => PosClass::parse(name)
            .map(|class| class.matches_tag(tag))
            .unwrap_or(false),
        _ => false,
    }
}

// =============================================================================
// AGREEMENT
// =============================================================================

fn agreements_hold(tokens: &[Token], seq: &PatternSeq, spans: &Spans) -> bool {
    if seq.agreements.is_empty() {
        return true;
    }
    let captures = collect_captures(seq, spans);
    seq.agreements
        .iter()
        .all(|rule| agreement_holds(tokens, rule, &captures))
}

fn agreement_holds(tokens: &[Token], rule: &Agreement, captures: &BTreeMap<u32, u32>) -> bool {
    let (Some(&pos_a), Some(&pos_b)) = (captures.get(&rule.label_a), captures.get(&rule.label_b))
    else {
        return false; // unbound capture
    };
    let (Some(token_a), Some(token_b)) = (tokens.get(pos_a as usize), tokens.get(pos_b as usize))
    else {
        return false;
    };
    let value_a = agreement_value(token_a, rule.field_a);
    let value_b = agreement_value(token_b, rule.field_b);
    let equal = match (value_a, value_b) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    match rule.op {
        CmpOp::Eq => equal,
        CmpOp::Ne => !equal,
    }
}

/// The comparable value a field exposes for agreement. `pos_group` compares
/// coarse classes rather than raw tags.
fn agreement_value(token: &Token, field: Field) -> Option<String> {
    if field == Field::PosGroup {
        return [
            PosClass::Noun,
            PosClass::Verb,
            PosClass::Adjective,
            PosClass::Adverb,
        ]
        .into_iter()
        .find(|class| class.matches_tag(&token.tag))
        .map(|class| format!("{class:?}"));
    }
    token.attr(field)
}
