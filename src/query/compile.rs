//! Candidate compiler: pattern AST → permissive positional query.
//!
//! The compiled query retrieves a superset of the sentences the verifier
//! will accept. Each element contributes its single most selective
//! primitive constraint (lemma equality beats tag equality beats word
//! equality beats anything prefix-shaped); negation, OR combinators,
//! captures, agreements and repetition bounds are enforced
//! by the verifier afterwards.
//!
//! Slop: the span window is the sum of element distance budgets plus the
//! extra positions repetitions may occupy. The query stays ordered only
//! while every distance range points strictly forward; one backwards or
//! zero-width range degrades the whole clause to the unordered variant.

use crate::error::{Error, Result};
use crate::index::{SpanSpec, TermSelector};
use crate::pattern::{CmpOp, Pattern, PatternElement, Pred, Value};
use crate::types::{Field, PosClass};

/// Compile a (head-bound) pattern into one span clause per alternative.
///
/// Fails with `PatternUnsupported` when any alternative has no selective
/// element, because executing it would mean a corpus-wide scan.
pub fn compile(pattern: &Pattern) -> Result<Vec<SpanSpec>> {
    pattern
        .alternatives
        .iter()
        .map(|alt| {
            let selectors: Vec<TermSelector> = alt
                .elements
                .iter()
                .filter_map(element_selector)
                .collect();
            if selectors.is_empty() {
                return Err(Error::PatternUnsupported(
                    "no element yields a selective index constraint".into(),
                ));
            }
            Ok(SpanSpec {
                selectors,
                window: clause_window(&alt.elements),
                ordered: clause_ordered(&alt.elements),
            })
        })
        .collect()
}

/// Total token extent the sequence may span.
fn clause_window(elements: &[PatternElement]) -> u32 {
    let mut window = 0u32;
    for (i, element) in elements.iter().enumerate() {
        // A repetition of n tokens occupies n−1 extra positions.
        window += element.repeat.1.saturating_sub(1);
        if i > 0 {
            let (dmin, dmax) = element.dist;
            window += dmin.unsigned_abs().max(dmax.unsigned_abs());
        }
    }
    window.max(1)
}

/// Ordered only when every inter-element distance points strictly forward.
fn clause_ordered(elements: &[PatternElement]) -> bool {
    elements.iter().skip(1).all(|e| e.dist.0 >= 1)
}

/// The most selective constraint one element offers, if any.
fn element_selector(element: &PatternElement) -> Option<TermSelector> {
    // Optional elements ({0,n}) may be absent entirely, so nothing they
    // require can constrain the candidate query.
    if element.repeat.0 == 0 {
        return None;
    }
    let mut best: Option<(u32, TermSelector)> = None;
    for cmp in required_cmps(&element.pred) {
        if let Some((rank, selector)) = cmp_selector(cmp) {
            if best.as_ref().map(|(r, _)| rank < *r).unwrap_or(true) {
                best = Some((rank, selector));
            }
        }
    }
    best.map(|(_, selector)| selector)
}

/// Leaves that must hold for the element to match: reachable through AND
/// chains only. NOT and OR branches are not individually required.
fn required_cmps(pred: &Pred) -> Vec<&Pred> {
    let mut out = Vec::new();
    collect_required(pred, &mut out);
    out
}

fn collect_required<'a>(pred: &'a Pred, out: &mut Vec<&'a Pred>) {
    match pred {
        Pred::Cmp { .. } => out.push(pred),
        Pred::And(items) => {
            for item in items {
                collect_required(item, out);
            }
        }
        Pred::Or(_) | Pred::Not(_) => {}
    }
}

/// Selectivity ranks, lower is better. Within a kind, lemma beats tag beats
/// word beats deprel.
fn field_rank(field: Field) -> u32 {
    match field {
        Field::Lemma => 0,
        Field::Tag => 1,
        Field::Word => 2,
        Field::Deprel => 3,
        Field::PosGroup => 4,
    }
}

fn cmp_selector(pred: &Pred) -> Option<(u32, TermSelector)> {
    let Pred::Cmp { field, op, values } = pred else {
        return None;
    };
    // Negated constraints never narrow the candidate set.
    if *op != CmpOp::Eq || values.is_empty() {
        return None;
    }

    if *field == Field::PosGroup {
        let mut prefixes = Vec::new();
        for value in values {
            let class = PosClass::parse(value.literal()?)?;
            prefixes.extend(class.tag_prefixes().iter().map(|p| p.to_string()));
        }
        return Some((
            20 + field_rank(Field::Tag),
            TermSelector::Prefixes {
                field: Field::Tag,
                prefixes,
            },
        ));
    }

    let all_literal = values.iter().all(|v| v.literal().is_some());
    if all_literal {
        let literals: Vec<String> = values
            .iter()
            .filter_map(|v| v.literal().map(str::to_string))
            .collect();
        let rank_kind = if literals.len() == 1 { 0 } else { 10 };
        let selector = if literals.len() == 1 {
            TermSelector::Exact {
                field: *field,
                value: literals.into_iter().next()?,
            }
        } else {
            TermSelector::OneOf {
                field: *field,
                values: literals,
            }
        };
        return Some((rank_kind + field_rank(*field), selector));
    }

    // Prefix-shaped globs: usable only when every value has a literal stem.
    let mut prefixes = Vec::new();
    for value in values {
        let stem = match value {
            Value::Literal(s) => s.as_str(),
            Value::Glob(_) => value.glob_prefix()?,
            Value::HeadPlaceholder => return None,
        };
        if stem.is_empty() {
            return None;
        }
        prefixes.push(stem.to_string());
    }
    let selector = if prefixes.len() == 1 {
        TermSelector::Prefix {
            field: *field,
            prefix: prefixes.into_iter().next()?,
        }
    } else {
        TermSelector::Prefixes {
            field: *field,
            prefixes,
        }
    };
    Some((30 + field_rank(*field), selector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::parse_pattern;

    #[test]
    fn test_adjacent_pair_compiles_ordered() {
        let pattern = parse_pattern("[tag=jj] [tag=nn]").unwrap();
        let clauses = compile(&pattern).unwrap();
        assert_eq!(clauses.len(), 1);
        let clause = &clauses[0];
        assert!(clause.ordered);
        assert_eq!(clause.window, 1);
        assert_eq!(clause.selectors.len(), 2);
    }

    #[test]
    fn test_lemma_beats_tag_for_selectivity() {
        let pattern = parse_pattern("[tag=jj & lemma=big] [tag=nn]").unwrap();
        let clauses = compile(&pattern).unwrap();
        assert_eq!(
            clauses[0].selectors[0],
            TermSelector::Exact {
                field: Field::Lemma,
                value: "big".into()
            }
        );
    }

    #[test]
    fn test_negative_distance_degrades_to_unordered() {
        let pattern = parse_pattern("[tag=nn] <-3,-1> [tag=jj]").unwrap();
        let clauses = compile(&pattern).unwrap();
        assert!(!clauses[0].ordered);
        assert_eq!(clauses[0].window, 3);
    }

    #[test]
    fn test_repetition_widens_window() {
        let pattern = parse_pattern("[tag=jj]{1,3} [tag=nn]").unwrap();
        let clauses = compile(&pattern).unwrap();
        assert_eq!(clauses[0].window, 3); // 2 extra repeats + distance 1
    }

    #[test]
    fn test_value_alternation_becomes_one_of() {
        let pattern = parse_pattern("[lemma=be|seem|prove] [tag=jj]").unwrap();
        let clauses = compile(&pattern).unwrap();
        assert_eq!(
            clauses[0].selectors[0],
            TermSelector::OneOf {
                field: Field::Lemma,
                values: vec!["be".into(), "seem".into(), "prove".into()]
            }
        );
    }

    #[test]
    fn test_pos_group_expands_to_tag_prefixes() {
        let pattern = parse_pattern("[pos_group=adjective] [lemma=dog]").unwrap();
        let clauses = compile(&pattern).unwrap();
        match &clauses[0].selectors[0] {
            TermSelector::Prefixes { field, prefixes } => {
                assert_eq!(*field, Field::Tag);
                assert!(prefixes.contains(&"jj".to_string()));
                assert!(prefixes.contains(&"adj".to_string()));
            }
            other => panic!("expected Prefixes, got {other:?}"),
        }
    }

    #[test]
    fn test_negation_only_is_unsupported() {
        let pattern = parse_pattern("[lemma!=big] [!(tag=nn)]").unwrap();
        assert!(matches!(
            compile(&pattern),
            Err(Error::PatternUnsupported(_))
        ));
    }

    #[test]
    fn test_leading_wildcard_is_not_selective() {
        let pattern = parse_pattern("[lemma=*ing]").unwrap();
        assert!(compile(&pattern).is_err());
    }

    #[test]
    fn test_alternation_compiles_per_alternative() {
        let pattern = parse_pattern("[tag=jj] [tag=nn] | [lemma=dog]").unwrap();
        let clauses = compile(&pattern).unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[1].selectors.len(), 1);
    }

    #[test]
    fn test_optional_element_contributes_nothing() {
        let pattern = parse_pattern("[tag=jj]{0,2} [tag=nn]").unwrap();
        let clauses = compile(&pattern).unwrap();
        // Only the noun constraint survives; the optional adjective would
        // exclude sentences where it is absent.
        assert_eq!(clauses[0].selectors.len(), 1);
    }
}
