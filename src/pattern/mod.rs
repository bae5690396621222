//! The pattern language: token predicates, sequencing, distance ranges,
//! repetition, captures, and agreement.
//!
//! # Syntax
//!
//! ```text
//! query      := seq ('|' seq)*                  top-level alternation
//! seq        := item+ ('::' agreement ('&' agreement)*)?
//! item       := dist? (label ':')? '[' expr ']' rep?
//! dist       := '<' int ',' int '>'             range to the previous element
//! rep        := '{' uint ',' uint '}'           repetition, default {1,1}
//! expr       := and ('|' and)*
//! and        := unary ('&' unary)*
//! unary      := '!' unary | '(' expr ')' | prim
//! prim       := field ('='|'!=') value ('|' value)*
//! field      := lemma | word | tag | pos_group | deprel
//! agreement  := label '.' field ('='|'!=') label '.' field
//! ```
//!
//! Values are bare tokens or double-quoted strings; `*` and `?` glob, and a
//! trailing `.*` is accepted as the anchored-regex spelling of `*`. The
//! value `%head` is a placeholder substituted with the bound headword lemma
//! at compile time. All values are normalized (lowercased), matching the
//! index.
//!
//! Distance semantics: `pos(element) − pos(previous)` must fall within
//! `<dmin,dmax>`; the default `<1,1>` means immediately after. A negative
//! `dmax` places the element before its predecessor in text order.
//!
//! Examples:
//!
//! ```text
//! [tag=jj] [tag=nn]                       adjective right before a noun
//! [tag=nn] [lemma=be|seem|prove] [tag=jj] copular predicate
//! 1:[tag=nn] <1,3> 2:[tag=nn] :: 1.tag = 2.tag   agreeing noun pair
//! [pos_group=noun] <-3,-1> [lemma=%head]  head up to 3 tokens after a noun
//! ```

pub mod matcher;
pub mod parser;

pub use matcher::glob_match;
pub use parser::parse_pattern;

use crate::types::Field;

/// How a predicate compares a token attribute to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
}

/// A value a predicate compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Plain literal, already normalized.
    Literal(String),
    /// Glob with `*`/`?` wildcards, already normalized.
    Glob(String),
    /// `%head`: substituted with the bound headword lemma at compile time.
    HeadPlaceholder,
}

impl Value {
    /// Classify a raw (already normalized) value string.
    pub fn classify(raw: &str) -> Value {
        if raw == "%head" {
            return Value::HeadPlaceholder;
        }
        // Accept the anchored-regex spelling: ".*" behaves as "*".
        let converted = raw.replace(".*", "*");
        if converted.contains('*') || converted.contains('?') {
            Value::Glob(converted)
        } else {
            Value::Literal(converted)
        }
    }

    /// The exact string this value requires, when it is not a wildcard.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Value::Literal(s) => Some(s),
            _ => None,
        }
    }

    /// The literal stem before the first wildcard; empty for a leading
    /// wildcard.
    pub fn glob_prefix(&self) -> Option<&str> {
        match self {
            Value::Glob(g) => {
                let stem_end = g.find(['*', '?']).unwrap_or(g.len());
                Some(&g[..stem_end])
            }
            _ => None,
        }
    }

    /// Match a normalized candidate string against this value.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Value::Literal(s) => s == candidate,
            Value::Glob(g) => glob_match(g, candidate),
            Value::HeadPlaceholder => false,
        }
    }
}

/// A predicate over a single token slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pred {
    /// `field op value₁|value₂|…`: true when any value matches (Eq) or no
    /// value matches (Ne).
    Cmp {
        field: Field,
        op: CmpOp,
        values: Vec<Value>,
    },
    And(Vec<Pred>),
    Or(Vec<Pred>),
    Not(Box<Pred>),
}

impl Pred {
    /// Visit every `Cmp` leaf.
    pub fn for_each_cmp<'a>(&'a self, f: &mut impl FnMut(&'a Pred)) {
        match self {
            Pred::Cmp { .. } => f(self),
            Pred::And(items) | Pred::Or(items) => {
                for item in items {
                    item.for_each_cmp(f);
                }
            }
            Pred::Not(inner) => inner.for_each_cmp(f),
        }
    }

    /// True when any leaf references the `%head` placeholder.
    pub fn references_head(&self) -> bool {
        let mut found = false;
        self.for_each_cmp(&mut |leaf| {
            if let Pred::Cmp { values, .. } = leaf {
                if values.iter().any(|v| matches!(v, Value::HeadPlaceholder)) {
                    found = true;
                }
            }
        });
        found
    }

    /// Replace every `%head` placeholder with a literal lemma.
    pub fn bind_head(&mut self, head: &str) {
        match self {
            Pred::Cmp { values, .. } => {
                for value in values.iter_mut() {
                    if matches!(value, Value::HeadPlaceholder) {
                        *value = Value::Literal(head.to_string());
                    }
                }
            }
            Pred::And(items) | Pred::Or(items) => {
                for item in items {
                    item.bind_head(head);
                }
            }
            Pred::Not(inner) => inner.bind_head(head),
        }
    }
}

/// One element of a pattern sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternElement {
    pub pred: Pred,
    /// Capture label referenced by agreements and relation indices.
    pub label: Option<u32>,
    /// Repetition `{min,max}`, default `{1,1}`: the element matches a run of
    /// consecutive tokens, each satisfying the predicate.
    pub repeat: (u32, u32),
    /// Signed distance range to the previous element, default `<1,1>`.
    /// Ignored on the first element of a sequence.
    pub dist: (i32, i32),
}

impl PatternElement {
    pub fn new(pred: Pred) -> Self {
        Self {
            pred,
            label: None,
            repeat: (1, 1),
            dist: (1, 1),
        }
    }
}

/// An agreement rule: `label_a.field op label_b.field`, evaluated after a
/// full sequence match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    pub label_a: u32,
    pub field_a: Field,
    pub op: CmpOp,
    pub label_b: u32,
    pub field_b: Field,
}

/// One alternative: an ordered element sequence plus its agreements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSeq {
    pub elements: Vec<PatternElement>,
    pub agreements: Vec<Agreement>,
}

/// A parsed pattern: one or more alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub alternatives: Vec<PatternSeq>,
}

impl Pattern {
    /// Bind the `%head` placeholder in every alternative.
    pub fn bind_head(&mut self, head: &str) {
        for alt in &mut self.alternatives {
            for element in &mut alt.elements {
                element.pred.bind_head(head);
            }
        }
    }

    /// True when any alternative references `%head`.
    pub fn references_head(&self) -> bool {
        self.alternatives
            .iter()
            .flat_map(|a| a.elements.iter())
            .any(|e| e.pred.references_head())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_classification() {
        assert_eq!(Value::classify("dog"), Value::Literal("dog".into()));
        assert_eq!(Value::classify("nn*"), Value::Glob("nn*".into()));
        assert_eq!(Value::classify("nn.*"), Value::Glob("nn*".into()));
        assert_eq!(Value::classify("%head"), Value::HeadPlaceholder);
    }

    #[test]
    fn test_glob_prefix() {
        assert_eq!(Value::classify("nn*").glob_prefix(), Some("nn"));
        assert_eq!(Value::classify("*ing").glob_prefix(), Some(""));
        assert_eq!(Value::classify("dog").glob_prefix(), None);
    }

    #[test]
    fn test_bind_head_replaces_placeholder() {
        let mut pred = Pred::And(vec![
            Pred::Cmp {
                field: Field::Lemma,
                op: CmpOp::Eq,
                values: vec![Value::HeadPlaceholder],
            },
            Pred::Cmp {
                field: Field::Tag,
                op: CmpOp::Eq,
                values: vec![Value::Literal("nn".into())],
            },
        ]);
        assert!(pred.references_head());
        pred.bind_head("dog");
        assert!(!pred.references_head());
    }
}
