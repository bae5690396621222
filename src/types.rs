// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The building blocks of a collocation index.
//!
//! These types define how annotated sentences, tokens, and query results fit
//! together. Invariants worth keeping in mind:
//!
//! - **Token**: positions within a sentence are strictly increasing from 0;
//!   character offsets are non-decreasing and within the sentence text.
//!   `lemma` and `tag` are never empty (the reader substitutes placeholders).
//! - **Sentence**: `tokens.len()` equals the length of the lemma-id column
//!   and of the decoded token-sequence blob. Off-by-one here means garbage
//!   collocates.
//! - **Collocation lists**: sorted by score descending, ties broken by
//!   cooccurrence descending then lemma ascending.

use serde::{Deserialize, Serialize};

/// Placeholder tag for tokens whose annotation carried no part of speech.
pub const UNKNOWN_TAG: &str = "x";

/// Normalize a lexical key: trimmed and lowercased.
///
/// Applied uniformly at index time and query time, so every comparison in
/// the engine is case-insensitive.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

// =============================================================================
// TOKEN ATTRIBUTE FIELDS
// =============================================================================

/// The token attributes a pattern predicate or index term can address.
///
/// `PosGroup` is virtual: it never appears as an index field, the compiler
/// and verifier expand it to tag-prefix checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Lemma,
    Word,
    Tag,
    PosGroup,
    Deprel,
}

impl Field {
    pub fn parse(name: &str) -> Option<Field> {
        match name {
            "lemma" => Some(Field::Lemma),
            "word" => Some(Field::Word),
            "tag" => Some(Field::Tag),
            "pos_group" => Some(Field::PosGroup),
            "deprel" => Some(Field::Deprel),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Lemma => "lemma",
            Field::Word => "word",
            Field::Tag => "tag",
            Field::PosGroup => "pos_group",
            Field::Deprel => "deprel",
        }
    }
}

/// Coarse part-of-speech classes used by `pos_group` predicates and by
/// relation head/collocate classes.
///
/// Each class owns the tag prefixes it accepts, covering both Penn-style
/// (`NN`, `VBZ`, `JJ`, `RB`) and UD-style (`NOUN`, `VERB`, `ADJ`, `ADV`)
/// tag sets. Matching is prefix-based over normalized tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosClass {
    Noun,
    Verb,
    Adjective,
    Adverb,
}

impl PosClass {
    pub fn parse(name: &str) -> Option<PosClass> {
        match name {
            "noun" | "n" => Some(PosClass::Noun),
            "verb" | "v" => Some(PosClass::Verb),
            "adjective" | "adj" | "j" => Some(PosClass::Adjective),
            "adverb" | "adv" | "r" => Some(PosClass::Adverb),
            _ => None,
        }
    }

    /// Normalized tag prefixes accepted by this class.
    pub fn tag_prefixes(self) -> &'static [&'static str] {
        match self {
            PosClass::Noun => &["nn", "noun", "propn"],
            PosClass::Verb => &["vb", "verb", "aux", "md"],
            PosClass::Adjective => &["jj", "adj"],
            PosClass::Adverb => &["rb", "adv"],
        }
    }

    /// True when a normalized tag belongs to this class.
    pub fn matches_tag(self, tag: &str) -> bool {
        self.tag_prefixes().iter().any(|p| tag.starts_with(p))
    }
}

// =============================================================================
// SENTENCES AND TOKENS
// =============================================================================

/// A single word occurrence within one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// 0-based position within the sentence.
    pub position: u32,
    /// Surface form, original case.
    pub word: String,
    /// Normalized (lowercased) lemma. Never empty.
    pub lemma: String,
    /// Normalized part-of-speech tag. Never empty.
    pub tag: String,
    /// Start character offset within the sentence text.
    pub start: u32,
    /// End character offset within the sentence text.
    pub end: u32,
    /// Dependency relation label, when the corpus carried one.
    pub deprel: Option<String>,
}

impl Token {
    /// Read a token attribute as a normalized string for comparisons.
    ///
    /// `word` is lowercased on access (the stored form keeps its case for
    /// rendering); all other fields are already normalized at build time.
    /// `PosGroup` has no string value, callers expand it to tag checks.
    pub fn attr(&self, field: Field) -> Option<String> {
        match field {
            Field::Lemma => Some(self.lemma.clone()),
            Field::Word => Some(self.word.to_lowercase()),
            Field::Tag => Some(self.tag.clone()),
            Field::Deprel => self.deprel.clone(),
            Field::PosGroup => None,
        }
    }
}

/// One sentence document: id, raw text, ordered tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    /// Monotonically assigned during build; the canonical ordering for
    /// example selection.
    pub id: u32,
    /// Raw sentence text for example rendering.
    pub text: String,
    pub tokens: Vec<Token>,
}

// =============================================================================
// QUERY RESULTS
// =============================================================================

/// An example sentence supporting one collocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub sentence_id: u32,
    pub text: String,
    /// Token position of the headword occurrence.
    pub head_position: u32,
    /// Token position of the collocate occurrence.
    pub collocate_position: u32,
    /// Sentence text with `<b>…</b>` around the head and collocate tokens.
    pub highlighted: String,
}

/// One ranked collocate of a headword under a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collocation {
    pub lemma: String,
    /// Most frequent tag observed on the collocate occurrences.
    pub tag: String,
    pub cooccurrence: u64,
    pub collocate_frequency: u64,
    pub score: f64,
    pub examples: Vec<Example>,
}

/// Outcome of a cancellable query: either the result or a dedicated
/// cancellation value, which is neither a result nor an error.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<T> {
    Complete(T),
    Cancelled,
}

impl<T> QueryOutcome<T> {
    pub fn into_complete(self) -> Option<T> {
        match self {
            QueryOutcome::Complete(v) => Some(v),
            QueryOutcome::Cancelled => None,
        }
    }
}

/// Knobs for the online query executor.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Return at most this many collocates.
    pub top_k: usize,
    /// Drop collocates scoring below this.
    pub min_score: f64,
    /// Candidate sentences to process; 0 means exhaustive. When the
    /// candidate set is truncated, counts are scaled by `total / sample`.
    pub max_candidates: usize,
    /// Example sentences kept per collocate.
    pub examples_per_collocate: usize,
    /// Example sentences kept across the whole result.
    pub max_total_examples: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            min_score: 0.0,
            max_candidates: 0,
            examples_per_collocate: 3,
            max_total_examples: 10,
        }
    }
}

/// Canonical ordering for collocate lists: score descending, cooccurrence
/// descending, lemma ascending.
pub fn sort_collocations(list: &mut [Collocation]) {
    list.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.cooccurrence.cmp(&a.cooccurrence))
            .then(a.lemma.cmp(&b.lemma))
    });
}
