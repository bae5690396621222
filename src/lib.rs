//! Corpus collocation engine: word-sketch queries over annotated corpora.
//!
//! Given a corpus of dependency-annotated sentences, this crate builds a
//! sentence-granular positional index and answers queries of the form
//! "for headword H under grammatical relation R, which collocate lemmas are
//! most strongly associated, and show me example sentences".
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────────────────┐
//! │ conllu   │──▶│ build         │──▶│ index/ + lexicon + stats │
//! │ (input)  │   │ (single pass) │   │ (mmap, read-only)        │
//! └──────────┘   └───────────────┘   └──────────┬───────────────┘
//!                                               │
//!            ┌──────────┐   ┌──────────┐   ┌────▼──────┐
//!            │ pattern  │──▶│ query::  │──▶│ query::   │
//!            │ (parse)  │   │ compile  │   │ verify    │
//!            └──────────┘   └──────────┘   └────┬──────┘
//!                                               │
//!            ┌────────────┐   ┌──────────┐  ┌───▼──────────┐
//!            │ precompute │◀──│ scoring  │◀─│ query::      │
//!            │ (.cx files)│   │ (logDice)│  │ executor     │
//!            └────────────┘   └──────────┘  └──────────────┘
//! ```
//!
//! The two-phase query design is the heart of it: the candidate compiler
//! turns a pattern into a permissive positional query (always a superset of
//! the true matches), and the verifier re-checks every candidate window
//! token by token. Precomputation runs the same verifier over the whole
//! corpus once, spills pair counts through an external sort, and serves
//! `(head, relation)` lookups from a memory-mapped file afterwards.
//!
//! # Usage
//!
//! ```ignore
//! use collox::{build_corpus, BuildConfig, CancellationToken, Engine,
//!              QueryConfig, RelationCatalog};
//!
//! let cancel = CancellationToken::new();
//! build_corpus(reader, dir, &BuildConfig::default(), &cancel)?;
//!
//! let catalog = RelationCatalog::load(&config_path)?;
//! let engine = Engine::open(dir, catalog)?;
//! let hits = engine.find_collocations("dog", "adj_mod", &QueryConfig::default(), &cancel)?;
//! ```

pub mod build;
pub mod cancel;
pub mod codec;
pub mod conllu;
pub mod engine;
pub mod error;
pub mod index;
pub mod lexicon;
pub mod pattern;
pub mod precompute;
pub mod query;
pub mod relations;
pub mod scoring;
pub mod stats;
pub mod types;
mod util;

pub use build::{build_corpus, BuildConfig, BuildReport, INDEX_DIR};
pub use cancel::CancellationToken;
pub use conllu::ConlluReader;
pub use engine::Engine;
pub use error::{Error, Result};
pub use index::{IndexReader, IndexWriter, SpanMatch, SpanSpec, TermSelector};
pub use lexicon::{LexiconBuilder, LexiconReader, LEXICON_FILE};
pub use pattern::{parse_pattern, Pattern};
pub use precompute::{
    PrecomputeConfig, Precomputer, SketchCollocate, SketchEntry, SketchReader, SKETCH_EXT,
};
pub use query::{ConcordanceLine, Executor, MatchResult};
pub use relations::{Relation, RelationCatalog};
pub use scoring::{log_dice, log_likelihood, mi3, t_score, ScoreKind};
pub use stats::{StatsBuilder, StatsReader, STATS_FILE, STATS_TSV_FILE};
pub use types::{
    normalize, Collocation, Example, Field, PosClass, QueryConfig, QueryOutcome, Sentence, Token,
};
