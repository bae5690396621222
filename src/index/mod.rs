//! The sentence index: a segmented positional inverted index.
//!
//! Each sentence is one document with positioned terms for the `lemma`,
//! `word`, `tag` (and optionally `deprel`) fields, plus per-document
//! columns: the token-sequence blob, the lemma-id blob, and the raw text.
//! Builds append through [`IndexWriter`] behind a single writer; queries go
//! through [`IndexReader`] over shared read-only memory maps.

pub mod reader;
pub mod segment;
pub mod writer;

pub use reader::{IndexReader, SpanMatch, SpanSpec, TermSelector};
pub use segment::{DocColumns, FormatFlags, SegmentBuilder, SegmentDoc, SegmentView};
pub use writer::{IndexManifest, IndexWriter, SegmentMeta, DEFAULT_SEGMENT_DOCS};
