//! Per-sentence binary codecs.
//!
//! Two column formats ride on the sentence index: the full token sequence
//! (everything needed to render and verify a sentence) and the bare lemma-id
//! array (everything the precompute scan needs). Both are varint-packed and
//! decode in one pass.

pub mod lemma_ids;
pub mod tokens;
pub mod varint;

pub use lemma_ids::{decode_lemma_ids, decode_lemma_ids_into, encode_lemma_ids};
pub use tokens::{decode_tokens, encode_tokens, get_at_position, get_range};
pub use varint::{decode_varint, encode_string, encode_varint, ByteReader, MAX_VARINT_BYTES};
