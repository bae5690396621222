//! Lemma-id codec: a sentence's ordered lemma ids as a compact blob.
//!
//! Same shape as the token-sequence codec but carrying only the lemma-id
//! array, so the precompute scan can walk a whole corpus without paying for
//! string decodes. The decode-into variant reuses a caller-owned buffer; the
//! scan loop calls it once per sentence and allocates nothing.

use crate::codec::varint::{encode_varint, ByteReader};
use crate::error::{Error, Result};

/// Encode an ordered lemma-id array.
pub fn encode_lemma_ids(ids: &[u32], buf: &mut Vec<u8>) {
    encode_varint(ids.len() as u64, buf);
    for &id in ids {
        encode_varint(id as u64, buf);
    }
}

/// Decode into a fresh vector.
pub fn decode_lemma_ids(blob: &[u8]) -> Result<Vec<u32>> {
    let mut out = Vec::new();
    decode_lemma_ids_into(blob, &mut out)?;
    Ok(out)
}

/// Decode into `out`, clearing it first. Returns the id count.
pub fn decode_lemma_ids_into(blob: &[u8], out: &mut Vec<u32>) -> Result<usize> {
    out.clear();
    let mut reader = ByteReader::new(blob);
    let count = reader.read_varint()? as usize;
    if count > blob.len() {
        return Err(Error::decode(format!(
            "lemma-id count {count} exceeds blob size"
        )));
    }
    out.reserve(count);
    for _ in 0..count {
        out.push(reader.read_varint()? as u32);
    }
    Ok(count)
}
