//! LEB128 varint encoding, the workhorse of every per-sentence blob.
//!
//! Little-endian base-128: seven data bits per byte plus a continuation bit.
//! Integers in token streams are small (positions, lengths, short offsets),
//! so most values fit in one byte.

use crate::error::{Error, Result};

/// A u64 needs at most 10 varint bytes; anything longer is corruption.
pub const MAX_VARINT_BYTES: usize = 10;

/// Append a varint to `buf`.
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        } else {
            buf.push(byte | 0x80);
        }
    }
}

/// Decode a varint from the front of `bytes`, returning (value, bytes consumed).
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    if bytes.is_empty() {
        return Err(Error::decode("empty buffer for varint"));
    }

    let mut result: u64 = 0;
    let mut shift = 0;
    let mut i = 0;

    while i < bytes.len() && i < MAX_VARINT_BYTES {
        let byte = bytes[i];
        result |= ((byte & 0x7F) as u64) << shift;
        i += 1;
        if byte & 0x80 == 0 {
            return Ok((result, i));
        }
        shift += 7;
    }

    if i >= MAX_VARINT_BYTES {
        Err(Error::decode("varint exceeds maximum length"))
    } else {
        Err(Error::decode("incomplete varint"))
    }
}

/// Cursor over a byte slice for sequential varint and string reads.
///
/// Every decoder in the crate goes through this, so truncation checks live
/// in exactly one place.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, consumed) = decode_varint(&self.bytes[self.pos.min(self.bytes.len())..])?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read a varint-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<&'a str> {
        let len = self.read_varint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| Error::decode("string length overflow"))?;
        if end > self.bytes.len() {
            return Err(Error::decode(format!(
                "truncated string: expected {} bytes, {} remain",
                len,
                self.bytes.len() - self.pos
            )));
        }
        let s = std::str::from_utf8(&self.bytes[self.pos..end])
            .map_err(|e| Error::decode(format!("invalid utf-8: {e}")))?;
        self.pos = end;
        Ok(s)
    }
}

/// Append a varint-length-prefixed UTF-8 string.
pub fn encode_string(s: &str, buf: &mut Vec<u8>) {
    encode_varint(s.len() as u64, buf);
    buf.extend_from_slice(s.as_bytes());
}
