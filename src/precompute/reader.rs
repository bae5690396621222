// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The precomputed collocation file: write side and memory-mapped reader.
//!
//! One file per relation, named `<relation_id>.cx`. The layout favors
//! query-time lookup: a fixed 64-byte header, variable-length entries, and
//! an offset table sorted by head string for binary search. Lemma and POS
//! strings returned by the reader are zero-copy views into the map.
//!
//! ```text
//! header (64 B):
//!   magic "CLXP" | version u32 | entry_count u32 | window u32 | k u32
//!   total_tokens u64 | offset_table_offset u64 | offset_table_size u64
//!   padding to 64
//! data: per entry
//!   head u16-len + utf-8 | head_frequency u64 | collocate_count u16
//!   per collocate: lemma u8-len + utf-8 | pos u8-len + utf-8
//!                  cooccurrence u64 | frequency u64 | score f32
//! offset table:
//!   entry_count u32, then (head u16-len + utf-8, data_offset u64)
//!   in lexicographic head order
//! ```
//!
//! All integers little-endian; strings UTF-8 without BOM.

use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::types::normalize;
use crate::util::{map_file, write_atomic};

pub const SKETCH_MAGIC: [u8; 4] = *b"CLXP";
pub const SKETCH_VERSION: u32 = 1;
pub const SKETCH_HEADER_LEN: usize = 64;

/// File extension for precomputed relation files.
pub const SKETCH_EXT: &str = "cx";

// =============================================================================
// WRITE SIDE
// =============================================================================

/// One entry headed for the file, strings already resolved.
#[derive(Debug, Clone)]
pub struct SketchFileEntry {
    pub head: String,
    pub head_frequency: u64,
    pub collocates: Vec<SketchFileCollocate>,
}

#[derive(Debug, Clone)]
pub struct SketchFileCollocate {
    pub lemma: String,
    pub pos: String,
    pub cooccurrence: u64,
    pub frequency: u64,
    pub score: f32,
}

/// Serialize and atomically publish one relation's precomputed file.
/// Entries may arrive in any order; the offset table is sorted here.
pub fn write_sketch_file(
    path: &Path,
    entries: &[SketchFileEntry],
    window: u32,
    k: u32,
    total_tokens: u64,
) -> Result<()> {
    let mut data = Vec::new();
    let mut table_keys: Vec<(&str, u64)> = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.head.len() > u16::MAX as usize {
            return Err(Error::invariant(format!(
                "head lemma exceeds {} bytes",
                u16::MAX
            )));
        }
        let offset = SKETCH_HEADER_LEN as u64 + data.len() as u64;
        table_keys.push((entry.head.as_str(), offset));

        data.extend_from_slice(&(entry.head.len() as u16).to_le_bytes());
        data.extend_from_slice(entry.head.as_bytes());
        data.extend_from_slice(&entry.head_frequency.to_le_bytes());
        let count = entry.collocates.len().min(u16::MAX as usize);
        data.extend_from_slice(&(count as u16).to_le_bytes());
        for collocate in entry.collocates.iter().take(count) {
            push_short_str(&mut data, &collocate.lemma);
            push_short_str(&mut data, &collocate.pos);
            data.extend_from_slice(&collocate.cooccurrence.to_le_bytes());
            data.extend_from_slice(&collocate.frequency.to_le_bytes());
            data.extend_from_slice(&collocate.score.to_le_bytes());
        }
    }

    table_keys.sort_by(|a, b| a.0.cmp(b.0));
    let mut table = Vec::new();
    table.extend_from_slice(&(table_keys.len() as u32).to_le_bytes());
    for (head, offset) in &table_keys {
        table.extend_from_slice(&(head.len() as u16).to_le_bytes());
        table.extend_from_slice(head.as_bytes());
        table.extend_from_slice(&offset.to_le_bytes());
    }

    let table_offset = (SKETCH_HEADER_LEN + data.len()) as u64;
    let mut out = Vec::with_capacity(SKETCH_HEADER_LEN + data.len() + table.len());
    out.extend_from_slice(&SKETCH_MAGIC);
    out.extend_from_slice(&SKETCH_VERSION.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    out.extend_from_slice(&window.to_le_bytes());
    out.extend_from_slice(&k.to_le_bytes());
    out.extend_from_slice(&total_tokens.to_le_bytes());
    out.extend_from_slice(&table_offset.to_le_bytes());
    out.extend_from_slice(&(table.len() as u64).to_le_bytes());
    out.resize(SKETCH_HEADER_LEN, 0);
    out.extend_from_slice(&data);
    out.extend_from_slice(&table);
    write_atomic(path, &out)
}

fn push_short_str(buf: &mut Vec<u8>, s: &str) {
    let s = if s.len() > u8::MAX as usize {
        &s[..u8::MAX as usize]
    } else {
        s
    };
    buf.push(s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
}

// =============================================================================
// READ SIDE (C12)
// =============================================================================

/// Zero-copy view of one precomputed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SketchEntry<'a> {
    pub head: &'a str,
    pub head_frequency: u64,
    pub collocates: Vec<SketchCollocate<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SketchCollocate<'a> {
    pub lemma: &'a str,
    pub pos: &'a str,
    pub cooccurrence: u64,
    pub frequency: u64,
    pub score: f32,
}

/// Memory-mapped random-access reader over one relation's precomputed file.
pub struct SketchReader {
    map: Mmap,
    entry_count: u32,
    window: u32,
    k: u32,
    total_tokens: u64,
    /// Byte offset of each offset-table entry, in table (lexicographic)
    /// order.
    table_offsets: Vec<u32>,
}

impl SketchReader {
    pub fn open(path: &Path) -> Result<Self> {
        let map = map_file(path)?;
        let bytes: &[u8] = &map;
        if bytes.len() < SKETCH_HEADER_LEN {
            return Err(Error::format("precomputed file shorter than header"));
        }
        if bytes[..4] != SKETCH_MAGIC {
            return Err(Error::format("bad precomputed-file magic"));
        }
        let le32 = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap_or_default());
        let le64 = |at: usize| u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap_or_default());
        let version = le32(4);
        if version != SKETCH_VERSION {
            return Err(Error::format(format!(
                "unsupported precomputed-file version {version}"
            )));
        }
        let entry_count = le32(8);
        let window = le32(12);
        let k = le32(16);
        let total_tokens = le64(20);
        let table_offset = le64(28) as usize;
        let table_size = le64(36) as usize;
        if table_offset + table_size != bytes.len() {
            return Err(Error::format("offset table extent does not match file size"));
        }

        let table = &bytes[table_offset..];
        if table.len() < 4 {
            return Err(Error::format("offset table truncated"));
        }
        let table_count =
            u32::from_le_bytes(table[..4].try_into().unwrap_or_default()) as usize;
        if table_count != entry_count as usize {
            return Err(Error::format("offset table count disagrees with header"));
        }
        let mut table_offsets = Vec::with_capacity(table_count);
        let mut at = 4usize;
        for i in 0..table_count {
            if at + 2 > table.len() {
                return Err(Error::format(format!("offset table truncated at entry {i}")));
            }
            table_offsets.push((table_offset + at) as u32);
            let len = u16::from_le_bytes(table[at..at + 2].try_into().unwrap_or_default()) as usize;
            at += 2 + len + 8;
            if at > table.len() {
                return Err(Error::format(format!("offset table truncated at entry {i}")));
            }
        }

        Ok(Self {
            map,
            entry_count,
            window,
            k,
            total_tokens,
            table_offsets,
        })
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    fn table_head(&self, rank: usize) -> (&[u8], u64) {
        let bytes: &[u8] = &self.map;
        let at = self.table_offsets[rank] as usize;
        let len = u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap_or_default()) as usize;
        let head = &bytes[at + 2..at + 2 + len];
        let offset =
            u64::from_le_bytes(bytes[at + 2 + len..at + 10 + len].try_into().unwrap_or_default());
        (head, offset)
    }

    /// Binary-search lookup by head lemma.
    pub fn lookup(&self, head: &str) -> Result<Option<SketchEntry<'_>>> {
        let key = normalize(head);
        let mut lo = 0usize;
        let mut hi = self.table_offsets.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (head_bytes, offset) = self.table_head(mid);
            match head_bytes.cmp(key.as_bytes()) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(self.entry_at(offset as usize)?)),
            }
        }
        Ok(None)
    }

    fn entry_at(&self, offset: usize) -> Result<SketchEntry<'_>> {
        let bytes: &[u8] = &self.map;
        let read_err = || Error::format("precomputed entry out of bounds");

        let mut at = offset;
        let head_len = u16::from_le_bytes(
            bytes.get(at..at + 2).ok_or_else(read_err)?.try_into().unwrap_or_default(),
        ) as usize;
        at += 2;
        let head = std::str::from_utf8(bytes.get(at..at + head_len).ok_or_else(read_err)?)
            .map_err(|e| Error::format(format!("precomputed head not utf-8: {e}")))?;
        at += head_len;
        let head_frequency = u64::from_le_bytes(
            bytes.get(at..at + 8).ok_or_else(read_err)?.try_into().unwrap_or_default(),
        );
        at += 8;
        let count = u16::from_le_bytes(
            bytes.get(at..at + 2).ok_or_else(read_err)?.try_into().unwrap_or_default(),
        ) as usize;
        at += 2;

        let mut collocates = Vec::with_capacity(count);
        for _ in 0..count {
            let (lemma, next) = read_short_str(bytes, at)?;
            at = next;
            let (pos, next) = read_short_str(bytes, at)?;
            at = next;
            let cooccurrence = u64::from_le_bytes(
                bytes.get(at..at + 8).ok_or_else(read_err)?.try_into().unwrap_or_default(),
            );
            at += 8;
            let frequency = u64::from_le_bytes(
                bytes.get(at..at + 8).ok_or_else(read_err)?.try_into().unwrap_or_default(),
            );
            at += 8;
            let score = f32::from_le_bytes(
                bytes.get(at..at + 4).ok_or_else(read_err)?.try_into().unwrap_or_default(),
            );
            at += 4;
            collocates.push(SketchCollocate {
                lemma,
                pos,
                cooccurrence,
                frequency,
                score,
            });
        }
        Ok(SketchEntry {
            head,
            head_frequency,
            collocates,
        })
    }
}

fn read_short_str(bytes: &[u8], at: usize) -> Result<(&str, usize)> {
    let len = *bytes
        .get(at)
        .ok_or_else(|| Error::format("precomputed entry out of bounds"))? as usize;
    let start = at + 1;
    let s = std::str::from_utf8(
        bytes
            .get(start..start + len)
            .ok_or_else(|| Error::format("precomputed entry out of bounds"))?,
    )
    .map_err(|e| Error::format(format!("precomputed string not utf-8: {e}")))?;
    Ok((s, start + len))
}
