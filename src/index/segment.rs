// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Segment binary format for the sentence index.
//!
//! A segment holds a contiguous run of sentences: positioned postings for
//! the `lemma`, `word`, `tag` (and optionally `deprel`) fields, plus three
//! per-document columns (token-sequence blob, lemma-id blob, sentence text)
//! addressable in O(1) through a fixed-width offset table.
//!
//! The header is fixed-size and parsed in one read; it tells you exactly
//! where every section lives. `SectionOffsets` is the single source of truth
//! for the layout; every read and write path goes through it. The footer is
//! a CRC32 over everything before it plus the header magic reversed; if the
//! footer is wrong, the file was corrupted or truncated and the segment
//! refuses to open.
//!
//! ```text
//! HEADER          [40 B]
//! TERM_DICT       sorted (field, term) entries → postings extents
//! POSTINGS        per term: delta-coded doc ordinals with positions
//! COLUMNS         per doc: tokens blob, lemma-id blob, text
//! COLUMN_OFFSETS  doc_count × u64 offsets into COLUMNS
//! FOOTER          [8 B] crc32 + reversed magic
//! ```

use std::collections::BTreeMap;

use crc32fast::Hasher as Crc32Hasher;

use crate::codec::varint::{encode_string, encode_varint, ByteReader};
use crate::error::{Error, Result};
use crate::types::Field;

/// Header magic: "CLXS".
pub const SEGMENT_MAGIC: [u8; 4] = *b"CLXS";
/// Footer magic: reversed header magic, marks a complete file.
pub const SEGMENT_FOOTER_MAGIC: [u8; 4] = *b"SXLC";
pub const SEGMENT_VERSION: u8 = 1;

const HEADER_SIZE: usize = 40;
const FOOTER_SIZE: usize = 8;

/// Format flags carried in the segment header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags(pub u8);

impl FormatFlags {
    pub const HAS_DEPRELS: u8 = 0b0000_0001;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_deprels(mut self, yes: bool) -> Self {
        if yes {
            self.0 |= Self::HAS_DEPRELS;
        }
        self
    }

    pub fn has_deprels(self) -> bool {
        self.0 & Self::HAS_DEPRELS != 0
    }
}

/// Map an indexable field to its on-disk code. `PosGroup` is virtual and
/// never stored.
pub fn field_code(field: Field) -> Option<u8> {
    match field {
        Field::Lemma => Some(0),
        Field::Word => Some(1),
        Field::Tag => Some(2),
        Field::Deprel => Some(3),
        Field::PosGroup => None,
    }
}

// =============================================================================
// HEADER
// =============================================================================

#[derive(Debug, Clone)]
pub struct SegmentHeader {
    pub version: u8,
    pub flags: FormatFlags,
    /// Global sentence id of this segment's first document.
    pub base_doc_id: u32,
    pub doc_count: u32,
    pub term_dict_len: u32,
    pub postings_len: u32,
    pub columns_len: u32,
    pub column_offsets_len: u32,
}

impl SegmentHeader {
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&SEGMENT_MAGIC);
        buf.push(self.version);
        buf.push(self.flags.0);
        buf.extend_from_slice(&[0u8; 2]); // reserved
        buf.extend_from_slice(&self.base_doc_id.to_le_bytes());
        buf.extend_from_slice(&self.doc_count.to_le_bytes());
        buf.extend_from_slice(&self.term_dict_len.to_le_bytes());
        buf.extend_from_slice(&self.postings_len.to_le_bytes());
        buf.extend_from_slice(&self.columns_len.to_le_bytes());
        buf.extend_from_slice(&self.column_offsets_len.to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]); // reserved
    }

    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::format("segment shorter than header"));
        }
        if bytes[..4] != SEGMENT_MAGIC {
            return Err(Error::format("bad segment magic"));
        }
        let version = bytes[4];
        if version != SEGMENT_VERSION {
            return Err(Error::format(format!(
                "unsupported segment version {version}"
            )));
        }
        let le32 = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap_or_default());
        Ok(Self {
            version,
            flags: FormatFlags(bytes[5]),
            base_doc_id: le32(8),
            doc_count: le32(12),
            term_dict_len: le32(16),
            postings_len: le32(20),
            columns_len: le32(24),
            column_offsets_len: le32(28),
        })
    }

    pub fn section_offsets(&self) -> SectionOffsets {
        let mut pos = HEADER_SIZE;
        let term_dict = (pos, pos + self.term_dict_len as usize);
        pos = term_dict.1;
        let postings = (pos, pos + self.postings_len as usize);
        pos = postings.1;
        let columns = (pos, pos + self.columns_len as usize);
        pos = columns.1;
        let column_offsets = (pos, pos + self.column_offsets_len as usize);
        pos = column_offsets.1;
        SectionOffsets {
            term_dict,
            postings,
            columns,
            column_offsets,
            footer: (pos, pos + FOOTER_SIZE),
        }
    }
}

/// Byte extents of every section. Single source of truth for the layout.
#[derive(Debug, Clone, Copy)]
pub struct SectionOffsets {
    pub term_dict: (usize, usize),
    pub postings: (usize, usize),
    pub columns: (usize, usize),
    pub column_offsets: (usize, usize),
    pub footer: (usize, usize),
}

impl SectionOffsets {
    pub fn content_size(&self) -> usize {
        self.footer.0
    }

    pub fn total_size(&self) -> usize {
        self.footer.1
    }

    pub fn slice<'a>(&self, bytes: &'a [u8], section: (usize, usize)) -> Result<&'a [u8]> {
        bytes
            .get(section.0..section.1)
            .ok_or_else(|| Error::format("segment section out of bounds"))
    }
}

// =============================================================================
// BUILD SIDE
// =============================================================================

/// One document's worth of indexable material.
pub struct SegmentDoc {
    /// (field code, normalized term, position) triples.
    pub terms: Vec<(u8, String, u32)>,
    pub tokens_blob: Vec<u8>,
    pub lemma_ids_blob: Vec<u8>,
    pub text: String,
}

/// In-memory accumulator for one segment.
pub struct SegmentBuilder {
    base_doc_id: u32,
    flags: FormatFlags,
    postings: BTreeMap<(u8, Vec<u8>), Vec<(u32, Vec<u32>)>>,
    columns: Vec<u8>,
    column_offsets: Vec<u64>,
    doc_count: u32,
}

impl SegmentBuilder {
    pub fn new(base_doc_id: u32, flags: FormatFlags) -> Self {
        Self {
            base_doc_id,
            flags,
            postings: BTreeMap::new(),
            columns: Vec::new(),
            column_offsets: Vec::new(),
            doc_count: 0,
        }
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    pub fn base_doc_id(&self) -> u32 {
        self.base_doc_id
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Rough heap occupancy, used by the writer to decide when to flush.
    pub fn approximate_bytes(&self) -> usize {
        self.columns.len() + self.postings.len() * 48
    }

    /// Append one document. Ordinals are assigned in call order.
    pub fn add(&mut self, doc: SegmentDoc) {
        let ordinal = self.doc_count;
        self.doc_count += 1;

        for (field, term, position) in doc.terms {
            let list = self.postings.entry((field, term.into_bytes())).or_default();
            match list.last_mut() {
                Some((last_ordinal, positions)) if *last_ordinal == ordinal => {
                    positions.push(position);
                }
                _ => list.push((ordinal, vec![position])),
            }
        }

        self.column_offsets.push(self.columns.len() as u64);
        encode_varint(doc.tokens_blob.len() as u64, &mut self.columns);
        self.columns.extend_from_slice(&doc.tokens_blob);
        encode_varint(doc.lemma_ids_blob.len() as u64, &mut self.columns);
        self.columns.extend_from_slice(&doc.lemma_ids_blob);
        encode_string(&doc.text, &mut self.columns);
    }

    /// Serialize to the on-disk layout, footer included.
    pub fn finish(self) -> Vec<u8> {
        // Postings section, term dictionary pointing into it.
        let mut postings_buf = Vec::new();
        let mut term_dict = Vec::new();
        encode_varint(self.postings.len() as u64, &mut term_dict);
        for ((field, term), docs) in &self.postings {
            let start = postings_buf.len();
            encode_varint(docs.len() as u64, &mut postings_buf);
            let mut prev_ordinal = 0u32;
            for (i, (ordinal, positions)) in docs.iter().enumerate() {
                let delta = if i == 0 { *ordinal } else { ordinal - prev_ordinal };
                prev_ordinal = *ordinal;
                encode_varint(delta as u64, &mut postings_buf);
                encode_varint(positions.len() as u64, &mut postings_buf);
                let mut prev_pos = 0u32;
                for (j, &pos) in positions.iter().enumerate() {
                    let pos_delta = if j == 0 { pos } else { pos - prev_pos };
                    prev_pos = pos;
                    encode_varint(pos_delta as u64, &mut postings_buf);
                }
            }
            term_dict.push(*field);
            encode_varint(term.len() as u64, &mut term_dict);
            term_dict.extend_from_slice(term);
            encode_varint(start as u64, &mut term_dict);
            encode_varint((postings_buf.len() - start) as u64, &mut term_dict);
        }

        let mut offsets_buf = Vec::with_capacity(self.column_offsets.len() * 8);
        for off in &self.column_offsets {
            offsets_buf.extend_from_slice(&off.to_le_bytes());
        }

        let header = SegmentHeader {
            version: SEGMENT_VERSION,
            flags: self.flags,
            base_doc_id: self.base_doc_id,
            doc_count: self.doc_count,
            term_dict_len: term_dict.len() as u32,
            postings_len: postings_buf.len() as u32,
            columns_len: self.columns.len() as u32,
            column_offsets_len: offsets_buf.len() as u32,
        };

        let mut out = Vec::with_capacity(
            HEADER_SIZE
                + term_dict.len()
                + postings_buf.len()
                + self.columns.len()
                + offsets_buf.len()
                + FOOTER_SIZE,
        );
        header.write(&mut out);
        out.extend_from_slice(&term_dict);
        out.extend_from_slice(&postings_buf);
        out.extend_from_slice(&self.columns);
        out.extend_from_slice(&offsets_buf);

        let mut hasher = Crc32Hasher::new();
        hasher.update(&out);
        out.extend_from_slice(&hasher.finalize().to_le_bytes());
        out.extend_from_slice(&SEGMENT_FOOTER_MAGIC);
        out
    }
}

// =============================================================================
// READ SIDE
// =============================================================================

/// A parsed term-dictionary entry.
#[derive(Debug, Clone)]
struct TermEntry {
    field: u8,
    term: Vec<u8>,
    postings_start: u32,
    postings_len: u32,
}

/// Zero-copy view over one document's columns.
pub struct DocColumns<'a> {
    pub tokens_blob: &'a [u8],
    pub lemma_ids_blob: &'a [u8],
    pub text: &'a str,
}

/// Read-only segment over an owned byte container: a memory map in
/// production, a plain vector in tests.
pub struct SegmentView<B> {
    bytes: B,
    header: SegmentHeader,
    sections: SectionOffsets,
    /// Sorted by (field, term), mirroring on-disk order.
    terms: Vec<TermEntry>,
}

impl<B: AsRef<[u8]>> SegmentView<B> {
    /// Parse and validate a segment, CRC included.
    pub fn open(backing: B) -> Result<Self> {
        let bytes = backing.as_ref();
        let header = SegmentHeader::read(bytes)?;
        let sections = header.section_offsets();
        if bytes.len() != sections.total_size() {
            return Err(Error::format(format!(
                "segment size {} does not match header ({} expected)",
                bytes.len(),
                sections.total_size()
            )));
        }

        let footer = &bytes[sections.footer.0..sections.footer.1];
        if footer[4..8] != SEGMENT_FOOTER_MAGIC {
            return Err(Error::format("bad segment footer magic"));
        }
        let stored_crc = u32::from_le_bytes(footer[..4].try_into().unwrap_or_default());
        let mut hasher = Crc32Hasher::new();
        hasher.update(&bytes[..sections.content_size()]);
        if hasher.finalize() != stored_crc {
            return Err(Error::format("segment crc mismatch"));
        }

        let dict_bytes = sections.slice(bytes, sections.term_dict)?;
        let mut reader = ByteReader::new(dict_bytes);
        let term_count = reader.read_varint()? as usize;
        if term_count > dict_bytes.len() {
            return Err(Error::format("term count exceeds dictionary size"));
        }
        let mut terms = Vec::with_capacity(term_count);
        for _ in 0..term_count {
            let field = reader.read_varint()? as u8;
            let term = reader.read_string()?.as_bytes().to_vec();
            let postings_start = reader.read_varint()? as u32;
            let postings_len = reader.read_varint()? as u32;
            terms.push(TermEntry {
                field,
                term,
                postings_start,
                postings_len,
            });
        }

        Ok(Self {
            bytes: backing,
            header,
            sections,
            terms,
        })
    }

    pub fn base_doc_id(&self) -> u32 {
        self.header.base_doc_id
    }

    pub fn doc_count(&self) -> u32 {
        self.header.doc_count
    }

    pub fn has_deprels(&self) -> bool {
        self.header.flags.has_deprels()
    }

    fn term_rank(&self, field: u8, term: &[u8]) -> Option<usize> {
        self.terms
            .binary_search_by(|e| (e.field, e.term.as_slice()).cmp(&(field, term)))
            .ok()
    }

    /// Decode the postings for one (field, term): `(local ordinal, positions)`
    /// pairs in ordinal order. Empty when the term is absent.
    pub fn postings(&self, field: Field, term: &str) -> Result<Vec<(u32, Vec<u32>)>> {
        let Some(code) = field_code(field) else {
            return Ok(Vec::new());
        };
        match self.term_rank(code, term.as_bytes()) {
            Some(rank) => self.decode_postings(&self.terms[rank]),
            None => Ok(Vec::new()),
        }
    }

    /// Union of postings over every term in `field` starting with `prefix`,
    /// positions merged per ordinal.
    pub fn postings_with_prefix(&self, field: Field, prefix: &str) -> Result<Vec<(u32, Vec<u32>)>> {
        let Some(code) = field_code(field) else {
            return Ok(Vec::new());
        };
        let start = self
            .terms
            .partition_point(|e| (e.field, e.term.as_slice()) < (code, prefix.as_bytes()));
        let mut merged: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for entry in &self.terms[start..] {
            if entry.field != code || !entry.term.starts_with(prefix.as_bytes()) {
                break;
            }
            for (ordinal, mut positions) in self.decode_postings(entry)? {
                merged.entry(ordinal).or_default().append(&mut positions);
            }
        }
        Ok(merged
            .into_iter()
            .map(|(ordinal, mut positions)| {
                positions.sort_unstable();
                positions.dedup();
                (ordinal, positions)
            })
            .collect())
    }

    fn decode_postings(&self, entry: &TermEntry) -> Result<Vec<(u32, Vec<u32>)>> {
        let section = self.sections.slice(self.bytes.as_ref(), self.sections.postings)?;
        let start = entry.postings_start as usize;
        let end = start + entry.postings_len as usize;
        let slice = section
            .get(start..end)
            .ok_or_else(|| Error::format("postings extent out of bounds"))?;
        let mut reader = ByteReader::new(slice);
        let doc_count = reader.read_varint()? as usize;
        let mut out = Vec::with_capacity(doc_count);
        let mut ordinal = 0u32;
        for i in 0..doc_count {
            let delta = reader.read_varint()? as u32;
            ordinal = if i == 0 { delta } else { ordinal + delta };
            let pos_count = reader.read_varint()? as usize;
            let mut positions = Vec::with_capacity(pos_count);
            let mut pos = 0u32;
            for j in 0..pos_count {
                let pos_delta = reader.read_varint()? as u32;
                pos = if j == 0 { pos_delta } else { pos + pos_delta };
                positions.push(pos);
            }
            out.push((ordinal, positions));
        }
        Ok(out)
    }

    /// O(1) access to one document's columns by local ordinal.
    pub fn doc_columns(&self, ordinal: u32) -> Result<DocColumns<'_>> {
        if ordinal >= self.header.doc_count {
            return Err(Error::invariant(format!(
                "doc ordinal {ordinal} out of range ({} docs)",
                self.header.doc_count
            )));
        }
        let bytes = self.bytes.as_ref();
        let offsets = self.sections.slice(bytes, self.sections.column_offsets)?;
        let at = ordinal as usize * 8;
        let start = u64::from_le_bytes(offsets[at..at + 8].try_into().unwrap_or_default()) as usize;
        let columns = self.sections.slice(bytes, self.sections.columns)?;
        let slice = columns
            .get(start..)
            .ok_or_else(|| Error::format("column offset out of bounds"))?;

        let mut reader = ByteReader::new(slice);
        let tokens_len = reader.read_varint()? as usize;
        let tokens_start = reader.position();
        let tokens_blob = slice
            .get(tokens_start..tokens_start + tokens_len)
            .ok_or_else(|| Error::decode("truncated tokens column"))?;

        let mut reader = ByteReader::new(&slice[tokens_start + tokens_len..]);
        let lemma_len = reader.read_varint()? as usize;
        let lemma_start = tokens_start + tokens_len + reader.position();
        let lemma_ids_blob = slice
            .get(lemma_start..lemma_start + lemma_len)
            .ok_or_else(|| Error::decode("truncated lemma-id column"))?;

        let mut reader = ByteReader::new(&slice[lemma_start + lemma_len..]);
        let text = reader.read_string()?;

        Ok(DocColumns {
            tokens_blob,
            lemma_ids_blob,
            text,
        })
    }
}
