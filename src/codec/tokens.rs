//! Token-sequence codec: a sentence's full token stream as one opaque blob.
//!
//! The blob is stored as a per-document column on the sentence index, so a
//! matched sentence's tokens come back in one O(sentence length) decode with
//! no term-dictionary lookups.
//!
//! Format, per sentence:
//!
//! ```text
//! token_count: varint
//! per token:
//!   position: varint
//!   word:     varint len + utf-8
//!   lemma:    varint len + utf-8
//!   tag:      varint len + utf-8
//!   start:    varint
//!   end:      varint
//!   deprel:   varint len + utf-8      (only when the index carries deprels)
//! ```
//!
//! Whether deprels are present is decided once per index and recorded in the
//! index header; decoders never guess.

use crate::codec::varint::{encode_string, encode_varint, ByteReader};
use crate::error::{Error, Result};
use crate::types::Token;

/// Encode a sentence's tokens. `with_deprels` must match the index header.
pub fn encode_tokens(tokens: &[Token], with_deprels: bool, buf: &mut Vec<u8>) {
    encode_varint(tokens.len() as u64, buf);
    for token in tokens {
        encode_varint(token.position as u64, buf);
        encode_string(&token.word, buf);
        encode_string(&token.lemma, buf);
        encode_string(&token.tag, buf);
        encode_varint(token.start as u64, buf);
        encode_varint(token.end as u64, buf);
        if with_deprels {
            encode_string(token.deprel.as_deref().unwrap_or(""), buf);
        }
    }
}

/// Decode a full token sequence.
pub fn decode_tokens(blob: &[u8], with_deprels: bool) -> Result<Vec<Token>> {
    let mut reader = ByteReader::new(blob);
    let count = reader.read_varint()? as usize;
    // A token encodes to at least 6 bytes, so an absurd count is corruption.
    if count > blob.len() {
        return Err(Error::decode(format!("token count {count} exceeds blob size")));
    }
    let mut tokens = Vec::with_capacity(count);
    for _ in 0..count {
        tokens.push(decode_one(&mut reader, with_deprels)?);
    }
    Ok(tokens)
}

fn decode_one(reader: &mut ByteReader<'_>, with_deprels: bool) -> Result<Token> {
    let position = reader.read_varint()? as u32;
    let word = reader.read_string()?.to_string();
    let lemma = reader.read_string()?.to_string();
    let tag = reader.read_string()?.to_string();
    let start = reader.read_varint()? as u32;
    let end = reader.read_varint()? as u32;
    let deprel = if with_deprels {
        let label = reader.read_string()?;
        if label.is_empty() {
            None
        } else {
            Some(label.to_string())
        }
    } else {
        None
    };
    Ok(Token {
        position,
        word,
        lemma,
        tag,
        start,
        end,
        deprel,
    })
}

/// Return the token whose position field equals `pos`, if any.
///
/// Linear scan: sentences are short, and positions are strictly increasing,
/// so the scan stops early once past `pos`.
pub fn get_at_position(blob: &[u8], with_deprels: bool, pos: u32) -> Result<Option<Token>> {
    let mut reader = ByteReader::new(blob);
    let count = reader.read_varint()? as usize;
    for _ in 0..count {
        let token = decode_one(&mut reader, with_deprels)?;
        if token.position == pos {
            return Ok(Some(token));
        }
        if token.position > pos {
            break;
        }
    }
    Ok(None)
}

/// Return the inclusive slice of tokens with positions in `lo..=hi`.
pub fn get_range(blob: &[u8], with_deprels: bool, lo: u32, hi: u32) -> Result<Vec<Token>> {
    let mut reader = ByteReader::new(blob);
    let count = reader.read_varint()? as usize;
    let mut out = Vec::new();
    for _ in 0..count {
        let token = decode_one(&mut reader, with_deprels)?;
        if token.position > hi {
            break;
        }
        if token.position >= lo {
            out.push(token);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_tokens(with_deprels: bool) -> Vec<Token> {
        ["big", "dog", "runs"]
            .iter()
            .enumerate()
            .map(|(i, w)| Token {
                position: i as u32,
                word: w.to_string(),
                lemma: w.to_string(),
                tag: if i == 2 { "vbz" } else { "nn" }.to_string(),
                start: (i * 4) as u32,
                end: (i * 4 + w.len()) as u32,
                deprel: with_deprels.then(|| "amod".to_string()),
            })
            .collect()
    }

    #[test]
    fn test_roundtrip_without_deprels() {
        let tokens = sample_tokens(false);
        let mut blob = Vec::new();
        encode_tokens(&tokens, false, &mut blob);
        assert_eq!(decode_tokens(&blob, false).unwrap(), tokens);
    }

    #[test]
    fn test_roundtrip_with_deprels() {
        let tokens = sample_tokens(true);
        let mut blob = Vec::new();
        encode_tokens(&tokens, true, &mut blob);
        assert_eq!(decode_tokens(&blob, true).unwrap(), tokens);
    }

    #[test]
    fn test_get_at_position() {
        let tokens = sample_tokens(false);
        let mut blob = Vec::new();
        encode_tokens(&tokens, false, &mut blob);

        let token = get_at_position(&blob, false, 1).unwrap().unwrap();
        assert_eq!(token.word, "dog");
        assert!(get_at_position(&blob, false, 9).unwrap().is_none());
    }

    #[test]
    fn test_get_range_inclusive() {
        let tokens = sample_tokens(false);
        let mut blob = Vec::new();
        encode_tokens(&tokens, false, &mut blob);

        let range = get_range(&blob, false, 1, 2).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].word, "dog");
        assert_eq!(range[1].word, "runs");
    }

    #[test]
    fn test_truncated_blob_is_decode_error() {
        let tokens = sample_tokens(false);
        let mut blob = Vec::new();
        encode_tokens(&tokens, false, &mut blob);
        blob.truncate(blob.len() / 2);
        assert!(decode_tokens(&blob, false).is_err());
    }

    #[test]
    fn test_empty_sentence() {
        let mut blob = Vec::new();
        encode_tokens(&[], false, &mut blob);
        assert!(decode_tokens(&blob, false).unwrap().is_empty());
    }

    fn token_strategy() -> impl Strategy<Value = Vec<Token>> {
        fn word() -> impl Strategy<Value = String> {
            proptest::string::string_regex("[a-zA-Zäöüß]{0,8}").unwrap()
        }
        proptest::collection::vec((word(), word(), word()), 0..200).prop_map(|raw| {
            let mut offset = 0u32;
            raw.into_iter()
                .enumerate()
                .map(|(i, (word, lemma, tag))| {
                    let start = offset;
                    offset += word.chars().count() as u32 + 1;
                    Token {
                        position: i as u32,
                        word,
                        lemma,
                        tag,
                        start,
                        end: offset.saturating_sub(1),
                        deprel: None,
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(tokens in token_strategy()) {
            let mut blob = Vec::new();
            encode_tokens(&tokens, false, &mut blob);
            prop_assert_eq!(decode_tokens(&blob, false).unwrap(), tokens);
        }

        #[test]
        fn prop_positional_access_agrees_with_decode(tokens in token_strategy()) {
            let mut blob = Vec::new();
            encode_tokens(&tokens, false, &mut blob);
            for token in &tokens {
                let found = get_at_position(&blob, false, token.position).unwrap();
                prop_assert_eq!(found.as_ref(), Some(token));
            }
            let invalid = tokens.len() as u32;
            prop_assert!(get_at_position(&blob, false, invalid).unwrap().is_none());
        }
    }
}
