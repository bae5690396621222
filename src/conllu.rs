//! CoNLL-U corpus reader.
//!
//! Sentences arrive pre-annotated: comment lines (`# text = …` carries the
//! sentence text), then one tab-separated line per token
//! (`id word lemma upos xpos feats head deprel deps misc`), terminated by a
//! blank line. Multi-word token lines (id containing `-`) and empty-node
//! lines (id containing `.`) are skipped. Malformed token lines are skipped
//! and tallied, never fatal.
//!
//! Tag choice: `xpos` when present and not `_`, else `upos`, else `x`.
//! An `_` lemma falls back to the word form.

use std::io::BufRead;

use log::warn;

use crate::error::{Error, Result};
use crate::types::{normalize, Sentence, Token, UNKNOWN_TAG};

/// Streaming reader over a CoNLL-U source, yielding one [`Sentence`] per
/// block. Sentence ids are assigned in reading order starting at 0.
pub struct ConlluReader<R> {
    input: R,
    next_id: u32,
    skipped_lines: u64,
    done: bool,
}

impl<R: BufRead> ConlluReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            next_id: 0,
            skipped_lines: 0,
            done: false,
        }
    }

    /// Malformed token lines skipped so far.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    fn read_sentence(&mut self) -> Result<Option<Sentence>> {
        let mut text: Option<String> = None;
        let mut rows: Vec<TokenRow> = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let n = self.input.read_line(&mut line).map_err(Error::IndexIo)?;
            if n == 0 {
                self.done = true;
                break;
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                if rows.is_empty() && text.is_none() {
                    continue; // stray blank between sentences
                }
                break;
            }
            if let Some(comment) = trimmed.strip_prefix('#') {
                if let Some(value) = comment.trim_start().strip_prefix("text =") {
                    text = Some(value.trim().to_string());
                } else if let Some(value) = comment.trim_start().strip_prefix("text=") {
                    text = Some(value.trim().to_string());
                }
                continue;
            }
            match parse_token_row(trimmed) {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {} // multi-word token or empty node
                Err(err) => {
                    self.skipped_lines += 1;
                    warn!("skipping malformed conllu line: {err}");
                }
            }
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let text = text.unwrap_or_else(|| {
            rows.iter()
                .map(|r| r.word.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        let tokens = align_tokens(&text, rows);
        let id = self.next_id;
        self.next_id += 1;
        Ok(Some(Sentence { id, text, tokens }))
    }
}

impl<R: BufRead> Iterator for ConlluReader<R> {
    type Item = Result<Sentence>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            match self.read_sentence() {
                Ok(Some(sentence)) => return Some(Ok(sentence)),
                Ok(None) if self.done => return None,
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

struct TokenRow {
    word: String,
    lemma: String,
    tag: String,
    deprel: Option<String>,
}

fn parse_token_row(line: &str) -> Result<Option<TokenRow>> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 8 {
        return Err(Error::decode(format!(
            "expected at least 8 tab-separated fields, got {}",
            fields.len()
        )));
    }
    let id = fields[0];
    if id.contains('-') || id.contains('.') {
        return Ok(None);
    }
    if id.parse::<u32>().is_err() {
        return Err(Error::decode(format!("non-numeric token id {id:?}")));
    }

    let word = fields[1].to_string();
    let lemma_field = fields[2];
    let upos = fields[3];
    let xpos = fields[4];
    let deprel_field = fields[7];

    let lemma = if lemma_field == "_" || lemma_field.is_empty() {
        normalize(&word)
    } else {
        normalize(lemma_field)
    };
    let lemma = if lemma.is_empty() {
        "_".to_string()
    } else {
        lemma
    };

    let tag = if xpos != "_" && !xpos.is_empty() {
        normalize(xpos)
    } else if upos != "_" && !upos.is_empty() {
        normalize(upos)
    } else {
        UNKNOWN_TAG.to_string()
    };

    let deprel = match deprel_field {
        "_" | "" => None,
        label => Some(normalize(label)),
    };

    Ok(Some(TokenRow {
        word,
        lemma,
        tag,
        deprel,
    }))
}

/// Compute character offsets by aligning token forms against the sentence
/// text left to right. A form that cannot be located (tokenization artifacts,
/// normalized quotes) gets synthesized offsets at the current cursor; offsets
/// stay non-decreasing either way.
fn align_tokens(text: &str, rows: Vec<TokenRow>) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut cursor = 0usize;
    let mut tokens = Vec::with_capacity(rows.len());

    for (position, row) in rows.into_iter().enumerate() {
        let word_chars: Vec<char> = row.word.chars().collect();
        let found = find_chars(&chars, &word_chars, cursor);
        let (start, end) = match found {
            Some(at) => (at, at + word_chars.len()),
            None => (cursor.min(chars.len()), cursor.min(chars.len())),
        };
        cursor = end;
        tokens.push(Token {
            position: position as u32,
            word: row.word,
            lemma: row.lemma,
            tag: row.tag,
            start: start as u32,
            end: end as u32,
            deprel: row.deprel,
        });
    }
    tokens
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    let last_start = haystack.len().checked_sub(needle.len())?;
    (from..=last_start).find(|&at| haystack[at..at + needle.len()] == *needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
# sent_id = 1
# text = The big dog runs.
1\tThe\tthe\tDET\tDT\t_\t3\tdet\t_\t_
2\tbig\tbig\tADJ\tJJ\t_\t3\tamod\t_\t_
3\tdog\tdog\tNOUN\tNN\t_\t4\tnsubj\t_\t_
4\truns\trun\tVERB\tVBZ\t_\t0\troot\t_\t_
5\t.\t.\tPUNCT\t.\t_\t4\tpunct\t_\t_

# text = Red houses stand.
1\tRed\tred\tADJ\tJJ\t_\t2\tamod\t_\t_
2\thouses\thouse\tNOUN\tNNS\t_\t3\tnsubj\t_\t_
3\tstand\tstand\tVERB\tVBP\t_\t0\troot\t_\t_
";

    #[test]
    fn test_reads_sentences_in_order() {
        let mut reader = ConlluReader::new(Cursor::new(SAMPLE));
        let first = reader.next().unwrap().unwrap();
        let second = reader.next().unwrap().unwrap();
        assert!(reader.next().is_none());

        assert_eq!(first.id, 0);
        assert_eq!(first.text, "The big dog runs.");
        assert_eq!(first.tokens.len(), 5);
        assert_eq!(second.id, 1);
        assert_eq!(second.tokens.len(), 3);
    }

    #[test]
    fn test_xpos_preferred_over_upos() {
        let mut reader = ConlluReader::new(Cursor::new(SAMPLE));
        let sentence = reader.next().unwrap().unwrap();
        assert_eq!(sentence.tokens[1].tag, "jj");
        assert_eq!(sentence.tokens[3].tag, "vbz");
    }

    #[test]
    fn test_upos_fallback_and_lemma_fallback() {
        let block = "1\tRunning\t_\tVERB\t_\t_\t0\troot\t_\t_\n\n";
        let mut reader = ConlluReader::new(Cursor::new(block));
        let sentence = reader.next().unwrap().unwrap();
        let token = &sentence.tokens[0];
        assert_eq!(token.tag, "verb");
        assert_eq!(token.lemma, "running");
    }

    #[test]
    fn test_multiword_and_empty_nodes_skipped() {
        let block = "\
# text = vámonos
1-2\tvámonos\t_\t_\t_\t_\t_\t_\t_\t_
1\tvamos\tir\tVERB\t_\t_\t0\troot\t_\t_
2\tnos\tnosotros\tPRON\t_\t_\t1\tobj\t_\t_
2.1\telided\t_\t_\t_\t_\t_\t_\t_\t_
";
        let mut reader = ConlluReader::new(Cursor::new(block));
        let sentence = reader.next().unwrap().unwrap();
        assert_eq!(sentence.tokens.len(), 2);
        assert_eq!(sentence.tokens[0].lemma, "ir");
        assert_eq!(reader.skipped_lines(), 0);
    }

    #[test]
    fn test_malformed_lines_tallied_not_fatal() {
        let block = "\
# text = ok line
garbage without tabs
1\tok\tok\tADJ\t_\t_\t0\troot\t_\t_
";
        let mut reader = ConlluReader::new(Cursor::new(block));
        let sentence = reader.next().unwrap().unwrap();
        assert_eq!(sentence.tokens.len(), 1);
        assert_eq!(reader.skipped_lines(), 1);
    }

    #[test]
    fn test_char_offsets_align_with_text() {
        let mut reader = ConlluReader::new(Cursor::new(SAMPLE));
        let sentence = reader.next().unwrap().unwrap();
        let chars: Vec<char> = sentence.text.chars().collect();
        for token in &sentence.tokens {
            let slice: String = chars[token.start as usize..token.end as usize]
                .iter()
                .collect();
            assert_eq!(slice, token.word);
        }
    }

    #[test]
    fn test_missing_text_comment_reconstructs() {
        let block = "1\thello\thello\tINTJ\t_\t_\t0\troot\t_\t_\n2\tworld\tworld\tNOUN\t_\t_\t1\tvocative\t_\t_\n";
        let mut reader = ConlluReader::new(Cursor::new(block));
        let sentence = reader.next().unwrap().unwrap();
        assert_eq!(sentence.text, "hello world");
    }
}
