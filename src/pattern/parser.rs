//! Recursive-descent parser for the pattern language.
//!
//! The parser is total for well-formed input and never consults the index.
//! Errors carry the byte offset of the offending character.

use crate::error::{Error, Result};
use crate::pattern::{Agreement, CmpOp, Pattern, PatternElement, PatternSeq, Pred, Value};
use crate::types::Field;

/// Parse a pattern expression into its AST.
pub fn parse_pattern(src: &str) -> Result<Pattern> {
    let mut parser = Parser::new(src);
    let pattern = parser.pattern()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    if pattern.alternatives.is_empty() {
        return Err(parser.error("empty pattern"));
    }
    Ok(pattern)
}

struct Parser<'a> {
    chars: Vec<(usize, char)>,
    src_len: usize,
    at: usize,
    _src: &'a str,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().collect(),
            src_len: src.len(),
            at: 0,
            _src: src,
        }
    }

    fn byte_pos(&self) -> usize {
        self.chars
            .get(self.at)
            .map(|&(b, _)| b)
            .unwrap_or(self.src_len)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::PatternSyntax {
            position: self.byte_pos(),
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.at >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.at).map(|&(_, c)| c)
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.at + 1).map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.at += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.at += 1;
        }
    }

    // -------------------------------------------------------------------------
    // grammar
    // -------------------------------------------------------------------------

    fn pattern(&mut self) -> Result<Pattern> {
        let mut alternatives = vec![self.sequence()?];
        loop {
            self.skip_ws();
            if self.eat('|') {
                alternatives.push(self.sequence()?);
            } else {
                break;
            }
        }
        Ok(Pattern { alternatives })
    }

    fn sequence(&mut self) -> Result<PatternSeq> {
        let mut elements = Vec::new();
        let mut agreements = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some('|') => break,
                Some(':') if self.peek2() == Some(':') => {
                    self.at += 2;
                    agreements = self.agreements()?;
                    break;
                }
                _ => {
                    let mut element = self.element()?;
                    if elements.is_empty() {
                        // A leading distance is meaningless; default it.
                        element.dist = (1, 1);
                    }
                    elements.push(element);
                }
            }
        }
        if elements.is_empty() {
            return Err(self.error("expected at least one [..] element"));
        }
        Ok(PatternSeq {
            elements,
            agreements,
        })
    }

    fn element(&mut self) -> Result<PatternElement> {
        self.skip_ws();
        let dist = if self.peek() == Some('<') {
            Some(self.distance()?)
        } else {
            None
        };

        self.skip_ws();
        let label = self.opt_label()?;

        self.skip_ws();
        self.expect('[')?;
        let pred = self.or_expr()?;
        self.skip_ws();
        self.expect(']')?;

        let repeat = if self.peek() == Some('{') {
            self.repetition()?
        } else {
            (1, 1)
        };

        let mut element = PatternElement::new(pred);
        element.label = label;
        element.repeat = repeat;
        if let Some(dist) = dist {
            element.dist = dist;
        }
        Ok(element)
    }

    fn distance(&mut self) -> Result<(i32, i32)> {
        self.expect('<')?;
        self.skip_ws();
        let dmin = self.signed_int()?;
        self.skip_ws();
        self.expect(',')?;
        self.skip_ws();
        let dmax = self.signed_int()?;
        self.skip_ws();
        self.expect('>')?;
        if dmin > dmax {
            return Err(self.error(format!("empty distance range <{dmin},{dmax}>")));
        }
        Ok((dmin, dmax))
    }

    fn repetition(&mut self) -> Result<(u32, u32)> {
        self.expect('{')?;
        self.skip_ws();
        let min = self.unsigned_int()?;
        self.skip_ws();
        self.expect(',')?;
        self.skip_ws();
        let max = self.unsigned_int()?;
        self.skip_ws();
        self.expect('}')?;
        if min > max || max == 0 {
            return Err(self.error(format!("empty repetition range {{{min},{max}}}")));
        }
        Ok((min, max))
    }

    /// `3:` before an element. Backtracks when the digits turn out not to be
    /// a label (e.g. a bare number where an element was expected).
    fn opt_label(&mut self) -> Result<Option<u32>> {
        let save = self.at;
        if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return Ok(None);
        }
        let label = self.unsigned_int()?;
        self.skip_ws();
        if self.eat(':') {
            if label == 0 {
                return Err(self.error("capture labels start at 1"));
            }
            Ok(Some(label))
        } else {
            self.at = save;
            Ok(None)
        }
    }

    fn or_expr(&mut self) -> Result<Pred> {
        let mut items = vec![self.and_expr()?];
        loop {
            self.skip_ws();
            if self.peek() == Some('|') {
                self.at += 1;
                items.push(self.and_expr()?);
            } else {
                break;
            }
        }
        Ok(if items.len() == 1 {
            items.pop().unwrap_or(Pred::And(Vec::new()))
        } else {
            Pred::Or(items)
        })
    }

    fn and_expr(&mut self) -> Result<Pred> {
        let mut items = vec![self.unary()?];
        loop {
            self.skip_ws();
            if self.peek() == Some('&') {
                self.at += 1;
                items.push(self.unary()?);
            } else {
                break;
            }
        }
        Ok(if items.len() == 1 {
            items.pop().unwrap_or(Pred::And(Vec::new()))
        } else {
            Pred::And(items)
        })
    }

    fn unary(&mut self) -> Result<Pred> {
        self.skip_ws();
        if self.eat('!') {
            // Reject `!=` showing up where a predicate belongs.
            if self.peek() == Some('=') {
                return Err(self.error("unexpected '!=' without a field"));
            }
            return Ok(Pred::Not(Box::new(self.unary()?)));
        }
        if self.eat('(') {
            let inner = self.or_expr()?;
            self.skip_ws();
            self.expect(')')?;
            return Ok(inner);
        }
        self.primitive()
    }

    fn primitive(&mut self) -> Result<Pred> {
        self.skip_ws();
        let field_pos = self.byte_pos();
        let name = self.identifier()?;
        let field = Field::parse(&name).ok_or_else(|| Error::PatternSyntax {
            position: field_pos,
            message: format!("unknown field {name:?}"),
        })?;

        self.skip_ws();
        let op = self.cmp_op()?;

        let mut values = vec![self.value()?];
        // Value alternation: `lemma=be|seem|prove`. A '|' continues the value
        // list only when what follows is not itself a `field op …` predicate.
        loop {
            let save = self.at;
            self.skip_ws();
            if !self.eat('|') {
                self.at = save;
                break;
            }
            if self.next_is_predicate() {
                self.at = save;
                break;
            }
            self.skip_ws();
            values.push(self.value()?);
        }

        Ok(Pred::Cmp { field, op, values })
    }

    /// Lookahead after a '|': does a `field =`/`field !=` head follow?
    fn next_is_predicate(&mut self) -> bool {
        let save = self.at;
        self.skip_ws();
        let is_pred = match self.identifier() {
            Ok(name) if Field::parse(&name).is_some() => {
                self.skip_ws();
                matches!(self.peek(), Some('=')) || (self.peek() == Some('!') && self.peek2() == Some('='))
            }
            _ => false,
        };
        self.at = save;
        is_pred
    }

    fn cmp_op(&mut self) -> Result<CmpOp> {
        if self.eat('!') {
            self.expect('=')?;
            Ok(CmpOp::Ne)
        } else if self.eat('=') {
            Ok(CmpOp::Eq)
        } else {
            Err(self.error("expected '=' or '!='"))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        let start = self.at;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.at += 1;
        }
        if self.at == start {
            return Err(self.error("expected identifier"));
        }
        Ok(self.chars[start..self.at].iter().map(|&(_, c)| c).collect())
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        if self.eat('"') {
            let start = self.at;
            while let Some(c) = self.peek() {
                if c == '"' {
                    break;
                }
                self.at += 1;
            }
            if self.peek() != Some('"') {
                return Err(self.error("unterminated quoted value"));
            }
            let raw: String = self.chars[start..self.at].iter().map(|&(_, c)| c).collect();
            self.at += 1;
            return Ok(Value::classify(&raw.to_lowercase()));
        }

        let start = self.at;
        while let Some(c) = self.peek() {
            let bare = c.is_alphanumeric()
                || matches!(c, '*' | '?' | '%' | '.' | '_' | '-' | '$' | '+' | '\'');
            if !bare {
                break;
            }
            self.at += 1;
        }
        if self.at == start {
            return Err(self.error("expected value"));
        }
        let raw: String = self.chars[start..self.at].iter().map(|&(_, c)| c).collect();
        Ok(Value::classify(&raw.to_lowercase()))
    }

    fn agreements(&mut self) -> Result<Vec<Agreement>> {
        let mut rules = vec![self.agreement()?];
        loop {
            self.skip_ws();
            if self.eat('&') {
                rules.push(self.agreement()?);
            } else {
                break;
            }
        }
        Ok(rules)
    }

    fn agreement(&mut self) -> Result<Agreement> {
        self.skip_ws();
        let label_a = self.unsigned_int()?;
        self.expect('.')?;
        let field_a = self.agreement_field()?;
        self.skip_ws();
        let op = self.cmp_op()?;
        self.skip_ws();
        let label_b = self.unsigned_int()?;
        self.expect('.')?;
        let field_b = self.agreement_field()?;
        Ok(Agreement {
            label_a,
            field_a,
            op,
            label_b,
            field_b,
        })
    }

    fn agreement_field(&mut self) -> Result<Field> {
        let pos = self.byte_pos();
        let name = self.identifier()?;
        Field::parse(&name).ok_or_else(|| Error::PatternSyntax {
            position: pos,
            message: format!("unknown field {name:?} in agreement"),
        })
    }

    fn unsigned_int(&mut self) -> Result<u32> {
        let start = self.at;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.at += 1;
        }
        if self.at == start {
            return Err(self.error("expected number"));
        }
        let digits: String = self.chars[start..self.at].iter().map(|&(_, c)| c).collect();
        digits
            .parse()
            .map_err(|_| self.error(format!("number {digits:?} out of range")))
    }

    fn signed_int(&mut self) -> Result<i32> {
        let negative = self.eat('-');
        let magnitude = self.unsigned_int()? as i64;
        let value = if negative { -magnitude } else { magnitude };
        i32::try_from(value).map_err(|_| self.error("distance out of range"))
    }
}
