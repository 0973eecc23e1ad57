// src/parser.rs
use crate::errors::{ApplyError, Result};
use serde_json::Value;

/// Character cursor shared by the clause and filter grammars.
pub struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Parser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    pub fn position(&self) -> usize {
        self.i
    }

    pub fn error(&self, message: impl Into<String>) -> ApplyError {
        ApplyError::syntax(self.i, message)
    }

    pub fn parse_identifier(&mut self) -> Result<String> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if is_identifier_char(c) {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(self.error("identifier expected"));
        }
        Ok(self.s[start..self.i].to_string())
    }

    /// Dotted name such as `NS.Product`.
    pub fn parse_qualified_identifier(&mut self) -> Result<String> {
        let mut name = self.parse_identifier()?;
        while self.peek_char() == Some('.') {
            self.i += 1;
            name.push('.');
            name.push_str(&self.parse_identifier()?);
        }
        Ok(name)
    }

    pub fn parse_int(&mut self) -> Result<i64> {
        let start = self.i;
        if self.peek_char() == Some('-') {
            self.i += 1;
        }
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start || (self.i == start + 1 && &self.s[start..self.i] == "-") {
            return Err(ApplyError::syntax(start, "expected integer"));
        }
        self.s[start..self.i]
            .parse::<i64>()
            .map_err(|_| ApplyError::syntax(start, "bad integer"))
    }

    pub fn parse_number_literal(&mut self) -> Result<Value> {
        let start = self.i;
        if self.peek_char() == Some('-') {
            self.i += 1;
        }
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.') {
            self.i += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.i += 1;
                } else {
                    break;
                }
            }
        }
        let s = &self.s[start..self.i];
        if s.is_empty() || s == "-" {
            return Err(ApplyError::syntax(start, "number expected"));
        }
        if s.contains('.') {
            let f: f64 = s
                .parse()
                .map_err(|_| ApplyError::syntax(start, "bad float"))?;
            Ok(Value::from(f))
        } else {
            let i: i64 = s
                .parse()
                .map_err(|_| ApplyError::syntax(start, "bad int"))?;
            Ok(Value::from(i))
        }
    }

    /// Single-quoted string; a doubled quote (`''`) is an escaped quote.
    pub fn parse_quoted_string(&mut self) -> Result<String> {
        let start = self.i;
        if self.peek_char() != Some('\'') {
            return Err(self.error("expected quoted string"));
        }
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == '\'' {
                if self.peek_char() == Some('\'') {
                    self.i += 1;
                    out.push('\'');
                    continue;
                }
                return Ok(out);
            }
            out.push(c);
        }
        Err(ApplyError::syntax(start, "unterminated string"))
    }

    pub fn expect(&mut self, c: char) -> Result<()> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Consumes `word` only when it is not the prefix of a longer identifier.
    pub fn consume_keyword(&mut self, word: &str) -> bool {
        if !self.peek_str(word) {
            return false;
        }
        let next = self.s[self.i + word.len()..].chars().next();
        if next.is_some_and(is_identifier_char) {
            return false;
        }
        self.i += word.len();
        true
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

fn is_identifier_char(c: char) -> bool {
    c == '_' || c == '$' || c.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_string_unescapes_doubled_quotes() {
        let mut p = Parser::new("'it''s' rest");
        assert_eq!(p.parse_quoted_string().unwrap(), "it's");
        assert_eq!(p.position(), 7);
    }

    #[test]
    fn keyword_requires_boundary() {
        let mut p = Parser::new("andy");
        assert!(!p.consume_keyword("and"));
        let mut p = Parser::new("and$x");
        assert!(!p.consume_keyword("and"));
        let mut p = Parser::new("and x");
        assert!(p.consume_keyword("and"));
    }

    #[test]
    fn unterminated_string_reports_start() {
        let mut p = Parser::new("  'abc");
        p.skip_ws();
        assert_eq!(
            p.parse_quoted_string(),
            Err(ApplyError::syntax(2, "unterminated string"))
        );
    }
}
