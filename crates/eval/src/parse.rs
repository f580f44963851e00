//! Parser for call-expression text: `name(arg, "quoted", inner(x), {"a", "b"})`.
//!
//! Arguments are one of:
//! - a nested call, `ident(...)`
//! - a quoted string (`"..."` or `'...'`, backslash escapes the next char)
//! - a list, `{ arg, ... }`
//! - a bare word, read up to the next top-level `,`, `)` or `}`; brackets
//!   opened inside it (as in `$(x)` or `@(list)`) must balance

use std::fmt;

use crate::types::{Expr, FnCall};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at column {}: {}", self.position + 1, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse a complete call expression.
pub fn parse_call(src: &str) -> Result<FnCall, ParseError> {
    let mut p = Parser {
        chars: src.chars().collect(),
        pos: 0,
    };
    p.skip_ws();
    let call = p.call()?;
    p.skip_ws();
    if p.pos != p.chars.len() {
        return Err(p.error("trailing input after call"));
    }
    Ok(call)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Parser {
    fn error(&self, message: &str) -> ParseError {
        ParseError {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn ident(&mut self) -> Option<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    fn call(&mut self) -> Result<FnCall, ParseError> {
        let Some(name) = self.ident() else {
            return Err(self.error("expected function name"));
        };
        self.expect('(')?;
        let args = self.args(')')?;
        Ok(FnCall { name, args })
    }

    /// Comma-separated arguments up to and including `close`.
    fn args(&mut self, close: char) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(close) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.arg()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(args);
                }
                Some(_) => return Err(self.error(&format!("expected ',' or '{}'", close))),
                None => return Err(self.error(&format!("missing '{}'", close))),
            }
        }
    }

    fn arg(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some('"' | '\'') => self.quoted().map(Expr::Scalar),
            Some('{') => {
                self.pos += 1;
                self.args('}').map(Expr::List)
            }
            Some(c) if is_ident_char(c) => {
                let start = self.pos;
                let word = self.ident().unwrap_or_default();
                let after = self.pos;
                self.skip_ws();
                if self.peek() == Some('(') {
                    self.pos = start;
                    return self.call().map(Expr::Call);
                }
                self.pos = after;
                let rest = self.bare()?;
                Ok(Expr::Scalar(format!("{}{}", word, rest)))
            }
            Some(_) => {
                let word = self.bare()?;
                if word.is_empty() {
                    return Err(self.error("expected argument"));
                }
                Ok(Expr::Scalar(word))
            }
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let quote = self.chars[self.pos];
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') if self.pos + 1 < self.chars.len() => {
                    out.push(self.chars[self.pos + 1]);
                    self.pos += 2;
                }
                Some(c) => {
                    self.pos += 1;
                    if c == quote {
                        return Ok(out);
                    }
                    out.push(c);
                }
            }
        }
    }

    fn bare(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '(' | '{' | '[' => depth += 1,
                ')' | '}' | ']' if depth > 0 => depth -= 1,
                ',' | ')' | '}' if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        if depth > 0 {
            return Err(self.error("unbalanced brackets"));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(text.trim_end().to_string())
    }
}
