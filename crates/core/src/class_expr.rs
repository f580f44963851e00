//! Class expressions.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr   := term (('|' | '||') term)*
//! term   := factor (('.' | '&') factor)*
//! factor := '!' factor | '(' expr ')' | name
//! ```
//!
//! `any` is always defined. Names may be namespace-qualified (`ns:name`).

use std::fmt;

use tracing::warn;

use crate::context::EvalContext;
use crate::reference::{parse_class_ref, DEFAULT_NAMESPACE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassExpr {
    Any,
    Class { ns: Option<String>, name: String },
    Not(Box<ClassExpr>),
    And(Vec<ClassExpr>),
    Or(Vec<ClassExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassExprError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for ClassExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class expression at {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ClassExprError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Or,
    And,
    Not,
    LParen,
    RParen,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn lex(src: &str) -> Result<Vec<(usize, Token)>, ClassExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let token = match c {
            '|' => {
                pos += 1;
                if chars.get(pos) == Some(&'|') {
                    pos += 1;
                }
                Token::Or
            }
            '.' | '&' => {
                pos += 1;
                Token::And
            }
            '!' => {
                pos += 1;
                Token::Not
            }
            '(' => {
                pos += 1;
                Token::LParen
            }
            ')' => {
                pos += 1;
                Token::RParen
            }
            c if is_name_char(c) => {
                while pos < chars.len() && is_name_char(chars[pos]) {
                    pos += 1;
                }
                Token::Name(chars[start..pos].iter().collect())
            }
            other => {
                return Err(ClassExprError {
                    position: start,
                    message: format!("unexpected character '{}'", other),
                })
            }
        };
        tokens.push((start, token));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(p, _)| *p)
    }

    fn error(&self, message: &str) -> ClassExprError {
        ClassExprError {
            position: self.position(),
            message: message.to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<ClassExpr, ClassExprError> {
        let mut terms = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            ClassExpr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<ClassExpr, ClassExprError> {
        let mut factors = vec![self.parse_not()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            factors.push(self.parse_not()?);
        }
        Ok(if factors.len() == 1 {
            factors.remove(0)
        } else {
            ClassExpr::And(factors)
        })
    }

    fn parse_not(&mut self) -> Result<ClassExpr, ClassExprError> {
        match self.peek().cloned() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(ClassExpr::Not(Box::new(self.parse_not()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(Token::Name(text)) => {
                self.pos += 1;
                if text == "any" {
                    return Ok(ClassExpr::Any);
                }
                let (ns, name) = parse_class_ref(&text);
                if name.is_empty() || ns.is_some_and(str::is_empty) {
                    return Err(self.error("malformed class name"));
                }
                Ok(ClassExpr::Class {
                    ns: ns.map(str::to_owned),
                    name: name.to_string(),
                })
            }
            Some(_) => Err(self.error("unexpected operator")),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

impl ClassExpr {
    pub fn parse(src: &str) -> Result<ClassExpr, ClassExprError> {
        let tokens = lex(src)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: src.len(),
        };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate with `defined(ns, name)` answering for single classes.
    pub fn eval<F>(&self, defined: &F) -> bool
    where
        F: Fn(Option<&str>, &str) -> bool,
    {
        match self {
            ClassExpr::Any => true,
            ClassExpr::Class { ns, name } => defined(ns.as_deref(), name),
            ClassExpr::Not(inner) => !inner.eval(defined),
            ClassExpr::And(items) => items.iter().all(|e| e.eval(defined)),
            ClassExpr::Or(items) => items.iter().any(|e| e.eval(defined)),
        }
    }
}

/// Evaluate `expression` against `ctx`.
///
/// Unqualified names are looked up in `ns` and then in the default
/// namespace, where environment classes live. A malformed expression is
/// logged and counts as not defined.
pub fn is_defined(ctx: &EvalContext, expression: &str, ns: &str) -> bool {
    let expr = match ClassExpr::parse(expression) {
        Ok(expr) => expr,
        Err(e) => {
            warn!(expression, error = %e, "malformed class expression");
            return false;
        }
    };
    expr.eval(&|explicit_ns: Option<&str>, name: &str| match explicit_ns {
        Some(explicit) => ctx.class_is_defined(explicit, name),
        None => {
            ctx.class_is_defined(ns, name)
                || (ns != DEFAULT_NAMESPACE && ctx.class_is_defined(DEFAULT_NAMESPACE, name))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextScope;

    fn ctx_with(soft: &[&str]) -> EvalContext {
        let mut ctx = EvalContext::new();
        ctx.class_put_hard("linux").unwrap();
        for name in soft {
            ctx.class_activate("default", name, true, ContextScope::Namespace)
                .unwrap();
        }
        ctx
    }

    #[test]
    fn parse_precedence() {
        let e = ClassExpr::parse("a|b.!c").unwrap();
        assert_eq!(
            e,
            ClassExpr::Or(vec![
                ClassExpr::Class {
                    ns: None,
                    name: "a".into()
                },
                ClassExpr::And(vec![
                    ClassExpr::Class {
                        ns: None,
                        name: "b".into()
                    },
                    ClassExpr::Not(Box::new(ClassExpr::Class {
                        ns: None,
                        name: "c".into()
                    })),
                ]),
            ])
        );
    }

    #[test]
    fn evaluates_against_context() {
        let ctx = ctx_with(&["web"]);
        assert!(ctx.is_defined_class("linux.web", "default"));
        assert!(ctx.is_defined_class("linux&web", "default"));
        assert!(!ctx.is_defined_class("linux.!web", "default"));
        assert!(ctx.is_defined_class("db||web", "default"));
        assert!(ctx.is_defined_class("!(db|windows)", "default"));
        assert!(ctx.is_defined_class("any", "default"));
        assert!(!ctx.is_defined_class("!any", "default"));
    }

    #[test]
    fn namespaces() {
        let mut ctx = ctx_with(&[]);
        ctx.class_activate("ops", "ready", true, ContextScope::Namespace)
            .unwrap();
        assert!(ctx.is_defined_class("ops:ready", "default"));
        assert!(!ctx.is_defined_class("ready", "default"));
        assert!(ctx.is_defined_class("ready", "ops"));
        // environment classes are visible from any namespace
        assert!(ctx.is_defined_class("linux", "ops"));
    }

    #[test]
    fn malformed_expression_is_false() {
        let ctx = ctx_with(&["web"]);
        assert!(!ctx.is_defined_class("web.", "default"));
        assert!(!ctx.is_defined_class("(web", "default"));
        assert!(!ctx.is_defined_class("web$", "default"));
        assert!(ClassExpr::parse("").is_err());
    }
}
