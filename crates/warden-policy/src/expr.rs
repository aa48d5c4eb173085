//! Rule expression grammar: parsing into a compiled AST.
//!
//! # Purpose
//! Turns a policy rule string such as `role:admin or rule:owner` into a
//! [`RuleExpr`] tree evaluated by [`crate::Ruleset`].
//!
//! # Grammar
//! - `@` always allows; `!` always denies; the empty expression allows.
//! - `role:NAME` checks role membership.
//! - `rule:NAME` references another rule by name.
//! - `ATTR:%(TARGET_ATTR)s` compares a subject attribute against a target
//!   attribute; `is_admin` and `is_admin_project` on the left are rewritten
//!   to the corresponding subject flags.
//! - `ATTR:literal` compares a subject attribute against a constant.
//! - `and`, `or`, `not`, and parentheses; `or` binds loosest, `not` tightest.
//!   A leading `!` on an atom negates it.
use crate::errors::{PolicyError, PolicyResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleExpr {
    True,
    False,
    Role(String),
    RuleRef(String),
    IsAdmin,
    IsAdminProject,
    AttrMatch {
        subject_attr: String,
        target_attr: String,
    },
    AttrLiteral {
        subject_attr: String,
        literal: String,
    },
    And(Box<RuleExpr>, Box<RuleExpr>),
    Or(Box<RuleExpr>, Box<RuleExpr>),
    Not(Box<RuleExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    And,
    Or,
    Not,
    Atom(&'a str),
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (idx, ch) in input.char_indices() {
        if ch == '(' || ch == ')' || ch.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(word_token(&input[s..idx]));
            }
            if ch == '(' {
                tokens.push(Token::Open);
            } else if ch == ')' {
                tokens.push(Token::Close);
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        tokens.push(word_token(&input[s..]));
    }
    tokens
}

fn word_token(word: &str) -> Token<'_> {
    match word {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => Token::Atom(word),
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: impl Into<String>) -> PolicyError {
        PolicyError::InvalidExpression {
            expression: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn parse_or(&mut self) -> PolicyResult<RuleExpr> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let right = self.parse_and()?;
            left = RuleExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PolicyResult<RuleExpr> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let right = self.parse_unary()?;
            left = RuleExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PolicyResult<RuleExpr> {
        match self.next() {
            Some(Token::Not) => Ok(RuleExpr::Not(Box::new(self.parse_unary()?))),
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(self.error("unbalanced parenthesis")),
                }
            }
            Some(Token::Atom(word)) => self.parse_atom(word),
            Some(other) => Err(self.error(format!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_atom(&mut self, word: &str) -> PolicyResult<RuleExpr> {
        match word {
            "@" => return Ok(RuleExpr::True),
            "!" => return Ok(RuleExpr::False),
            _ => {}
        }
        // A leading bang negates the atom: `!role:admin`.
        if let Some(rest) = word.strip_prefix('!') {
            return Ok(RuleExpr::Not(Box::new(self.parse_atom(rest)?)));
        }
        let Some((left, right)) = word.split_once(':') else {
            return Err(self.error(format!("atom {word:?} is missing a ':' separator")));
        };
        if left.is_empty() {
            return Err(self.error(format!("atom {word:?} has an empty attribute name")));
        }
        match left {
            "role" => {
                if right.is_empty() {
                    return Err(self.error("empty role name"));
                }
                Ok(RuleExpr::Role(right.to_string()))
            }
            "rule" => {
                if right.is_empty() {
                    return Err(self.error("empty rule reference"));
                }
                Ok(RuleExpr::RuleRef(right.to_string()))
            }
            "is_admin" => Ok(RuleExpr::IsAdmin),
            "is_admin_project" => Ok(RuleExpr::IsAdminProject),
            _ => {
                if let Some(target_attr) = interpolation_target(right) {
                    Ok(RuleExpr::AttrMatch {
                        subject_attr: left.to_string(),
                        target_attr: target_attr.to_string(),
                    })
                } else {
                    Ok(RuleExpr::AttrLiteral {
                        subject_attr: left.to_string(),
                        literal: right.to_string(),
                    })
                }
            }
        }
    }
}

// A right-hand side of the shape %(name)s names a target attribute.
fn interpolation_target(value: &str) -> Option<&str> {
    value.strip_prefix("%(")?.strip_suffix(")s")
}

/// Parse one rule expression string into its AST.
pub fn parse(expression: &str) -> PolicyResult<RuleExpr> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Ok(RuleExpr::True);
    }
    let mut parser = Parser {
        source: trimmed,
        tokens: tokenize(trimmed),
        pos: 0,
    };
    let expr = parser.parse_or()?;
    if parser.peek().is_some() {
        return Err(parser.error("trailing tokens after expression"));
    }
    Ok(expr)
}
