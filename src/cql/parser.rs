//! A minimal CQL parser covering the subset this system emits and consumes.
//!
//! Supported syntax:
//! - Term clauses: `index relation "value"` (relation may be `=`, `exact`,
//!   `any`, `all`, `cql.within`, or any other name which parses as an
//!   unrecognized relation)
//! - Bare terms: `cat` (searched with server choice semantics)
//! - Boolean operators `and`, `or`, `not` (case-insensitive, left
//!   associative, equal precedence as in CQL)
//! - Parenthesized grouping
//! - Quoted values with `\"` escapes

use std::iter::Peekable;
use std::str::Chars;

use crate::cql::node::{BooleanOp, QueryNode, Relation};
use crate::error::{Result, XystonError};

/// The index assigned to bare terms with no explicit index.
pub const SERVER_CHOICE_INDEX: &str = "cql.serverChoice";

/// Parse a CQL query string into a query tree.
pub fn parse(query: &str) -> Result<QueryNode> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(XystonError::parse("Empty CQL query"));
    }
    let mut parser = CqlStringParser::new(trimmed);
    let node = parser.parse_expression()?;
    parser.skip_whitespace();
    if parser.chars.peek().is_some() {
        return Err(XystonError::parse(format!(
            "Unexpected trailing input in CQL query: \"{trimmed}\""
        )));
    }
    Ok(node)
}

/// Internal parser over a peekable character stream.
struct CqlStringParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> CqlStringParser<'a> {
    fn new(query: &'a str) -> Self {
        CqlStringParser {
            chars: query.chars().peekable(),
        }
    }

    /// Parse a left-associative chain of clauses joined by and/or/not.
    fn parse_expression(&mut self) -> Result<QueryNode> {
        let mut left = self.parse_clause()?;

        loop {
            match self.peek_boolean_op() {
                Some((op, word_len)) => {
                    self.consume_chars(word_len);
                    let right = self.parse_clause()?;
                    left = QueryNode::boolean(op, left, right);
                }
                None => return Ok(left),
            }
        }
    }

    fn parse_clause(&mut self) -> Result<QueryNode> {
        self.skip_whitespace();
        if self.chars.peek() == Some(&'(') {
            self.chars.next();
            let inner = self.parse_expression()?;
            self.skip_whitespace();
            if self.chars.next() != Some(')') {
                return Err(XystonError::parse("Unbalanced parentheses in CQL query"));
            }
            return Ok(inner);
        }

        // A clause starts with either a quoted bare term or a word that is
        // an index name or a bare term, disambiguated by what follows.
        if self.chars.peek() == Some(&'"') {
            let term = self.consume_quoted()?;
            return Ok(QueryNode::term(
                SERVER_CHOICE_INDEX,
                Relation::ServerChoice,
                term,
            ));
        }

        let first = self.consume_word()?;
        self.skip_whitespace();

        let relation = match self.chars.peek() {
            Some('=') => {
                self.chars.next();
                Relation::Equal
            }
            Some('"') | Some('(') | Some(')') | None => {
                // No relation follows: "first" is a bare term.
                return Ok(QueryNode::term(
                    SERVER_CHOICE_INDEX,
                    Relation::ServerChoice,
                    first,
                ));
            }
            Some(_) => {
                if self.peek_boolean_op().is_some() {
                    // "first and ..." — bare term inside a boolean chain.
                    return Ok(QueryNode::term(
                        SERVER_CHOICE_INDEX,
                        Relation::ServerChoice,
                        first,
                    ));
                }
                let relation_word = self.consume_word()?;
                Relation::from_base(&relation_word)
            }
        };

        self.skip_whitespace();
        let term = if self.chars.peek() == Some(&'"') {
            self.consume_quoted()?
        } else {
            self.consume_word()?
        };
        Ok(QueryNode::term(first, relation, term))
    }

    /// Peek for a boolean operator keyword at the current position.
    fn peek_boolean_op(&mut self) -> Option<(BooleanOp, usize)> {
        self.skip_whitespace();
        let remaining: String = self.chars.clone().take(4).collect();
        let lower = remaining.to_lowercase();
        for (keyword, op) in [
            ("and", BooleanOp::And),
            ("or", BooleanOp::Or),
            ("not", BooleanOp::Not),
        ] {
            if lower.starts_with(keyword) {
                let boundary = remaining.chars().nth(keyword.len());
                if boundary.is_none() || boundary.is_some_and(|c| c.is_whitespace() || c == '(') {
                    return Some((op, keyword.len()));
                }
            }
        }
        None
    }

    fn consume_chars(&mut self, n: usize) {
        for _ in 0..n {
            self.chars.next();
        }
    }

    /// Consume a word up to whitespace, parentheses, a quote, or `=`.
    fn consume_word(&mut self) -> Result<String> {
        self.skip_whitespace();
        let mut word = String::new();
        while let Some(ch) = self.chars.peek() {
            if ch.is_whitespace() || matches!(ch, '(' | ')' | '"' | '=') {
                break;
            }
            word.push(self.chars.next().unwrap());
        }
        if word.is_empty() {
            Err(XystonError::parse("Expected a word in CQL query"))
        } else {
            Ok(word)
        }
    }

    /// Consume a double-quoted string, honoring `\"` escapes.
    fn consume_quoted(&mut self) -> Result<String> {
        self.skip_whitespace();
        if self.chars.next() != Some('"') {
            return Err(XystonError::parse("Expected an opening quote"));
        }
        let mut value = String::new();
        while let Some(ch) = self.chars.next() {
            match ch {
                '\\' => {
                    if let Some(next) = self.chars.next() {
                        value.push(next);
                    }
                }
                '"' => return Ok(value),
                _ => value.push(ch),
            }
        }
        Err(XystonError::parse("Unterminated quoted value in CQL query"))
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }
}
