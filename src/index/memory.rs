//! In-memory index backend.
//!
//! Holds documents in memory and evaluates the native query subset this
//! crate emits (field-qualified terms, quoted phrases, inclusive ranges,
//! `AND`/`OR`/`NOT`, parenthesized grouping, `*:*`). Every stored value is
//! also indexed, both as a whole value and as its whitespace tokens. The
//! term dictionary for a field enumerates whole stored values.
//!
//! This backend exists for tests and small embedded uses; a production
//! engine lives behind the same traits.

use std::sync::Arc;

use ahash::AHashSet;
use parking_lot::RwLock;

use crate::error::{Result, XystonError};
use crate::index::{
    Hits, IndexReader, QueryFilter, SearchBackend, Searcher, StoredDocument, TermIterator,
};
use crate::query::{NativeSort, SortCriterion};

/// A mutable in-memory index. Readers are immutable snapshots of it.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    state: Arc<RwLock<IndexState>>,
}

#[derive(Debug, Default)]
struct IndexState {
    docs: Vec<StoredDocument>,
    version: u64,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        MemoryIndex::default()
    }

    /// Add a document, invalidating existing reader snapshots.
    pub fn add_document(&self, doc: StoredDocument) {
        let mut state = self.state.write();
        state.docs.push(doc);
        state.version += 1;
    }

    /// Open a snapshot reader over the current contents.
    pub fn reader(&self) -> Arc<dyn IndexReader> {
        let state = self.state.read();
        Arc::new(MemoryIndexReader {
            index: Arc::clone(&self.state),
            docs: Arc::new(state.docs.clone()),
            version: state.version,
        })
    }
}

/// A snapshot reader over a [`MemoryIndex`].
#[derive(Debug)]
pub struct MemoryIndexReader {
    index: Arc<RwLock<IndexState>>,
    docs: Arc<Vec<StoredDocument>>,
    version: u64,
}

impl MemoryIndexReader {
    fn snapshot_docs(&self) -> &[StoredDocument] {
        &self.docs
    }
}

impl IndexReader for MemoryIndexReader {
    fn doc_count(&self) -> u64 {
        self.docs.len() as u64
    }

    fn doc_freq(&self, field: &str, term: &str) -> Result<u64> {
        Ok(self
            .docs
            .iter()
            .filter(|doc| doc.values(field).iter().any(|v| v == term))
            .count() as u64)
    }

    fn terms(&self, field: &str, start: &str) -> Result<Box<dyn TermIterator>> {
        let mut unique = AHashSet::new();
        for doc in self.snapshot_docs() {
            for value in doc.values(field) {
                unique.insert(value.clone());
            }
        }
        let mut terms: Vec<String> = unique.into_iter().collect();
        terms.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
        let start_lower = start.to_lowercase();
        terms.retain(|t| t.to_lowercase() >= start_lower);
        Ok(Box::new(MemoryTermIterator {
            terms: terms.into_iter(),
        }))
    }

    fn is_current(&self) -> Result<bool> {
        Ok(self.index.read().version == self.version)
    }

    fn reopen(&self) -> Result<Arc<dyn IndexReader>> {
        let state = self.index.read();
        Ok(Arc::new(MemoryIndexReader {
            index: Arc::clone(&self.index),
            docs: Arc::new(state.docs.clone()),
            version: state.version,
        }))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct MemoryTermIterator {
    terms: std::vec::IntoIter<String>,
}

impl TermIterator for MemoryTermIterator {
    fn next_term(&mut self) -> Option<String> {
        self.terms.next()
    }
}

/// Backend composing a searcher over memory readers.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl SearchBackend for MemoryBackend {
    fn searcher(&self, readers: &[Arc<dyn IndexReader>]) -> Result<Arc<dyn Searcher>> {
        let mut docs = Vec::new();
        for reader in readers {
            let memory_reader = reader
                .as_any()
                .downcast_ref::<MemoryIndexReader>()
                .ok_or_else(|| {
                    XystonError::index("MemoryBackend requires MemoryIndexReader readers")
                })?;
            docs.extend(memory_reader.snapshot_docs().iter().cloned());
        }
        Ok(Arc::new(MemorySearcher { docs }))
    }
}

/// A searcher over a fixed set of documents.
#[derive(Debug)]
pub struct MemorySearcher {
    docs: Vec<StoredDocument>,
}

impl Searcher for MemorySearcher {
    fn search(&self, query: &str, sort: &NativeSort) -> Result<Box<dyn Hits>> {
        let parsed = parse_native_query(query)?;
        let mut matched: Vec<StoredDocument> = self
            .docs
            .iter()
            .filter(|doc| parsed.matches(doc))
            .cloned()
            .collect();
        if let NativeSort::ByFields(criteria) = sort {
            sort_docs(&mut matched, criteria);
        }
        Ok(Box::new(MemoryHits { docs: matched }))
    }

    fn filter(&self, query: &str) -> Result<Box<dyn QueryFilter>> {
        let parsed = parse_native_query(query)?;
        let base: Vec<StoredDocument> = self
            .docs
            .iter()
            .filter(|doc| parsed.matches(doc))
            .cloned()
            .collect();
        Ok(Box::new(MemoryFilter { base }))
    }
}

struct MemoryFilter {
    base: Vec<StoredDocument>,
}

impl QueryFilter for MemoryFilter {
    fn count_term(&self, field: &str, value: &str) -> Result<u64> {
        Ok(self
            .base
            .iter()
            .filter(|doc| doc.values(field).iter().any(|v| v == value))
            .count() as u64)
    }
}

/// Hits over cloned stored documents.
pub struct MemoryHits {
    docs: Vec<StoredDocument>,
}

impl Hits for MemoryHits {
    fn len(&self) -> u64 {
        self.docs.len() as u64
    }

    fn doc(&self, index: u64) -> Result<StoredDocument> {
        self.docs
            .get(index as usize)
            .cloned()
            .ok_or_else(|| XystonError::index(format!("hit index {index} out of range")))
    }
}

fn sort_docs(docs: &mut [StoredDocument], criteria: &[SortCriterion]) {
    docs.sort_by(|a, b| {
        for criterion in criteria {
            // Missing values sort low, matching the engine convention the
            // presence-field workaround depends on.
            let av = a.first_value(&criterion.field);
            let bv = b.first_value(&criterion.field);
            let ordering = av.cmp(&bv);
            let ordering = if criterion.reverse {
                ordering.reverse()
            } else {
                ordering
            };
            if !ordering.is_eq() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

// ---------------------------------------------------------------------------
// Native query subset evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum NativeNode {
    And(Box<NativeNode>, Box<NativeNode>),
    Or(Box<NativeNode>, Box<NativeNode>),
    Not(Box<NativeNode>, Box<NativeNode>),
    MatchAll,
    /// `field:term` — whole-value or whitespace-token match, case-insensitive.
    Term { field: String, term: String },
    /// `field:"phrase"` — whole-value match, case-insensitive.
    Phrase { field: String, phrase: String },
    /// `field:[low TO high]` — inclusive lexicographic range on whole values.
    Range { field: String, low: String, high: String },
    /// A term with no field qualifier; matches nothing.
    Unqualified(String),
    /// `()` — an emptied-out group; matches nothing.
    Empty,
}

impl NativeNode {
    fn matches(&self, doc: &StoredDocument) -> bool {
        match self {
            NativeNode::And(l, r) => l.matches(doc) && r.matches(doc),
            NativeNode::Or(l, r) => l.matches(doc) || r.matches(doc),
            NativeNode::Not(l, r) => l.matches(doc) && !r.matches(doc),
            NativeNode::MatchAll => true,
            NativeNode::Term { field, term } => {
                if term.is_empty() {
                    return false;
                }
                let term = term.to_lowercase();
                doc.values(field).iter().any(|value| {
                    value.to_lowercase() == term
                        || value
                            .split_whitespace()
                            .any(|token| token.to_lowercase() == term)
                })
            }
            NativeNode::Phrase { field, phrase } => {
                if phrase.is_empty() {
                    return false;
                }
                let phrase = phrase.to_lowercase();
                doc.values(field)
                    .iter()
                    .any(|value| value.to_lowercase() == phrase)
            }
            NativeNode::Range { field, low, high } => doc
                .values(field)
                .iter()
                .any(|value| value.as_str() >= low.as_str() && value.as_str() <= high.as_str()),
            NativeNode::Unqualified(_) | NativeNode::Empty => false,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Atom(String),
}

fn tokenize(query: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            _ => {
                let mut atom = String::new();
                while let Some(&c) = chars.peek() {
                    match c {
                        c if c.is_whitespace() => break,
                        '(' | ')' => break,
                        '\\' => {
                            chars.next();
                            atom.push('\\');
                            if let Some(escaped) = chars.next() {
                                atom.push(escaped);
                            }
                        }
                        '"' => {
                            atom.push(chars.next().unwrap());
                            while let Some(q) = chars.next() {
                                atom.push(q);
                                if q == '\\' {
                                    if let Some(escaped) = chars.next() {
                                        atom.push(escaped);
                                    }
                                } else if q == '"' {
                                    break;
                                }
                            }
                        }
                        '[' => {
                            // Ranges contain spaces; consume through `]`.
                            while let Some(r) = chars.next() {
                                atom.push(r);
                                if r == ']' {
                                    break;
                                }
                            }
                        }
                        _ => atom.push(chars.next().unwrap()),
                    }
                }
                tokens.push(match atom.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Atom(atom),
                });
            }
        }
    }
    Ok(tokens)
}

fn parse_native_query(query: &str) -> Result<NativeNode> {
    let tokens = tokenize(query)?;
    let mut pos = 0;
    let node = parse_expression(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(XystonError::query(format!(
            "trailing tokens in native query: \"{query}\""
        )));
    }
    Ok(node)
}

fn parse_expression(tokens: &[Token], pos: &mut usize) -> Result<NativeNode> {
    let mut left = parse_operand(tokens, pos)?;
    loop {
        match tokens.get(*pos) {
            Some(Token::And) => {
                *pos += 1;
                let right = parse_operand(tokens, pos)?;
                left = NativeNode::And(Box::new(left), Box::new(right));
            }
            Some(Token::Or) => {
                *pos += 1;
                let right = parse_operand(tokens, pos)?;
                left = NativeNode::Or(Box::new(left), Box::new(right));
            }
            Some(Token::Not) => {
                *pos += 1;
                let right = parse_operand(tokens, pos)?;
                left = NativeNode::Not(Box::new(left), Box::new(right));
            }
            _ => return Ok(left),
        }
    }
}

fn parse_operand(tokens: &[Token], pos: &mut usize) -> Result<NativeNode> {
    match tokens.get(*pos) {
        Some(Token::LParen) => {
            *pos += 1;
            if tokens.get(*pos) == Some(&Token::RParen) {
                *pos += 1;
                return Ok(NativeNode::Empty);
            }
            let inner = parse_expression(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    Ok(inner)
                }
                _ => Err(XystonError::query("unbalanced parentheses in native query")),
            }
        }
        Some(Token::Atom(atom)) => {
            *pos += 1;
            parse_atom(atom)
        }
        other => Err(XystonError::query(format!(
            "unexpected token in native query: {other:?}"
        ))),
    }
}

fn parse_atom(atom: &str) -> Result<NativeNode> {
    if atom == "*:*" {
        return Ok(NativeNode::MatchAll);
    }
    // Find the unescaped field separator.
    let mut field = String::new();
    let mut rest = None;
    let mut chars = atom.char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    field.push(escaped);
                }
            }
            ':' => {
                rest = Some(&atom[i + 1..]);
                break;
            }
            '"' | '[' => break, // no separator before the value started
            _ => field.push(ch),
        }
    }
    let Some(value) = rest else {
        return Ok(NativeNode::Unqualified(unescape(atom)));
    };

    if let Some(range) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let parts: Vec<&str> = range.splitn(2, " TO ").collect();
        if parts.len() != 2 {
            return Err(XystonError::query(format!(
                "malformed range in native query: \"{atom}\""
            )));
        }
        return Ok(NativeNode::Range {
            field,
            low: unquote(parts[0]),
            high: unquote(parts[1]),
        });
    }
    if value.starts_with('"') {
        return Ok(NativeNode::Phrase {
            field,
            phrase: unquote(value),
        });
    }
    Ok(NativeNode::Term {
        field,
        term: unescape(value),
    })
}

fn unquote(value: &str) -> String {
    let trimmed = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    unescape(trimmed)
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    out
}
