//! Collaborator interfaces to the underlying full-text engine.
//!
//! This core emits native query strings and consumes result sets and term
//! enumerations; the index itself (persistence, scoring, segment handling)
//! lives behind the traits in this module. An in-memory implementation used
//! by the tests lives in [`memory`].

pub mod memory;
pub mod registry;

use std::sync::Arc;

use ahash::AHashMap;

use crate::error::Result;
use crate::query::NativeSort;

/// A reader over one underlying index.
///
/// Readers are immutable snapshots: when the index changes on disk,
/// [`IndexReader::is_current`] turns false and [`IndexReader::reopen`]
/// produces a fresh snapshot. The old reader stays usable until dropped.
pub trait IndexReader: Send + Sync {
    /// Number of documents visible to this reader.
    fn doc_count(&self) -> u64;

    /// Number of documents containing `term` in `field`.
    fn doc_freq(&self, field: &str, term: &str) -> Result<u64>;

    /// Enumerate the terms of `field` in order, starting at the first term
    /// that sorts at or after `start` (case-insensitively).
    fn terms(&self, field: &str, start: &str) -> Result<Box<dyn TermIterator>>;

    /// Whether this snapshot still reflects the index on disk.
    fn is_current(&self) -> Result<bool>;

    /// Open a fresh snapshot of the same index.
    fn reopen(&self) -> Result<Arc<dyn IndexReader>>;

    /// Get this reader as Any for downcasting by backends.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Ordered enumeration of one field's terms.
pub trait TermIterator {
    /// The next term, or `None` at the end of the field's dictionary.
    fn next_term(&mut self) -> Option<String>;
}

/// A search surface composed over one or more readers.
pub trait Searcher: Send + Sync {
    /// Execute a native query string, returning ordered hits.
    fn search(&self, query: &str, sort: &NativeSort) -> Result<Box<dyn Hits>>;

    /// Build a reusable filter for a base query, against which per-term
    /// counts can be taken without re-parsing the base query.
    fn filter(&self, query: &str) -> Result<Box<dyn QueryFilter>>;
}

/// A cached base-query filter supporting per-term restriction counts.
pub trait QueryFilter {
    /// Count the documents matching the base query AND `field:value`
    /// (untokenized match on `field`).
    fn count_term(&self, field: &str, value: &str) -> Result<u64>;
}

/// An executed query's ordered hits.
pub trait Hits {
    /// Total number of matching documents.
    fn len(&self) -> u64;

    /// Whether the query matched nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the stored document for the hit at `index`.
    fn doc(&self, index: u64) -> Result<StoredDocument>;
}

/// A retrieved document's stored fields (multi-valued).
#[derive(Debug, Clone, Default)]
pub struct StoredDocument {
    fields: AHashMap<String, Vec<String>>,
}

impl StoredDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        StoredDocument::default()
    }

    /// Add a value to a field.
    pub fn add_value<F, V>(mut self, field: F, value: V) -> Self
    where
        F: Into<String>,
        V: Into<String>,
    {
        self.fields.entry(field.into()).or_default().push(value.into());
        self
    }

    /// All values stored for `field`, in insertion order.
    pub fn values(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first value stored for `field`.
    pub fn first_value(&self, field: &str) -> Option<&str> {
        self.values(field).first().map(String::as_str)
    }

    /// The stored field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Composes one searcher over the session's current readers.
pub trait SearchBackend: Send + Sync {
    /// Build a searcher spanning all of `readers`.
    fn searcher(&self, readers: &[Arc<dyn IndexReader>]) -> Result<Arc<dyn Searcher>>;
}

pub use registry::{ReaderFactory, ReaderRegistry};
