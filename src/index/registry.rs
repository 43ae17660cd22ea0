//! Compile-time registry of reader factories.
//!
//! Index backends are selected by a discriminant tag mapped to a factory
//! function, validated when the registry is built. This replaces loading a
//! configured implementation class reflectively at instantiation time.

use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{Result, XystonError};
use crate::index::IndexReader;

/// A factory producing a reader for an index rooted at the given path.
pub type ReaderFactory = fn(&Path) -> Result<Arc<dyn IndexReader>>;

/// A validated tag -> reader-factory table.
#[derive(Default)]
pub struct ReaderRegistry {
    factories: AHashMap<String, ReaderFactory>,
}

impl ReaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        ReaderRegistry::default()
    }

    /// Register a factory under a tag. Duplicate tags are a configuration
    /// error caught at startup, not at first use.
    pub fn register<S: Into<String>>(mut self, tag: S, factory: ReaderFactory) -> Result<Self> {
        let tag = tag.into();
        if self.factories.contains_key(&tag) {
            return Err(XystonError::config(format!(
                "reader backend \"{tag}\" registered twice"
            )));
        }
        self.factories.insert(tag, factory);
        Ok(self)
    }

    /// Open a reader with the factory registered under `tag`.
    pub fn open(&self, tag: &str, path: &Path) -> Result<Arc<dyn IndexReader>> {
        match self.factories.get(tag) {
            Some(factory) => factory(path),
            None => Err(XystonError::config(format!(
                "no reader backend registered for \"{tag}\""
            ))),
        }
    }

    /// The registered tags.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
