//! # Xyston
//!
//! A CQL query translation and faceted search core for Lucene-style
//! indexes.
//!
//! ## Features
//!
//! - CQL parsing and translation to native query strings
//! - Field alias resolution with derived index-name variants
//! - SRU sort-key translation, including missing-value placement
//! - Faceted search with size-adaptive computation strategies
//! - Throttled index refresh and TTL result-set registration
//! - Term-dictionary scan for alphabetical browsing
//! - Structured constraint compilation to CQL

pub mod cql;
pub mod error;
pub mod facets;
pub mod fields;
pub mod index;
pub mod query;
pub mod session;
pub mod structured;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
