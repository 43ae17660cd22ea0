//! Error types for the Xyston library.
//!
//! All errors are represented by the [`XystonError`] enum. Constructor
//! helpers exist for the common cases so call sites can stay terse.
//!
//! # Examples
//!
//! ```
//! use xyston::error::{Result, XystonError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(XystonError::query("Invalid query"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Xyston operations.
#[derive(Error, Debug)]
pub enum XystonError {
    /// I/O errors (index reads, reopen failures, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors
    #[error("Index error: {0}")]
    Index(String),

    /// Query-related errors (parsing, invalid queries, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Query translation errors
    #[error("Translation error: {0}")]
    Translation(String),

    /// Field-related errors
    #[error("Field error: {0}")]
    Field(String),

    /// An index alias with no configured mapping
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// A result-set id that is unknown or has expired
    #[error("Result set not found: {0}")]
    ResultSetNotFound(String),

    /// Scan diagnostics (unsupported index, multi-reader scan, etc.)
    #[error("Scan error: {0}")]
    Scan(String),

    /// Facet computation errors
    #[error("Facet error: {0}")]
    Facet(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with XystonError.
pub type Result<T> = std::result::Result<T, XystonError>;

impl XystonError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        XystonError::Index(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        XystonError::Query(msg.into())
    }

    /// Create a new parse error.
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        XystonError::Query(msg.into()) // Parse errors are treated as query errors
    }

    /// Create a new translation error.
    pub fn translation<S: Into<String>>(msg: S) -> Self {
        XystonError::Translation(msg.into())
    }

    /// Create a new field error.
    pub fn field<S: Into<String>>(msg: S) -> Self {
        XystonError::Field(msg.into())
    }

    /// Create a new unknown-field error.
    pub fn unknown_field<S: Into<String>>(alias: S) -> Self {
        XystonError::UnknownField(alias.into())
    }

    /// Create a new result-set-not-found error.
    pub fn result_set_not_found<S: Into<String>>(id: S) -> Self {
        XystonError::ResultSetNotFound(id.into())
    }

    /// Create a new scan error.
    pub fn scan<S: Into<String>>(msg: S) -> Self {
        XystonError::Scan(msg.into())
    }

    /// Create a new facet error.
    pub fn facet<S: Into<String>>(msg: S) -> Self {
        XystonError::Facet(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        XystonError::Config(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        XystonError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = XystonError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = XystonError::query("Test query error");
        assert_eq!(error.to_string(), "Query error: Test query error");

        let error = XystonError::unknown_field("dc.bogus");
        assert_eq!(error.to_string(), "Unknown field: dc.bogus");

        let error = XystonError::result_set_not_found("abc123");
        assert_eq!(error.to_string(), "Result set not found: abc123");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let xyston_error = XystonError::from(io_error);

        match xyston_error {
            XystonError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
