//! Field name resolution: mapping query-facing aliases to physical index
//! fields and deriving the per-purpose field name variants.

pub mod config;

pub use config::{FieldConfiguration, FieldConfigurationBuilder, ResolvedIndex};
