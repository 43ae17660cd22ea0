//! SRU sort-key parsing and translation to a native sort specification.
//!
//! Sort keys arrive as a space-separated list of
//! `path,schema,ascending,caseSensitivity,missingValueRule` tuples. Each key
//! resolves through the field configuration (multi-field aliases expand to
//! multiple criteria) and maps onto the native engine's sort fields:
//!
//! - The native engine treats missing values as low, so "missing sorts high"
//!   is realized by prepending a sort criterion on the field's
//!   presence-indicator variant, which puts documents that have the field
//!   first.
//! - The native sort-field `reverse` flag convention is inverted relative to
//!   the CQL ascending convention. The primary criterion's `reverse` is the
//!   negation of the requested ascending flag. This inversion must be kept
//!   exactly or the sort order silently flips.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fields::FieldConfiguration;

/// Where documents missing the sort field should appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingValue {
    /// Missing values sort last (`highValue`, the wire default here).
    High,
    /// Missing values sort first (`lowValue`, the native engine default).
    Low,
}

/// One parsed sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The index path (field alias); empty paths are no-op placeholders.
    pub path: String,
    /// The optional record schema, unused by this core.
    pub schema: Option<String>,
    pub ascending: bool,
    pub case_sensitive: bool,
    pub missing_value: MissingValue,
}

impl SortKey {
    /// Parse a single `path,schema,ascending,caseSensitivity,missingValue`
    /// tuple. Absent positions take the CQL defaults.
    pub fn parse(key: &str) -> SortKey {
        let fields: Vec<&str> = key.split(',').collect();
        SortKey {
            path: fields.first().unwrap_or(&"").to_string(),
            schema: fields
                .get(1)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            ascending: fields.get(2).map(|s| *s == "1").unwrap_or(true),
            case_sensitive: fields.get(3).map(|s| *s == "1").unwrap_or(false),
            missing_value: match fields.get(4) {
                Some(&"lowValue") => MissingValue::Low,
                _ => MissingValue::High,
            },
        }
    }

    /// Parse a space-separated sort-key list.
    pub fn parse_list(sort_keys: &str) -> Vec<SortKey> {
        sort_keys
            .split(' ')
            .filter(|key| !key.is_empty())
            .map(SortKey::parse)
            .collect()
    }
}

/// One native sort field with its reverse flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub field: String,
    pub reverse: bool,
}

/// A native multi-key sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeSort {
    /// Relevance-ranked ordering; the default when no usable keys remain.
    Relevance,
    /// Explicit sort criteria, applied in order.
    ByFields(Vec<SortCriterion>),
}

/// Translate parsed sort keys into a native sort specification.
pub fn translate_sort_keys(
    keys: &[SortKey],
    field_config: &FieldConfiguration,
) -> Result<NativeSort> {
    let mut criteria = Vec::new();
    for key in keys {
        if key.path.trim().is_empty() {
            continue;
        }
        for field in field_config.resolve_fields(&key.path)? {
            if key.missing_value == MissingValue::High {
                // The engine sorts missing values low by default; sorting by
                // the presence indicator first pushes documents without the
                // field to the requested end.
                let presence = field_config.presence_name(&field);
                info!(
                    "sorting by {presence} (presence field) {}",
                    if key.ascending { "ascending" } else { "descending" }
                );
                // Note the flag asymmetry: the presence criterion carries the
                // ascending flag directly, while the primary criterion below
                // carries its negation.
                criteria.push(SortCriterion {
                    field: presence,
                    reverse: key.ascending,
                });
            }
            let sort_field = field_config.sort_name(&field);
            info!(
                "sorting by {sort_field} {}",
                if key.ascending { "ascending" } else { "descending" }
            );
            criteria.push(SortCriterion {
                field: sort_field,
                reverse: !key.ascending,
            });
        }
    }
    if criteria.is_empty() {
        debug!("no usable sort keys; sorting by relevance");
        Ok(NativeSort::Relevance)
    } else {
        Ok(NativeSort::ByFields(criteria))
    }
}

/// Parse and translate a raw sort-key list in one step.
pub fn translate_sort_key_list(
    sort_keys: &str,
    field_config: &FieldConfiguration,
) -> Result<NativeSort> {
    translate_sort_keys(&SortKey::parse_list(sort_keys), field_config)
}
