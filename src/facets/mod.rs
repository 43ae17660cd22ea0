//! Facet data model and computation.
//!
//! A facet is a (field, value) breakdown of hit counts used to let callers
//! further narrow a result set. Requests name a base field along with an
//! optional count and an offset into the value list; results carry the
//! per-value counts in a shape independent of the strategy that produced
//! them.

pub mod calculator;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XystonError};

pub use calculator::{sorted_values_for_facet, FacetCalculator, FacetValueSource, MAX_HITS_TO_TRAVERSE};

/// A request for one facet field's value breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetRequest {
    /// Base field name whose facet variant is counted.
    pub field: String,
    /// Maximum number of values to return. `None` means unlimited.
    pub count: Option<usize>,
    /// Number of values to skip before collecting.
    pub offset: usize,
}

impl FacetRequest {
    /// Request every value of `field`.
    pub fn new<S: Into<String>>(field: S) -> Self {
        FacetRequest {
            field: field.into(),
            count: None,
            offset: 0,
        }
    }

    /// Parse the `field,count,offset` wire form. Count and offset are
    /// optional; an empty count means unlimited.
    ///
    /// ```
    /// use xyston::facets::FacetRequest;
    ///
    /// let request = FacetRequest::parse("subject,10,20").unwrap();
    /// assert_eq!(request.field, "subject");
    /// assert_eq!(request.count, Some(10));
    /// assert_eq!(request.offset, 20);
    /// ```
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.split(',');
        let field = parts.next().unwrap_or("").trim();
        if field.is_empty() {
            return Err(XystonError::facet(format!(
                "facet request \"{spec}\" has no field name"
            )));
        }
        let count = match parts.next().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                XystonError::facet(format!("invalid facet count in \"{spec}\""))
            })?),
        };
        let offset = match parts.next().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                XystonError::facet(format!("invalid facet offset in \"{spec}\""))
            })?,
        };
        if parts.next().is_some() {
            return Err(XystonError::facet(format!(
                "too many parts in facet request \"{spec}\""
            )));
        }
        Ok(FacetRequest {
            field: field.to_string(),
            count,
            offset,
        })
    }
}

/// One counted value within a facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: String,
    pub label: String,
    pub count: u64,
}

impl FacetValue {
    pub fn new<S: Into<String>>(value: S, count: u64) -> Self {
        let value = value.into();
        FacetValue {
            label: value.clone(),
            value,
            count,
        }
    }
}

/// The computed breakdown for one requested facet field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResult {
    pub field: String,
    pub label: String,
    pub values: Vec<FacetValue>,
}
