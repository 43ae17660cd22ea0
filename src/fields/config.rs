//! Field configuration: alias resolution and derived field-name variants.
//!
//! A logical index name (possibly a compound context-set name like
//! `dc.title`) resolves to one or more physical base field names. From a
//! base name, suffix rules derive the variants used for exact matching,
//! sorting, faceting, presence testing, stemming and stored retrieval.
//! The derivations are pure string transforms; persisted indexes depend on
//! them being stable across releases.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, XystonError};

/// Reserved index names that resolve to every configured base field.
const SEARCH_EVERYTHING_ALIASES: &[&str] = &[
    "cql.anywhere",
    "cql.allindexes",
    "cql.anyindexes",
    "cql.serverchoice",
];

/// Reserved index name for the match-all tautology (`cql.allRecords=1`).
const ALL_RECORDS_ALIAS: &str = "cql.allrecords";

/// Reserved index name referencing a previously executed result set.
const RESULT_SET_ALIAS: &str = "cql.resultsetid";

/// The outcome of resolving a logical index name.
///
/// Reserved pseudo-fields bypass the normal physical-field fan-out, so
/// resolution returns a closed set of shapes rather than a bare field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIndex {
    /// One or more physical base field names, in configured order.
    Fields(Vec<String>),
    /// The `cql.allRecords` tautology; matches every document.
    AllRecords,
    /// The `cql.resultSetId` reference; the term is a prior result-set id.
    ResultSetRef,
}

/// Immutable-after-build field configuration.
///
/// Holds the alias table, the ordered list of configured base fields, and
/// the optional naming suffixes. Unresolvable aliases are a query error,
/// never a silent empty match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfiguration {
    /// Lowercased alias -> ordered physical base field names.
    #[serde(default)]
    aliases: AHashMap<String, Vec<String>>,
    /// All configured base fields, in registration order.
    fields: Vec<String>,
    exact_suffix: Option<String>,
    presence_suffix: Option<String>,
    sort_suffix: Option<String>,
    stemmed_suffix: Option<String>,
    facet_suffix: Option<String>,
    stored_suffix: Option<String>,
}

impl FieldConfiguration {
    /// Create a builder.
    pub fn builder() -> FieldConfigurationBuilder {
        FieldConfigurationBuilder::new()
    }

    /// All configured base field names, in registration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Resolve a logical index name to its physical fields or a reserved
    /// pseudo-field.
    ///
    /// Resolution is case-insensitive on the alias. A name that is neither
    /// a reserved pseudo-field, a configured alias, nor a configured base
    /// field fails with [`XystonError::UnknownField`].
    pub fn resolve(&self, alias: &str) -> Result<ResolvedIndex> {
        let key = alias.to_lowercase();
        if key == ALL_RECORDS_ALIAS {
            return Ok(ResolvedIndex::AllRecords);
        }
        if key == RESULT_SET_ALIAS {
            return Ok(ResolvedIndex::ResultSetRef);
        }
        if SEARCH_EVERYTHING_ALIASES.contains(&key.as_str()) {
            return Ok(ResolvedIndex::Fields(self.fields.clone()));
        }
        if let Some(fields) = self.aliases.get(&key) {
            return Ok(ResolvedIndex::Fields(fields.clone()));
        }
        // A configured base field always resolves to itself.
        if self.fields.iter().any(|f| f == alias) {
            return Ok(ResolvedIndex::Fields(vec![alias.to_string()]));
        }
        Err(XystonError::unknown_field(alias))
    }

    /// Resolve an alias that must map to plain physical fields.
    ///
    /// Used where a pseudo-field makes no sense (sorting, faceting, scan).
    pub fn resolve_fields(&self, alias: &str) -> Result<Vec<String>> {
        match self.resolve(alias)? {
            ResolvedIndex::Fields(fields) => Ok(fields),
            ResolvedIndex::AllRecords | ResolvedIndex::ResultSetRef => Err(XystonError::field(
                format!("\"{alias}\" does not name a physical field"),
            )),
        }
    }

    /// Strip any known variant suffix to recover the base field name.
    fn base_name<'a>(&self, field_name: &'a str) -> &'a str {
        for suffix in [
            &self.exact_suffix,
            &self.facet_suffix,
            &self.sort_suffix,
            &self.stemmed_suffix,
            &self.presence_suffix,
            &self.stored_suffix,
        ]
        .into_iter()
        .flatten()
        {
            if let Some(stripped) = field_name.strip_suffix(suffix.as_str()) {
                return stripped;
            }
        }
        field_name
    }

    fn variant(&self, field_name: &str, suffix: &Option<String>) -> String {
        let base = self.base_name(field_name);
        match suffix {
            Some(s) => format!("{base}{s}"),
            None => base.to_string(),
        }
    }

    /// The exact-match variant of a field name.
    pub fn exact_name(&self, field_name: &str) -> String {
        self.variant(field_name, &self.exact_suffix)
    }

    /// The presence-indicator variant of a field name.
    pub fn presence_name(&self, field_name: &str) -> String {
        self.variant(field_name, &self.presence_suffix)
    }

    /// The sort-optimized variant of a field name.
    pub fn sort_name(&self, field_name: &str) -> String {
        self.variant(field_name, &self.sort_suffix)
    }

    /// The stemmed variant of a field name.
    pub fn stemmed_name(&self, field_name: &str) -> String {
        self.variant(field_name, &self.stemmed_suffix)
    }

    /// The untokenized facet variant of a field name.
    pub fn facet_name(&self, field_name: &str) -> String {
        self.variant(field_name, &self.facet_suffix)
    }

    /// The stored (retrievable) variant of a field name.
    pub fn stored_name(&self, field_name: &str) -> String {
        self.variant(field_name, &self.stored_suffix)
    }
}

/// Builder for [`FieldConfiguration`].
#[derive(Debug, Default)]
pub struct FieldConfigurationBuilder {
    aliases: AHashMap<String, Vec<String>>,
    fields: Vec<String>,
    exact_suffix: Option<String>,
    presence_suffix: Option<String>,
    sort_suffix: Option<String>,
    stemmed_suffix: Option<String>,
    facet_suffix: Option<String>,
    stored_suffix: Option<String>,
}

impl FieldConfigurationBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a physical base field.
    pub fn field<S: Into<String>>(mut self, name: S) -> Self {
        let name = name.into();
        if !self.fields.contains(&name) {
            self.fields.push(name);
        }
        self
    }

    /// Register an alias mapping to one or more base fields.
    pub fn alias<S, I, F>(mut self, name: S, fields: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.aliases.insert(
            name.into().to_lowercase(),
            fields.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Set the exact-match suffix.
    pub fn exact_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.exact_suffix = Some(suffix.into());
        self
    }

    /// Set the presence-indicator suffix.
    pub fn presence_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.presence_suffix = Some(suffix.into());
        self
    }

    /// Set the sort-field suffix.
    pub fn sort_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.sort_suffix = Some(suffix.into());
        self
    }

    /// Set the stemmed-field suffix.
    pub fn stemmed_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.stemmed_suffix = Some(suffix.into());
        self
    }

    /// Set the facet-field suffix.
    pub fn facet_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.facet_suffix = Some(suffix.into());
        self
    }

    /// Set the stored-field suffix.
    pub fn stored_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.stored_suffix = Some(suffix.into());
        self
    }

    /// Build the configuration, validating alias targets.
    pub fn build(self) -> Result<FieldConfiguration> {
        for (alias, fields) in &self.aliases {
            if fields.is_empty() {
                return Err(XystonError::config(format!(
                    "alias \"{alias}\" maps to no fields"
                )));
            }
        }
        Ok(FieldConfiguration {
            aliases: self.aliases,
            fields: self.fields,
            exact_suffix: self.exact_suffix,
            presence_suffix: self.presence_suffix,
            sort_suffix: self.sort_suffix,
            stemmed_suffix: self.stemmed_suffix,
            facet_suffix: self.facet_suffix,
            stored_suffix: self.stored_suffix,
        })
    }
}
