//! Structured search constraints and their compilation to CQL.
//!
//! Callers describe a search as a tree of constraints rather than a raw
//! query string. Compilation renders the tree as CQL, parenthesizing at
//! each group boundary so precedence survives, and delegating free-text
//! user queries to an external parser.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Characters some layer of the index stack rejects in index names.
const INVALID_CHARS: &str = " ~`@#$%^&*()+=-\\|]}[{;:'\"?/>.<;,";

/// Replacements for [`INVALID_CHARS`], position for position. Invalid
/// characters past the end of this string are dropped entirely, like the
/// XPath `translate()` function.
const VALID_ALTERNATIVE_CHARS: &str = "_";

/// The index holding each record's owning collection id.
pub const COLLECTION_ID_INDEX: &str = "collectionId";

/// The tautological clause matching every record.
const MATCH_ALL_QUERY: &str = "cql.allRecords=1";

/// Sort by record identifier, ascending.
pub const RECORD_ID_SORT_KEY: &str = "dc.identifier,,1,,lowValue";

/// Sort by modification date, newest first.
pub const MOD_DATE_SORT_KEY: &str = "modificationDate,,0,,lowValue";

/// One node in a structured search description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchConstraint {
    /// Restrict to one collection.
    Collection(String),
    /// Exact match on one part of a typed field.
    FieldPart {
        field_type: String,
        part: String,
        value: String,
    },
    /// A raw, already-valid CQL clause.
    QueryClause(String),
    /// Free-form user text, delegated to the query parser.
    UserQuery(String),
    And(Vec<SearchConstraint>),
    Or(Vec<SearchConstraint>),
}

/// Parses free-text user queries into CQL clauses.
pub trait UserQueryParser {
    fn parse(&self, user_query: &str) -> Result<String>;
}

/// Compiles constraint trees into CQL query strings.
pub struct StructuredQueryCompiler<'a> {
    parser: &'a dyn UserQueryParser,
}

impl<'a> StructuredQueryCompiler<'a> {
    pub fn new(parser: &'a dyn UserQueryParser) -> Self {
        StructuredQueryCompiler { parser }
    }

    /// Compile a constraint list; top-level constraints are joined with
    /// `and`. An empty list matches everything.
    pub fn compile(&self, constraints: &[SearchConstraint]) -> Result<String> {
        if constraints.is_empty() {
            return Ok(MATCH_ALL_QUERY.to_string());
        }
        let mut query = String::new();
        for constraint in constraints {
            if !query.is_empty() {
                query.push_str(" and ");
            }
            query.push_str(&self.clause(constraint)?);
        }
        Ok(query)
    }

    fn clause(&self, constraint: &SearchConstraint) -> Result<String> {
        match constraint {
            SearchConstraint::Collection(collection_id) => {
                Ok(format!("{COLLECTION_ID_INDEX}=\"{collection_id}\""))
            }
            SearchConstraint::UserQuery(user_query) => {
                debug!("parsing user query: {user_query}");
                // The delegate parser mishandles a bare ":"; strip colons
                // before parsing. A workaround, not a fix.
                let stripped = user_query.replace(':', "");
                let clause = self.parser.parse(&stripped)?;
                if clause.trim().is_empty() {
                    Ok(MATCH_ALL_QUERY.to_string())
                } else {
                    Ok(format!("({clause})"))
                }
            }
            SearchConstraint::QueryClause(raw) => Ok(format!("({raw})")),
            SearchConstraint::FieldPart {
                field_type,
                part,
                value,
            } => Ok(part_exact_match_clause(field_type, part, value)),
            SearchConstraint::And(children) => self.group(children, " and "),
            SearchConstraint::Or(children) => self.group(children, " or "),
        }
    }

    fn group(&self, children: &[SearchConstraint], joiner: &str) -> Result<String> {
        if children.is_empty() {
            return Ok(MATCH_ALL_QUERY.to_string());
        }
        let mut query = String::new();
        for child in children {
            if !query.is_empty() {
                query.push_str(joiner);
            }
            query.push_str(&self.clause(child)?);
        }
        Ok(format!("({query})"))
    }
}

/// Pick the sort keys for a compiled search: record-id order when the
/// constraints carry a user query, newest-first otherwise.
pub fn default_sort_keys(constraints: &[SearchConstraint]) -> &'static str {
    if contains_user_query(constraints) {
        RECORD_ID_SORT_KEY
    } else {
        MOD_DATE_SORT_KEY
    }
}

/// Only `And` groups are descended into; a user query buried in an `Or`
/// group does not affect sort-key selection.
fn contains_user_query(constraints: &[SearchConstraint]) -> bool {
    constraints.iter().any(|constraint| match constraint {
        SearchConstraint::UserQuery(user_query) => !user_query.trim().is_empty(),
        SearchConstraint::And(children) => contains_user_query(children),
        _ => false,
    })
}

/// Derive the index name for one part of a typed field.
pub fn field_part_index_name(field_type: &str, part: &str) -> String {
    format!(
        "{}-part-{}",
        translate_index_name(field_type),
        translate_index_name(part)
    )
}

/// Derive the index name for one attribute of a typed field.
pub fn field_attribute_index_name(field_type: &str, attribute: &str) -> String {
    format!(
        "{}-attribute-{}",
        translate_index_name(field_type),
        translate_index_name(attribute)
    )
}

/// Build an exact-match clause against a field part's index.
pub fn part_exact_match_clause(field_type: &str, part: &str, value: &str) -> String {
    format!(
        "{} exact \"{}\"",
        field_part_index_name(field_type, part),
        value.replace('"', "\\\"")
    )
}

/// Build an exact-match clause against a field attribute's index.
pub fn attribute_exact_match_clause(field_type: &str, attribute: &str, value: &str) -> String {
    format!(
        "{} exact \"{}\"",
        field_attribute_index_name(field_type, attribute),
        value.replace('"', "\\\"")
    )
}

/// Replace or drop characters the index layer cannot accept in a name.
/// Behaves like the XPath `translate()` function.
pub fn translate_index_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| match INVALID_CHARS.find(c) {
            None => Some(c),
            Some(position) => VALID_ALTERNATIVE_CHARS.chars().nth(position),
        })
        .collect()
}
