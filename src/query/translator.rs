//! CQL query tree to native query string translation.
//!
//! The translator walks the parsed tree once, resolving aliased index names
//! through the [`FieldConfiguration`], fanning each logical clause out across
//! every resolved physical field (joined with `OR`), applying the per-relation
//! translation rules, splicing in previously registered result sets, and
//! escaping every emitted field name and term for the native syntax.
//!
//! Translation is deliberately permissive: malformed range bounds and
//! unrecognized relations degrade to warned, best-effort output instead of
//! failing the whole query. Unknown aliases and missing result sets are hard
//! errors.

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::cql::{BooleanOp, QueryNode, Relation};
use crate::error::{Result, XystonError};
use crate::fields::{FieldConfiguration, ResolvedIndex};

lazy_static! {
    /// Whitespace-delimited tokens within an `any`/`all` term value.
    static ref TERM_TOKEN_PATTERN: Regex = Regex::new(r"\S+").unwrap();
}

/// Characters with meaning in the native query syntax. `*` and `?` are left
/// live so wildcard searches pass through.
const SPECIAL_CHARS: &str = "\\+-!():^[]\"{}~|&/";

/// The native clause that matches every document.
const MATCH_ALL_CLAUSE: &str = "*:*";

/// Lookup of previously executed result sets by id.
///
/// The translator splices the stored native query in verbatim when a query
/// references `cql.resultSetId`.
pub trait ResultSetLookup {
    /// Get the native query registered under `id`, if it is still live.
    fn native_query(&self, id: &str) -> Option<String>;
}

/// A [`ResultSetLookup`] with no registered result sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActiveResultSets;

impl ResultSetLookup for NoActiveResultSets {
    fn native_query(&self, _id: &str) -> Option<String> {
        None
    }
}

/// Escape special characters for the native query syntax, leaving `*` and
/// `?` intact.
pub fn escape_query_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if SPECIAL_CHARS.contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escape a value, quoting it when it contains a space.
pub fn quote_if_contains_space(value: &str) -> String {
    if value.contains(' ') {
        format!("\"{}\"", escape_query_text(value))
    } else {
        escape_query_text(value)
    }
}

/// Translate a CQL query tree into a native query string.
pub fn translate(
    node: &QueryNode,
    field_config: &FieldConfiguration,
    result_sets: &dyn ResultSetLookup,
) -> Result<String> {
    let mut out = String::new();
    write_node(node, &mut out, field_config, result_sets)?;
    debug!("translated {} -> {}", node.to_cql(), out);
    Ok(out)
}

fn write_node(
    node: &QueryNode,
    out: &mut String,
    field_config: &FieldConfiguration,
    result_sets: &dyn ResultSetLookup,
) -> Result<()> {
    match node {
        QueryNode::Boolean { op, left, right } => {
            // Parenthesize exactly as written; no re-association.
            out.push('(');
            write_node(left, out, field_config, result_sets)?;
            out.push_str(match op {
                BooleanOp::And => " AND ",
                BooleanOp::Or => " OR ",
                BooleanOp::Not => " NOT ",
            });
            write_node(right, out, field_config, result_sets)?;
            out.push(')');
            Ok(())
        }
        QueryNode::Term {
            index,
            relation,
            term,
        } => write_term(index, relation, term, out, field_config, result_sets),
    }
}

fn write_term(
    index: &str,
    relation: &Relation,
    term: &str,
    out: &mut String,
    field_config: &FieldConfiguration,
    result_sets: &dyn ResultSetLookup,
) -> Result<()> {
    match field_config.resolve(index)? {
        ResolvedIndex::AllRecords => {
            out.push_str(MATCH_ALL_CLAUSE);
            Ok(())
        }
        ResolvedIndex::ResultSetRef => {
            // The term is a prior result-set id; splice its native query in
            // verbatim rather than re-executing it.
            match result_sets.native_query(term) {
                Some(native) => {
                    out.push('(');
                    out.push_str(&native);
                    out.push(')');
                    Ok(())
                }
                None => {
                    warn!("result set \"{term}\" is unknown or expired");
                    Err(XystonError::result_set_not_found(term))
                }
            }
        }
        ResolvedIndex::Fields(fields) => {
            if fields.is_empty() {
                return Err(XystonError::translation(format!(
                    "\"{index}\" resolves to no physical fields"
                )));
            }
            let mut alternatives = Vec::with_capacity(fields.len());
            for field in &fields {
                if let Some(clause) = term_clause(field, relation, term, field_config) {
                    alternatives.push(clause);
                }
            }
            out.push('(');
            out.push_str(&alternatives.join(" OR "));
            out.push(')');
            Ok(())
        }
    }
}

/// Build the clause for one physical field, or `None` when the clause is
/// dropped (malformed range bounds).
fn term_clause(
    field: &str,
    relation: &Relation,
    term: &str,
    field_config: &FieldConfiguration,
) -> Option<String> {
    match relation {
        Relation::Equal | Relation::ServerChoice => Some(format!(
            "{}:{}",
            escape_query_text(field),
            quote_if_contains_space(term)
        )),
        Relation::Exact => Some(format!(
            "{}:{}",
            escape_query_text(&field_config.exact_name(field)),
            quote_if_contains_space(term)
        )),
        Relation::Any => Some(tokenized_clause(field, term, " OR ")),
        Relation::All => Some(tokenized_clause(field, term, " AND ")),
        Relation::Within => {
            let bounds: Vec<&str> = term.split_whitespace().collect();
            if bounds.len() == 2 {
                Some(format!(
                    "{}:[{} TO {}]",
                    escape_query_text(field),
                    quote_if_contains_space(bounds[0]),
                    quote_if_contains_space(bounds[1])
                ))
            } else {
                // Degraded-but-available: drop the clause, keep the query.
                warn!(
                    "dropping range clause on \"{field}\": expected 2 bounds, found {} in \"{term}\"",
                    bounds.len()
                );
                None
            }
        }
        Relation::Other(base) => {
            // A single plain token with no field qualifier: a Lucene-style
            // parser reads it as an ordinary term and finds nothing, rather
            // than erroring out the whole query.
            warn!("unsupported relation \"{base}\" on \"{field}\"");
            Some(format!("UnsupportedRelation_{}", escape_query_text(base)))
        }
    }
}

/// `any`/`all`: one equality clause per whitespace token, joined by the
/// given operator. An empty token list degenerates to a clause that matches
/// no documents; it must never widen to match-everything.
fn tokenized_clause(field: &str, term: &str, joiner: &str) -> String {
    let tokens: Vec<&str> = TERM_TOKEN_PATTERN
        .find_iter(term)
        .map(|m| m.as_str())
        .collect();
    if tokens.is_empty() {
        return format!("{}:\"\"", escape_query_text(field));
    }
    let clauses: Vec<String> = tokens
        .iter()
        .map(|token| {
            format!(
                "{}:{}",
                escape_query_text(field),
                escape_query_text(token)
            )
        })
        .collect();
    format!("({})", clauses.join(joiner))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::cql;

    struct StaticResultSets(HashMap<String, String>);

    impl ResultSetLookup for StaticResultSets {
        fn native_query(&self, id: &str) -> Option<String> {
            self.0.get(id).cloned()
        }
    }

    fn config() -> FieldConfiguration {
        FieldConfiguration::builder()
            .field("dc_title")
            .field("mods_title")
            .field("dc_date")
            .alias("title", ["dc_title", "mods_title"])
            .alias("date", ["dc_date"])
            .exact_suffix(".exact")
            .facet_suffix(".facet")
            .build()
            .unwrap()
    }

    fn translate_str(query: &str) -> Result<String> {
        translate(&cql::parse(query).unwrap(), &config(), &NoActiveResultSets)
    }

    #[test]
    fn test_equality_fans_out_across_physical_fields() {
        assert_eq!(
            translate_str("title = cat").unwrap(),
            "(dc_title:cat OR mods_title:cat)"
        );
    }

    #[test]
    fn test_single_field_alias() {
        assert_eq!(translate_str("date = 1990").unwrap(), "(dc_date:1990)");
    }

    #[test]
    fn test_multi_word_value_is_quoted() {
        assert_eq!(
            translate_str("date = \"circa 1990\"").unwrap(),
            "(dc_date:\"circa 1990\")"
        );
    }

    #[test]
    fn test_exact_relation_targets_exact_variant() {
        assert_eq!(
            translate_str("title exact cat").unwrap(),
            "(dc_title.exact:cat OR mods_title.exact:cat)"
        );
    }

    #[test]
    fn test_any_relation_ors_tokens() {
        assert_eq!(
            translate_str("date any \"moon cow\"").unwrap(),
            "((dc_date:moon OR dc_date:cow))"
        );
    }

    #[test]
    fn test_all_relation_ands_tokens() {
        assert_eq!(
            translate_str("date all \"moon cow\"").unwrap(),
            "((dc_date:moon AND dc_date:cow))"
        );
    }

    #[test]
    fn test_empty_token_list_matches_nothing() {
        let node = QueryNode::term("date", Relation::All, "   ");
        let native = translate(&node, &config(), &NoActiveResultSets).unwrap();
        assert_eq!(native, "(dc_date:\"\")");
        // The degenerate clause must not be the match-all clause.
        assert_ne!(native, "(*:*)");
    }

    #[test]
    fn test_within_relation_emits_inclusive_range() {
        assert_eq!(
            translate_str("date cql.within \"1990 1999\"").unwrap(),
            "(dc_date:[1990 TO 1999])"
        );
    }

    #[test]
    fn test_malformed_range_bounds_drop_the_clause() {
        // Three bounds: dropped with a warning, not a hard failure.
        assert_eq!(
            translate_str("date cql.within \"1990 1995 1999\"").unwrap(),
            "()"
        );
    }

    #[test]
    fn test_unsupported_relation_emits_marker() {
        let native = translate_str("date encloses point").unwrap();
        assert_eq!(native, "(UnsupportedRelation_encloses)");
        // The marker must parse as a plain term: no field separator.
        assert!(!native.contains(':'));
    }

    #[test]
    fn test_boolean_parenthesization_preserved() {
        assert_eq!(
            translate_str("date = 1990 and (title = cat or title = dog)").unwrap(),
            "((dc_date:1990) AND ((dc_title:cat OR mods_title:cat) OR (dc_title:dog OR mods_title:dog)))"
        );
    }

    #[test]
    fn test_not_operator() {
        assert_eq!(
            translate_str("date = 1990 not date = 1991").unwrap(),
            "((dc_date:1990) NOT (dc_date:1991))"
        );
    }

    #[test]
    fn test_all_records_translates_to_match_all() {
        assert_eq!(translate_str("cql.allRecords=1").unwrap(), "*:*");
    }

    #[test]
    fn test_result_set_substitution_is_verbatim() {
        let mut sets = HashMap::new();
        sets.insert("abc123".to_string(), "(dc_title:cat)".to_string());
        let native = translate(
            &cql::parse("cql.resultSetId=abc123").unwrap(),
            &config(),
            &StaticResultSets(sets),
        )
        .unwrap();
        assert_eq!(native, "((dc_title:cat))");
    }

    #[test]
    fn test_unknown_result_set_is_an_error() {
        let result = translate(
            &cql::parse("cql.resultSetId=expired").unwrap(),
            &config(),
            &NoActiveResultSets,
        );
        assert!(matches!(result, Err(XystonError::ResultSetNotFound(_))));
    }

    #[test]
    fn test_unknown_alias_is_an_error() {
        assert!(matches!(
            translate_str("bogus = cat"),
            Err(XystonError::UnknownField(_))
        ));
    }

    #[test]
    fn test_escaping_special_characters() {
        assert_eq!(escape_query_text("a:b(c)"), "a\\:b\\(c\\)");
        // Wildcards stay live.
        assert_eq!(escape_query_text("ca*t?"), "ca*t?");
        assert_eq!(
            translate_str("date = \"1990:draft\"").unwrap(),
            "(dc_date:1990\\:draft)"
        );
    }

    #[test]
    fn test_server_choice_fans_out_everywhere() {
        assert_eq!(
            translate_str("cat").unwrap(),
            "(dc_title:cat OR mods_title:cat OR dc_date:cat)"
        );
    }
}
