//! CQL query tree nodes.

use std::fmt;

/// Boolean connectives between two CQL clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Not,
}

impl fmt::Display for BooleanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BooleanOp::And => write!(f, "and"),
            BooleanOp::Or => write!(f, "or"),
            BooleanOp::Not => write!(f, "not"),
        }
    }
}

/// The relation between an index and a term.
///
/// CQL admits arbitrary relation names, so the enum carries an open tail:
/// anything unrecognized parses as [`Relation::Other`] and translates to the
/// unsupported-relation marker rather than failing the whole query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// `=` — non-exact equality against the base field.
    Equal,
    /// `scr` — server-choice relevance matching; treated like `=`.
    ServerChoice,
    /// `exact` — untokenized match against the exact-field variant.
    Exact,
    /// `any` — match any whitespace token of the term.
    Any,
    /// `all` — match every whitespace token of the term.
    All,
    /// `cql.within` — inclusive range; the term holds two space-separated bounds.
    Within,
    /// Any other relation name, carried verbatim.
    Other(String),
}

impl Relation {
    /// Map a relation base name onto the enum.
    pub fn from_base(base: &str) -> Relation {
        match base.to_lowercase().as_str() {
            "=" => Relation::Equal,
            "scr" => Relation::ServerChoice,
            "exact" => Relation::Exact,
            "any" => Relation::Any,
            "all" => Relation::All,
            "within" | "cql.within" => Relation::Within,
            _ => Relation::Other(base.to_string()),
        }
    }

    /// The wire-form base name of this relation.
    pub fn base(&self) -> &str {
        match self {
            Relation::Equal => "=",
            Relation::ServerChoice => "scr",
            Relation::Exact => "exact",
            Relation::Any => "any",
            Relation::All => "all",
            Relation::Within => "cql.within",
            Relation::Other(base) => base,
        }
    }
}

/// A parsed CQL query tree.
///
/// Produced once by the parser and consumed immutably per translation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    /// A binary boolean node.
    Boolean {
        op: BooleanOp,
        left: Box<QueryNode>,
        right: Box<QueryNode>,
    },
    /// A term node: `index relation "term"`.
    Term {
        index: String,
        relation: Relation,
        term: String,
    },
}

impl QueryNode {
    /// Build a term node.
    pub fn term<I, T>(index: I, relation: Relation, term: T) -> QueryNode
    where
        I: Into<String>,
        T: Into<String>,
    {
        QueryNode::Term {
            index: index.into(),
            relation,
            term: term.into(),
        }
    }

    /// Build a boolean node.
    pub fn boolean(op: BooleanOp, left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::Boolean {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Render the node back to CQL, mostly for logging.
    pub fn to_cql(&self) -> String {
        match self {
            QueryNode::Boolean { op, left, right } => {
                format!("({} {} {})", left.to_cql(), op, right.to_cql())
            }
            QueryNode::Term {
                index,
                relation,
                term,
            } => format!("{} {} \"{}\"", index, relation.base(), term.replace('"', "\\\"")),
        }
    }
}
