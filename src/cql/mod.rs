//! CQL query model and parsing.
//!
//! The query tree is a closed tagged union over boolean and term nodes;
//! relation names map onto a [`Relation`] enum so translation can match
//! exhaustively instead of chaining type tests.

pub mod node;
pub mod parser;

pub use node::{BooleanOp, QueryNode, Relation};
pub use parser::parse;
