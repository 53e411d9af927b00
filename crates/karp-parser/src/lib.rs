//! # karp-parser
//!
//! Parser for the Karp query DSL, the pipe-delimited expression language
//! accepted by the `q` parameter of the search endpoints:
//!
//! ```text
//! and||equals|wf|sitta||not||equals|wf|satt
//! ```
//!
//! Parses query strings into an [`Ast`] that the `karp-query` crate compiles
//! into backend search queries.

pub mod ast;
pub mod parser;

pub use ast::{Ast, AstError, Literal, Node, NodeKind, Operator, Walk};
pub use parser::{parse, parse_optional, parse_with_depth, DEFAULT_MAX_DEPTH};
