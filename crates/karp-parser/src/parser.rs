//! Query-string parser.
//!
//! Lexing is done by the pest grammar in `query.pest`, which splits the
//! input into `||`-separated segments and `|`-separated tokens. The tree is
//! then assembled in prefix order: boolean operators are pushed on a stack
//! and collect the expressions that follow until their arity is met.
//!
//! Nesting is bounded while the tree is built, so no tree deeper than the
//! limit ever exists. Flat `and`/`or` chains at the root do not nest.

use pest::Parser;
use pest_derive::Parser;

use karp_core::error::QueryError;

use crate::ast::{unescape, Ast, Node, Operator};

/// Nesting limit used by [`parse`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Parser)]
#[grammar = "query.pest"]
struct QueryLexer;

/// One `||`-separated segment: the operator name and its inline arguments.
#[derive(Debug)]
struct Segment<'q> {
    text: &'q str,
    position: usize,
    tokens: Vec<String>,
}

/// Parse a query string with the default nesting limit.
///
/// `and` and `or` are prefix operators that take the following `||`
/// segments as operands. A nested `and`/`or` closes after two operands.
/// Only the root one keeps collecting, so `and||A||B||C` has three operands
/// while `or||and||A||B||C||D` parses as `or(and(A, B), C, D)`.
///
/// # Errors
///
/// Returns [`QueryError::MalformedQuery`] or [`QueryError::UnknownOperator`]
/// if the string is not a valid query.
pub fn parse(query: &str) -> Result<Ast, QueryError> {
    parse_with_depth(query, DEFAULT_MAX_DEPTH)
}

/// Parse an optional query string; `None` is the empty query.
///
/// # Errors
///
/// See [`parse`].
pub fn parse_optional(query: Option<&str>) -> Result<Ast, QueryError> {
    match query {
        Some(q) => parse(q),
        None => Ok(Ast::empty()),
    }
}

/// Parse a query string, rejecting trees deeper than `max_depth` nodes.
/// Depth counts nesting only; any number of operands may follow a root
/// `and`/`or`.
///
/// # Errors
///
/// See [`parse`].
pub fn parse_with_depth(query: &str, max_depth: usize) -> Result<Ast, QueryError> {
    if query.trim().is_empty() {
        return Ok(Ast::empty());
    }

    let segments = lex(query)?;
    let mut builder = TreeBuilder::new(max_depth);
    for segment in &segments {
        builder.push(segment)?;
    }
    let ast = builder.finish()?;

    tracing::debug!(
        query,
        segments = segments.len(),
        nodes = ast.walk().count(),
        "parsed query"
    );
    Ok(ast)
}

fn lex(query: &str) -> Result<Vec<Segment<'_>>, QueryError> {
    let mut pairs = QueryLexer::parse(Rule::query, query).map_err(|e| lex_error(query, &e))?;
    let Some(root) = pairs.next() else {
        return Ok(Vec::new());
    };

    let segments = root
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::segment)
        .map(|pair| {
            let span = pair.as_span();
            Segment {
                text: span.as_str(),
                position: span.start(),
                tokens: pair.into_inner().map(|t| unescape(t.as_str())).collect(),
            }
        })
        .collect();
    Ok(segments)
}

fn lex_error(query: &str, err: &pest::error::Error<Rule>) -> QueryError {
    let position = match err.location {
        pest::error::InputLocation::Pos(p) => p,
        pest::error::InputLocation::Span((start, _)) => start,
    };
    let rest = query.get(position..).unwrap_or_default();
    let message = if rest.is_empty() {
        "query ends with a dangling separator"
    } else if rest.starts_with('|') {
        "empty argument or expression"
    } else {
        "unexpected input"
    };
    QueryError::malformed(rest.chars().take(24).collect::<String>(), position, message)
}

/// A boolean operator still waiting for operands.
struct Pending {
    node: Node,
    fragment: String,
    position: usize,
}

struct TreeBuilder {
    max_depth: usize,
    stack: Vec<Pending>,
    root: Option<Node>,
}

impl TreeBuilder {
    fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            stack: Vec::new(),
            root: None,
        }
    }

    fn push(&mut self, segment: &Segment<'_>) -> Result<(), QueryError> {
        let Some((head, args)) = segment.tokens.split_first() else {
            return Err(QueryError::malformed(
                segment.text,
                segment.position,
                "empty expression",
            ));
        };
        let op = Operator::from_name(head).ok_or_else(|| QueryError::UnknownOperator {
            token: head.clone(),
            position: segment.position,
        })?;

        if op.is_logical() {
            if !args.is_empty() {
                return Err(QueryError::malformed(
                    segment.text,
                    segment.position,
                    format!("'{op}' takes its operands as '||'-separated expressions"),
                ));
            }
            self.check_depth(1, segment)?;
            let node = Node::operator(op, op.base_arity())
                .map_err(|e| QueryError::malformed(segment.text, segment.position, e.to_string()))?;
            self.stack.push(Pending {
                node,
                fragment: segment.text.to_string(),
                position: segment.position,
            });
            return Ok(());
        }

        if !op.accepts_arity(args.len()) {
            return Err(QueryError::malformed(
                segment.text,
                segment.position,
                format!(
                    "'{op}' expects {} argument(s), got {}",
                    op.arity_description(),
                    args.len()
                ),
            ));
        }
        let mut node = Node::operator(op, args.len())
            .map_err(|e| QueryError::malformed(segment.text, segment.position, e.to_string()))?;
        for arg in args {
            attach(&mut node, Node::argument(arg));
        }
        self.check_depth(node.depth(), segment)?;
        self.complete(node, segment)
    }

    /// Hand a finished expression to the innermost pending operator, closing
    /// every operator that becomes complete on the way up.
    fn complete(&mut self, mut node: Node, segment: &Segment<'_>) -> Result<(), QueryError> {
        while let Some(mut pending) = self.stack.pop() {
            attach(&mut pending.node, node);
            if !pending.node.is_complete() {
                self.stack.push(pending);
                return Ok(());
            }
            node = pending.node;
        }
        self.extend_root(node, segment)
    }

    /// An expression after a complete `and`/`or` root becomes one more of
    /// its operands. After any other root it is an error.
    fn extend_root(&mut self, node: Node, segment: &Segment<'_>) -> Result<(), QueryError> {
        let Some(root) = self.root.as_mut() else {
            self.root = Some(node);
            return Ok(());
        };
        root.push_operand(node).map_err(|_| {
            QueryError::malformed(
                segment.text,
                segment.position,
                "expression follows a complete query; combine expressions with 'and' or 'or'",
            )
        })
    }

    /// Fail if an expression `height` levels tall would end up deeper than
    /// the limit at the current position.
    fn check_depth(&self, height: usize, segment: &Segment<'_>) -> Result<(), QueryError> {
        let nesting = self.stack.len() + usize::from(self.root.is_some());
        if nesting + height > self.max_depth {
            return Err(QueryError::malformed(
                segment.text,
                segment.position,
                format!("query nests deeper than {} levels", self.max_depth),
            ));
        }
        Ok(())
    }

    fn finish(self) -> Result<Ast, QueryError> {
        if let Some(pending) = self.stack.last() {
            let got = pending.node.children().count();
            let message = match pending.node.operator_kind() {
                Some(op @ (Operator::And | Operator::Or)) => {
                    format!("'{op}' needs at least two operands, got {got}")
                }
                Some(op) => format!("'{op}' is missing its operand"),
                None => "incomplete expression".to_string(),
            };
            return Err(QueryError::malformed(
                pending.fragment.clone(),
                pending.position,
                message,
            ));
        }

        Ok(self.root.map_or_else(Ast::empty, Ast::new))
    }
}

/// Add a child to a node that is known to have room for it.
fn attach(parent: &mut Node, child: Node) {
    if let Err(err) = parent.add_child(child) {
        unreachable!("parser attached an operand to a complete node: {err}");
    }
}
