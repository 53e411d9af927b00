//! AST types for parsed Karp queries.
//!
//! The tree is rigid: every node is created with a fixed arity and refuses
//! children beyond it, so a tree the parser finishes is well-formed by
//! construction. The tree walkers in `karp-query` rely on that and do not
//! re-validate child counts.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A parsed query. `root` is `None` for the empty query, which callers
/// interpret as "no filter".
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Ast {
    pub root: Option<Node>,
}

/// The closed set of query operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Regexp,
    FreeText,
    FreeRegexp,
    Exists,
    Missing,
    Lt,
    Lte,
    Gt,
    Gte,
    Range,
    And,
    Or,
    Not,
}

/// Leaf values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
}

/// What a node is: an operator, or a literal leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Op(Operator),
    Literal(Literal),
}

/// A node of the query tree. Each node exclusively owns its children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    kind: NodeKind,
    arity: usize,
    /// Query text of a numeric leaf whose value renders differently (`007`, `1.50`).
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<Node>,
}

/// Errors raised while constructing a tree by hand. The parser never
/// triggers them; seeing one means a bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AstError {
    #[error("'{tag}' already has its {arity} children")]
    TooManyChildren { tag: String, arity: usize },

    #[error("'{op}' cannot take {arity} operands")]
    InvalidArity { op: Operator, arity: usize },

    #[error("'{tag}' has a fixed number of operands")]
    NotVariadic { tag: String },
}

impl Operator {
    pub const ALL: [Operator; 17] = [
        Self::Equals,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::Regexp,
        Self::FreeText,
        Self::FreeRegexp,
        Self::Exists,
        Self::Missing,
        Self::Lt,
        Self::Lte,
        Self::Gt,
        Self::Gte,
        Self::Range,
        Self::And,
        Self::Or,
        Self::Not,
    ];

    /// Look up an operator by its query-string name. Names are case-sensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Regexp => "regexp",
            Self::FreeText => "freetext",
            Self::FreeRegexp => "freergxp",
            Self::Exists => "exists",
            Self::Missing => "missing",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Range => "range",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }

    /// Boolean operators take whole expressions as operands, from the
    /// `||`-separated segments that follow them.
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Not)
    }

    /// Whether a node of this operator may have `arity` children.
    #[must_use]
    pub fn accepts_arity(self, arity: usize) -> bool {
        match self {
            Self::Regexp => arity == 1 || arity == 2,
            Self::And | Self::Or => arity >= 2,
            other => other.base_arity() == arity,
        }
    }

    /// `and` and `or` take any number of operands from two up.
    #[must_use]
    pub fn is_variadic(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// The arity a node of this operator is created with: the largest for
    /// `regexp`, the smallest for `and`/`or`.
    #[must_use]
    pub fn base_arity(self) -> usize {
        match self {
            Self::FreeText | Self::FreeRegexp | Self::Exists | Self::Missing | Self::Not => 1,
            Self::Range => 3,
            _ => 2,
        }
    }

    /// Human-readable arity, for diagnostics.
    #[must_use]
    pub fn arity_description(self) -> &'static str {
        match self {
            Self::Regexp => "1 or 2",
            Self::Range => "3",
            Self::And | Self::Or => "2 or more",
            Self::FreeText | Self::FreeRegexp | Self::Exists | Self::Missing | Self::Not => "1",
            _ => "2",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Literal {
    /// Classify a raw argument: `-?\d+` is an integer, `-?\d+\.\d+` a float,
    /// anything else (including integers that overflow `i64`) a string.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let digits = raw.strip_prefix('-').unwrap_or(raw);
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

        if all_digits(digits) {
            if let Ok(i) = raw.parse::<i64>() {
                return Self::Int(i);
            }
        } else if let Some((whole, frac)) = digits.split_once('.') {
            if all_digits(whole) && all_digits(frac) {
                if let Ok(f) = raw.parse::<f64>() {
                    return Self::Float(f);
                }
            }
        }
        Self::String(raw.to_string())
    }

    /// The literal as text, as it would be matched against a text field.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format!("{f:?}"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{s}'"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl:?}"),
        }
    }
}

impl Node {
    /// Create an operator node with room for `arity` children.
    ///
    /// # Errors
    ///
    /// Returns [`AstError::InvalidArity`] if the operator does not take `arity` operands.
    pub fn operator(op: Operator, arity: usize) -> Result<Self, AstError> {
        if !op.accepts_arity(arity) {
            return Err(AstError::InvalidArity { op, arity });
        }
        Ok(Self {
            kind: NodeKind::Op(op),
            arity,
            source: None,
            children: Vec::with_capacity(arity),
        })
    }

    /// Create a leaf.
    #[must_use]
    pub fn literal(value: Literal) -> Self {
        Self {
            kind: NodeKind::Literal(value),
            arity: 0,
            source: None,
            children: Vec::new(),
        }
    }

    /// Create a leaf from an argument as written in the query. The text is
    /// kept when the classified value would not render back to it.
    #[must_use]
    pub fn argument(raw: &str) -> Self {
        let literal = Literal::classify(raw);
        let source = (literal.as_text() != raw).then(|| raw.to_string());
        Self {
            source,
            ..Self::literal(literal)
        }
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::String(value.into()))
    }

    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn operator_kind(&self) -> Option<Operator> {
        match self.kind {
            NodeKind::Op(op) => Some(op),
            NodeKind::Literal(_) => None,
        }
    }

    #[must_use]
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            NodeKind::Literal(lit) => Some(lit),
            NodeKind::Op(_) => None,
        }
    }

    /// A leaf's value as text, exactly as it was written in the query.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Literal(lit) => Some(self.source.clone().unwrap_or_else(|| lit.as_text())),
            NodeKind::Op(_) => None,
        }
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Attach the next child.
    ///
    /// # Errors
    ///
    /// Returns [`AstError::TooManyChildren`] once the node already holds `arity` children.
    pub fn add_child(&mut self, child: Node) -> Result<(), AstError> {
        if self.children.len() == self.arity {
            return Err(AstError::TooManyChildren {
                tag: self.tag(),
                arity: self.arity,
            });
        }
        self.children.push(child);
        Ok(())
    }

    /// Append one more operand to a complete `and`/`or`, growing its arity.
    ///
    /// # Errors
    ///
    /// Returns [`AstError::NotVariadic`] for every other node.
    pub fn push_operand(&mut self, child: Node) -> Result<(), AstError> {
        match self.operator_kind() {
            Some(op) if op.is_variadic() => {
                self.arity += 1;
                self.children.push(child);
                Ok(())
            }
            _ => Err(AstError::NotVariadic { tag: self.tag() }),
        }
    }

    /// Direct children, in order.
    pub fn children(&self) -> std::slice::Iter<'_, Node> {
        self.children.iter()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.children.len() == self.arity
    }

    /// Every node of the subtree in pre-order, self first.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Number of nodes on the longest root-to-leaf path.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }

    fn tag(&self) -> String {
        match &self.kind {
            NodeKind::Op(op) => op.name().to_string(),
            NodeKind::Literal(lit) => lit.to_string(),
        }
    }
}

/// Pre-order iterator returned by [`Node::walk`].
pub struct Walk<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

impl Ast {
    #[must_use]
    pub fn new(root: Node) -> Self {
        Self { root: Some(root) }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { root: None }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Every node in pre-order; empty for the empty query.
    pub fn walk(&self) -> impl Iterator<Item = &Node> {
        self.root.iter().flat_map(Node::walk)
    }

    /// Render the tree back into query-string form.
    ///
    /// Parsing the result of a parsed tree yields an equal tree. Only the root
    /// `and`/`or` can hold more than two operands in query syntax, so deeper
    /// ones render as left-nested pairs.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut segments = Vec::new();
        if let Some(root) = &self.root {
            render(root, &mut segments, true);
        }
        segments.join("||")
    }
}

fn render(node: &Node, segments: &mut Vec<String>, at_root: bool) {
    match &node.kind {
        NodeKind::Op(op) if op.is_logical() => {
            let heads = if op.is_variadic() && !at_root {
                node.children.len().saturating_sub(1).max(1)
            } else {
                1
            };
            segments.extend(std::iter::repeat(op.name().to_string()).take(heads));
            for child in &node.children {
                render(child, segments, false);
            }
        }
        NodeKind::Op(op) => {
            let mut segment = op.name().to_string();
            for child in &node.children {
                segment.push('|');
                match child.text() {
                    Some(text) => segment.push_str(&escape(&text)),
                    None => segment.push_str(&escape(&child.tag())),
                }
            }
            segments.push(segment);
        }
        NodeKind::Literal(_) => segments.push(escape(&node.text().unwrap_or_default())),
    }
}

/// Escape a literal for inclusion in a query string.
#[must_use]
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || c == '|' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Undo [`escape`]: `\|` and `\\` collapse, other backslashes are kept.
#[must_use]
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '|' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self, 0usize)];
        while let Some((node, indent)) = stack.pop() {
            writeln!(f, "{:width$}{}", "", node.tag(), width = indent * 2)?;
            stack.extend(node.children.iter().rev().map(|c| (c, indent + 1)));
        }
        Ok(())
    }
}
