//! AST → backend query tree walker.
//!
//! One arm per operator; adding an operator to the parser without teaching
//! the walker about it fails to compile.

use std::sync::Arc;

use karp_core::error::QueryError;
use karp_index::{FieldKind, FieldMapping, MappedField, RangeBounds, Scalar};
use karp_parser::{Literal, Node, NodeKind, Operator};

use crate::emit::QueryEmitter;

/// Characters that carry meaning in the regular expression dialects of the
/// supported backends.
const REGEX_SPECIAL: &[char] = &[
    '.', '?', '+', '*', '|', '{', '}', '[', ']', '(', ')', '"', '\\', '#', '@', '&', '~', '^', '$',
];

/// Quote `text` so it matches itself inside a regular expression.
#[must_use]
pub fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            // `\<` and `\>` are word boundaries in some dialects.
            '<' | '>' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            c if REGEX_SPECIAL.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Walks an AST and emits a backend query, resolving fields against the
/// mappings of the target resources.
pub struct QueryBuilder<'a, E: QueryEmitter> {
    emitter: &'a E,
    mappings: &'a [Arc<FieldMapping>],
}

impl<'a, E: QueryEmitter> QueryBuilder<'a, E> {
    #[must_use]
    pub fn new(emitter: &'a E, mappings: &'a [Arc<FieldMapping>]) -> Self {
        Self { emitter, mappings }
    }

    /// Compile `root` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnsupportedField`] for fields none of the
    /// resources define and [`QueryError::UnsupportedQuery`] for operations
    /// the field's type cannot support, and for hand-built nodes that are
    /// missing operands.
    pub fn walk(&self, root: &Node) -> Result<E::Fragment, QueryError> {
        let op = root
            .operator_kind()
            .ok_or_else(|| QueryError::unsupported(format!("expected an operator, found {}", literal_text(root))))?;
        if !root.is_complete() {
            return Err(QueryError::unsupported(format!(
                "'{op}' has {} of its {} operands",
                root.children().count(),
                root.arity()
            )));
        }
        let args: Vec<&Node> = root.children().collect();
        let e = self.emitter;

        match op {
            Operator::And => self.fold(&args, E::and),
            Operator::Or => self.fold(&args, E::or),
            Operator::Not => Ok(e.not(self.walk(args[0])?)),
            Operator::Equals => self.equals(args[0], args[1]),
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
                let path = self.exact(op, args[0])?;
                let value = escape_regex(&literal_text(args[1]));
                let pattern = match op {
                    Operator::Contains => format!(".*{value}.*"),
                    Operator::StartsWith => format!("{value}.*"),
                    _ => format!(".*{value}"),
                };
                Ok(e.regexp(path, &pattern))
            }
            Operator::Regexp if args.len() == 1 => Ok(e.regexp_all_fields(&literal_text(args[0]))),
            Operator::Regexp => {
                let field = self.textual(op, args[0])?;
                Ok(e.regexp(&field.path, &literal_text(args[1])))
            }
            Operator::FreeRegexp => Ok(e.regexp_all_fields(&literal_text(args[0]))),
            Operator::FreeText => Ok(e.fuzzy(&literal_text(args[0]))),
            Operator::Exists => Ok(e.exists(&self.resolve(args[0])?.path)),
            Operator::Missing => Ok(e.not(e.exists(&self.resolve(args[0])?.path))),
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                let field = self.numeric(op, args[0])?;
                let bound = Some(number(op, args[1])?);
                let bounds = match op {
                    Operator::Lt => RangeBounds { lt: bound, ..RangeBounds::default() },
                    Operator::Lte => RangeBounds { lte: bound, ..RangeBounds::default() },
                    Operator::Gt => RangeBounds { gt: bound, ..RangeBounds::default() },
                    _ => RangeBounds { gte: bound, ..RangeBounds::default() },
                };
                Ok(e.range(&field.path, bounds))
            }
            Operator::Range => {
                let field = self.numeric(op, args[0])?;
                let bounds = RangeBounds {
                    gte: Some(number(op, args[1])?),
                    lte: Some(number(op, args[2])?),
                    ..RangeBounds::default()
                };
                Ok(e.range(&field.path, bounds))
            }
        }
    }

    /// Combine the operands of an `and`/`or` left to right.
    fn fold(
        &self,
        args: &[&Node],
        combine: impl Fn(&E, E::Fragment, E::Fragment) -> E::Fragment,
    ) -> Result<E::Fragment, QueryError> {
        let mut operands = args.iter().map(|arg| self.walk(arg));
        let first = operands
            .next()
            .ok_or_else(|| QueryError::unsupported("boolean operator without operands"))??;
        operands.try_fold(first, |acc, next| Ok(combine(self.emitter, acc, next?)))
    }

    fn equals(&self, field: &Node, value: &Node) -> Result<E::Fragment, QueryError> {
        let field = self.resolve(field)?;
        let e = self.emitter;
        let mismatch = |expected: &str| {
            QueryError::unsupported(format!(
                "'equals' on {expected} field '{}' cannot match {}",
                field.path,
                literal_display(value)
            ))
        };

        match field.kind {
            FieldKind::Text => Ok(e.match_all_terms(&field.path, &literal_text(value))),
            FieldKind::Keyword => Ok(e.term(&field.path, Scalar::Text(literal_text(value)))),
            FieldKind::Long => match value.as_literal() {
                Some(Literal::Int(n)) => Ok(e.term(&field.path, Scalar::Int(*n))),
                _ => Err(mismatch("integer")),
            },
            FieldKind::Double => match value.as_literal() {
                Some(Literal::Int(n)) => Ok(e.term(&field.path, Scalar::Int(*n))),
                Some(Literal::Float(x)) => Ok(e.term(&field.path, Scalar::Float(*x))),
                _ => Err(mismatch("number")),
            },
            FieldKind::Boolean => match literal_text(value).as_str() {
                "true" => Ok(e.term(&field.path, Scalar::Bool(true))),
                "false" => Ok(e.term(&field.path, Scalar::Bool(false))),
                _ => Err(mismatch("boolean")),
            },
            FieldKind::Object => Err(QueryError::unsupported(format!(
                "'equals' is not supported on object field '{}'",
                field.path
            ))),
        }
    }

    /// The first mapping that defines `field` wins.
    fn resolve(&self, field: &Node) -> Result<&'a MappedField, QueryError> {
        self.resolve_in(field).map(|(_, field)| field)
    }

    fn resolve_in(&self, field: &Node) -> Result<(&'a FieldMapping, &'a MappedField), QueryError> {
        let name = literal_text(field);
        self.mappings
            .iter()
            .find_map(|mapping| mapping.field(&name).map(|field| (&**mapping, field)))
            .ok_or_else(|| {
                let resources: Vec<&str> = self.mappings.iter().map(|m| m.resource_id()).collect();
                QueryError::unsupported_field(name, resources.join(","))
            })
    }

    /// The unanalyzed backend field of a text field, for substring matching.
    fn exact(&self, op: Operator, field: &Node) -> Result<&'a str, QueryError> {
        let (mapping, field) = self.resolve_in(field)?;
        require_textual(op, field)?;
        field
            .exact_path()
            .ok_or_else(|| QueryError::unsupported_field(&field.path, mapping.resource_id()))
    }

    fn textual(&self, op: Operator, field: &Node) -> Result<&'a MappedField, QueryError> {
        let field = self.resolve(field)?;
        require_textual(op, field)?;
        Ok(field)
    }

    fn numeric(&self, op: Operator, field: &Node) -> Result<&'a MappedField, QueryError> {
        let field = self.resolve(field)?;
        if field.is_numeric() {
            Ok(field)
        } else {
            Err(QueryError::unsupported(format!(
                "'{op}' needs a numeric field, '{}' is not one",
                field.path
            )))
        }
    }
}

fn require_textual(op: Operator, field: &MappedField) -> Result<(), QueryError> {
    if field.is_textual() {
        Ok(())
    } else {
        Err(QueryError::unsupported(format!(
            "'{op}' needs a text field, '{}' is not one",
            field.path
        )))
    }
}

fn number(op: Operator, node: &Node) -> Result<Scalar, QueryError> {
    match node.as_literal() {
        Some(Literal::Int(n)) => Ok(Scalar::Int(*n)),
        Some(Literal::Float(x)) => Ok(Scalar::Float(*x)),
        _ => Err(QueryError::unsupported(format!(
            "'{op}' needs a numeric bound, got {}",
            literal_display(node)
        ))),
    }
}

/// Text of an argument node as written in the query.
fn literal_text(node: &Node) -> String {
    match node.kind() {
        NodeKind::Literal(_) => node.text().unwrap_or_default(),
        NodeKind::Op(op) => op.name().to_string(),
    }
}

fn literal_display(node: &Node) -> String {
    match node.kind() {
        NodeKind::Literal(literal) => literal.to_string(),
        NodeKind::Op(op) => format!("operator '{op}'"),
    }
}
