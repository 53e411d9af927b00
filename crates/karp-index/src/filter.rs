//! Backend-neutral filter tree and its evaluation against entries.
//!
//! A [`Filter`] names backend paths (`baseform`, `baseform.raw`) the same way
//! an Elasticsearch query does. Evaluation resolves each backend path
//! through the entry's [`FieldMapping`], so `name.raw` reads the unanalyzed
//! `name` value and `name` reads its tokens.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use karp_core::entry::Entry;
use karp_core::error::QueryError;

use crate::mapping::{FieldKind, FieldMapping};

/// A literal value inside a filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(n) => Value::from(n),
            Scalar::Float(x) => Value::from(x),
            Scalar::Text(s) => Value::String(s),
        }
    }
}

/// Range bounds; any combination may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RangeBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<Scalar>,
}

impl RangeBounds {
    fn admits(&self, value: &Value) -> bool {
        let check = |bound: &Option<Scalar>, ok: fn(Ordering) -> bool| {
            bound
                .as_ref()
                .map_or(true, |b| compare(value, b).is_some_and(ok))
        };
        check(&self.gt, Ordering::is_gt)
            && check(&self.gte, Ordering::is_ge)
            && check(&self.lt, Ordering::is_lt)
            && check(&self.lte, Ordering::is_le)
    }
}

/// A backend-neutral query tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    MatchAll,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Analyzed match requiring every term of `query`.
    Match { field: String, query: String },
    /// Exact equality.
    Term { field: String, value: Scalar },
    /// Anchored regular expression.
    Regexp { field: String, pattern: String },
    RegexpAllFields { pattern: String },
    /// Edit-distance tolerant match across all text fields.
    Fuzzy { query: String },
    Exists { field: String },
    Range { field: String, bounds: RangeBounds },
}

impl Filter {
    /// Compile the regular expressions of this tree.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnsupportedQuery`] if a pattern is not a valid
    /// regular expression.
    pub fn prepare(&self) -> Result<PreparedFilter, QueryError> {
        Ok(PreparedFilter(Prepared::from_filter(self)?))
    }
}

/// A [`Filter`] ready to be evaluated.
#[derive(Debug, Clone)]
pub struct PreparedFilter(Prepared);

#[derive(Debug, Clone)]
enum Prepared {
    MatchAll,
    And(Vec<Prepared>),
    Or(Vec<Prepared>),
    Not(Box<Prepared>),
    Match { field: String, query: String, terms: Vec<String> },
    Term { field: String, value: Scalar },
    Regexp { field: String, regex: Regex },
    RegexpAllFields { regex: Regex },
    Fuzzy { query: String, terms: Vec<String> },
    Exists { field: String },
    Range { field: String, bounds: RangeBounds },
}

impl Prepared {
    fn from_filter(filter: &Filter) -> Result<Self, QueryError> {
        let all = |filters: &[Filter]| filters.iter().map(Self::from_filter).collect::<Result<Vec<_>, _>>();
        Ok(match filter {
            Filter::MatchAll => Self::MatchAll,
            Filter::And(filters) => Self::And(all(filters)?),
            Filter::Or(filters) => Self::Or(all(filters)?),
            Filter::Not(inner) => Self::Not(Box::new(Self::from_filter(inner)?)),
            Filter::Match { field, query } => Self::Match {
                field: field.clone(),
                query: query.clone(),
                terms: tokenize(query),
            },
            Filter::Term { field, value } => Self::Term {
                field: field.clone(),
                value: value.clone(),
            },
            Filter::Regexp { field, pattern } => Self::Regexp {
                field: field.clone(),
                regex: anchored(pattern)?,
            },
            Filter::RegexpAllFields { pattern } => Self::RegexpAllFields {
                regex: anchored(pattern)?,
            },
            Filter::Fuzzy { query } => Self::Fuzzy {
                query: query.clone(),
                terms: tokenize(query),
            },
            Filter::Exists { field } => Self::Exists { field: field.clone() },
            Filter::Range { field, bounds } => Self::Range {
                field: field.clone(),
                bounds: bounds.clone(),
            },
        })
    }

    fn matches(&self, entry: &EntryView<'_>) -> bool {
        match self {
            Self::MatchAll => true,
            Self::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
            Self::Match { field, query, terms } => {
                let Some((values, analyzed)) = entry.backend_values(field) else {
                    return false;
                };
                if !analyzed {
                    return values.iter().any(|v| text_of(v).is_some_and(|t| t == *query));
                }
                let tokens: Vec<String> = values.iter().filter_map(text_of).flat_map(|t| tokenize(&t)).collect();
                !terms.is_empty() && terms.iter().all(|term| tokens.contains(term))
            }
            Self::Term { field, value } => entry
                .backend_values(field)
                .is_some_and(|(values, _)| values.iter().any(|v| compare(v, value) == Some(Ordering::Equal))),
            Self::Regexp { field, regex } => entry
                .backend_values(field)
                .is_some_and(|(values, analyzed)| any_matches(&values, analyzed, regex)),
            Self::RegexpAllFields { regex } => entry.text_fields().any(|(values, analyzed)| any_matches(&values, analyzed, regex)),
            Self::Fuzzy { query, terms } => entry.text_fields().any(|(values, analyzed)| {
                if analyzed {
                    values
                        .iter()
                        .filter_map(text_of)
                        .flat_map(|t| tokenize(&t))
                        .any(|token| terms.iter().any(|term| within_one_edit(term, &token)))
                } else {
                    values
                        .iter()
                        .filter_map(text_of)
                        .any(|text| !text.is_empty() && within_one_edit(query, &text))
                }
            }),
            Self::Exists { field } => entry.backend_values(field).is_some_and(|(values, _)| !values.is_empty()),
            Self::Range { field, bounds } => entry
                .backend_values(field)
                .is_some_and(|(values, _)| values.iter().any(|v| bounds.admits(v))),
        }
    }
}

impl PreparedFilter {
    /// Whether `entry`, laid out by `mapping`, satisfies this filter.
    #[must_use]
    pub fn matches(&self, entry: &Entry, mapping: &FieldMapping) -> bool {
        self.0.matches(&EntryView { entry, mapping })
    }
}

/// An entry read through its resource's field mapping.
pub struct EntryView<'a> {
    entry: &'a Entry,
    mapping: &'a FieldMapping,
}

impl<'a> EntryView<'a> {
    #[must_use]
    pub fn new(entry: &'a Entry, mapping: &'a FieldMapping) -> Self {
        Self { entry, mapping }
    }

    /// All non-null scalar and object values at a logical path. Arrays are
    /// flattened at every level, so `senses.id` collects the ids of every sense.
    #[must_use]
    pub fn values(&self, path: &str) -> Vec<Value> {
        if let Some(value) = self.entry.system_field(path) {
            return vec![value];
        }
        let mut current: Vec<&Value> = vec![&self.entry.entry];
        for segment in path.split('.') {
            current = current
                .into_iter()
                .filter_map(|v| v.get(segment))
                .flat_map(flatten)
                .collect();
        }
        current.into_iter().filter(|v| !v.is_null()).cloned().collect()
    }

    /// Values behind a backend path plus whether that path is analyzed.
    /// `None` if this resource has no such backend field.
    fn backend_values(&self, backend_path: &str) -> Option<(Vec<Value>, bool)> {
        let backend = self.mapping.backend(backend_path)?;
        Some((self.values(&backend.source), backend.analyzed))
    }

    /// Values of every textual backend field: analyzed text fields and their
    /// raw sub-fields, plus keyword fields.
    fn text_fields(&self) -> impl Iterator<Item = (Vec<Value>, bool)> + '_ {
        self.mapping
            .fields()
            .filter(|field| field.is_textual())
            .flat_map(move |field| {
                let values = self.values(&field.path);
                let mut views = Vec::with_capacity(2);
                if field.kind == FieldKind::Text {
                    views.push((values.clone(), true));
                }
                if field.kind == FieldKind::Keyword || field.raw.is_some() {
                    views.push((values, false));
                }
                views
            })
    }
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(flatten).collect(),
        other => vec![other],
    }
}

/// Lowercase and split on anything that is not alphanumeric.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn any_matches(values: &[Value], analyzed: bool, regex: &Regex) -> bool {
    values.iter().filter_map(text_of).any(|text| {
        if analyzed {
            tokenize(&text).iter().any(|token| regex.is_match(token))
        } else {
            regex.is_match(&text)
        }
    })
}

fn within_one_edit(a: &str, b: &str) -> bool {
    strsim::osa_distance(a, b) <= 1
}

fn anchored(pattern: &str) -> Result<Regex, QueryError> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| QueryError::unsupported(format!("invalid regular expression '{pattern}': {e}")))
}

/// Compare a stored value with a filter literal. Numbers compare numerically,
/// strings lexically, booleans by value; mixed kinds are incomparable.
fn compare(value: &Value, scalar: &Scalar) -> Option<Ordering> {
    match (value, scalar) {
        (Value::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Scalar::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Number(a), b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}
