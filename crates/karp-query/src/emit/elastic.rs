//! Elasticsearch query DSL emitter.

use serde_json::{json, Value};

use karp_index::{RangeBounds, Scalar};

use super::QueryEmitter;

/// Emits Elasticsearch query DSL as [`serde_json::Value`].
///
/// Boolean fragments are kept flat: `and` of `and`s produces one `must`
/// list, `or` of `or`s one `should` list, and `not(not(x))` is `x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElasticEmitter;

impl ElasticEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// The clause list of a `bool` query that has nothing but `occur`.
fn sole_clauses<'a>(fragment: &'a Value, occur: &str) -> Option<&'a Vec<Value>> {
    let bool_query = fragment.get("bool")?.as_object()?;
    if bool_query.len() != 1 {
        return None;
    }
    bool_query.get(occur)?.as_array()
}

/// Move the clause list out of a `bool` query that has nothing but `occur`.
fn take_clauses(fragment: &mut Value, occur: &str) -> Option<Vec<Value>> {
    sole_clauses(fragment, occur)?;
    match fragment.get_mut("bool")?.get_mut(occur)?.take() {
        Value::Array(clauses) => Some(clauses),
        _ => None,
    }
}

/// Left operands grow in place, so folding a long chain stays linear.
fn combine(occur: &str, mut lhs: Value, mut rhs: Value) -> Value {
    let mut clauses = take_clauses(&mut lhs, occur).unwrap_or_else(|| vec![lhs]);
    match take_clauses(&mut rhs, occur) {
        Some(inner) => clauses.extend(inner),
        None => clauses.push(rhs),
    }
    json!({ "bool": { occur: clauses } })
}

impl QueryEmitter for ElasticEmitter {
    type Fragment = Value;

    fn match_all(&self) -> Value {
        json!({ "match_all": {} })
    }

    fn and(&self, lhs: Value, rhs: Value) -> Value {
        combine("must", lhs, rhs)
    }

    fn or(&self, lhs: Value, rhs: Value) -> Value {
        combine("should", lhs, rhs)
    }

    fn not(&self, inner: Value) -> Value {
        if let Some([negated]) = sole_clauses(&inner, "must_not").map(Vec::as_slice) {
            return negated.clone();
        }
        json!({ "bool": { "must_not": [inner] } })
    }

    fn match_all_terms(&self, field: &str, query: &str) -> Value {
        json!({ "match": { field: { "query": query, "operator": "and" } } })
    }

    fn term(&self, field: &str, value: Scalar) -> Value {
        json!({ "term": { field: Value::from(value) } })
    }

    fn regexp(&self, field: &str, pattern: &str) -> Value {
        json!({ "regexp": { field: pattern } })
    }

    fn regexp_all_fields(&self, pattern: &str) -> Value {
        // query_string delimits regular expressions with slashes.
        let delimited = format!("/{}/", pattern.replace('/', "\\/"));
        json!({ "query_string": { "query": delimited, "default_field": "*" } })
    }

    fn fuzzy(&self, query: &str) -> Value {
        json!({ "multi_match": { "query": query, "fuzziness": 1 } })
    }

    fn exists(&self, field: &str) -> Value {
        json!({ "exists": { "field": field } })
    }

    fn range(&self, field: &str, bounds: RangeBounds) -> Value {
        let bounds = serde_json::to_value(bounds).unwrap_or_else(|_| json!({}));
        json!({ "range": { field: bounds } })
    }
}
