use karp_index::{Filter, RangeBounds, Scalar};

use super::QueryEmitter;

/// Emits [`Filter`] trees for the in-memory index.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterEmitter;

impl FilterEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Merge two operands into one flat list, reusing the left one's list when it
/// already is the same connective.
fn flatten(lhs: Filter, rhs: Filter, conjunction: bool) -> Vec<Filter> {
    let mut operands = match (lhs, conjunction) {
        (Filter::And(inner), true) | (Filter::Or(inner), false) => inner,
        (other, _) => vec![other],
    };
    match (rhs, conjunction) {
        (Filter::And(inner), true) | (Filter::Or(inner), false) => operands.extend(inner),
        (other, _) => operands.push(other),
    }
    operands
}

impl QueryEmitter for FilterEmitter {
    type Fragment = Filter;

    fn match_all(&self) -> Filter {
        Filter::MatchAll
    }

    fn and(&self, lhs: Filter, rhs: Filter) -> Filter {
        Filter::And(flatten(lhs, rhs, true))
    }

    fn or(&self, lhs: Filter, rhs: Filter) -> Filter {
        Filter::Or(flatten(lhs, rhs, false))
    }

    fn not(&self, inner: Filter) -> Filter {
        match inner {
            Filter::Not(negated) => *negated,
            other => Filter::Not(Box::new(other)),
        }
    }

    fn match_all_terms(&self, field: &str, query: &str) -> Filter {
        Filter::Match {
            field: field.to_string(),
            query: query.to_string(),
        }
    }

    fn term(&self, field: &str, value: Scalar) -> Filter {
        Filter::Term {
            field: field.to_string(),
            value,
        }
    }

    fn regexp(&self, field: &str, pattern: &str) -> Filter {
        Filter::Regexp {
            field: field.to_string(),
            pattern: pattern.to_string(),
        }
    }

    fn regexp_all_fields(&self, pattern: &str) -> Filter {
        Filter::RegexpAllFields {
            pattern: pattern.to_string(),
        }
    }

    fn fuzzy(&self, query: &str) -> Filter {
        Filter::Fuzzy {
            query: query.to_string(),
        }
    }

    fn exists(&self, field: &str) -> Filter {
        Filter::Exists {
            field: field.to_string(),
        }
    }

    fn range(&self, field: &str, bounds: RangeBounds) -> Filter {
        Filter::Range {
            field: field.to_string(),
            bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exists(field: &str) -> Filter {
        FilterEmitter.exists(field)
    }

    #[test]
    fn conjunctions_flatten() {
        let e = FilterEmitter;
        let filter = e.and(e.and(exists("a"), exists("b")), e.and(exists("c"), exists("d")));
        assert_eq!(
            filter,
            Filter::And(vec![exists("a"), exists("b"), exists("c"), exists("d")])
        );
    }

    #[test]
    fn mixed_connectives_stay_nested() {
        let e = FilterEmitter;
        let filter = e.or(e.and(exists("a"), exists("b")), exists("c"));
        assert_eq!(
            filter,
            Filter::Or(vec![Filter::And(vec![exists("a"), exists("b")]), exists("c")])
        );
    }

    #[test]
    fn double_negation_cancels() {
        let e = FilterEmitter;
        assert_eq!(e.not(e.not(exists("a"))), exists("a"));
    }
}
