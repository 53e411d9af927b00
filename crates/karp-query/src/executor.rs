//! Query executor: runs compiled queries against an index.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use karp_core::entry::Entry;
use karp_core::error::{KarpError, QueryError};
use karp_index::{EntryView, FieldMapping, Filter, MappingSource, MemoryIndex};

use crate::compiler::{CompiledQuery, SortKey, SortOrder, StatisticsQuery};
use crate::formatter::{FieldValueCount, Hit, Hits, QueryResult};

/// Something that can run compiled searches.
pub trait SearchExecutor {
    /// Run a search.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource is unknown or the query cannot be
    /// evaluated.
    fn execute(&self, query: &CompiledQuery<Filter>) -> Result<QueryResult, KarpError>;

    /// Count the distinct values of a field.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is unknown.
    fn statistics(&self, query: &StatisticsQuery) -> Result<Vec<FieldValueCount>, KarpError>;
}

impl SearchExecutor for MemoryIndex {
    fn execute(&self, query: &CompiledQuery<Filter>) -> Result<QueryResult, KarpError> {
        let filter = query.query.prepare()?;

        let mut groups: Vec<(String, Vec<&Entry>)> = Vec::with_capacity(query.resources.len());
        for resource in &query.resources {
            let mut hits = self.search(resource, &filter)?;
            let mapping = self.mapping(resource)?;
            sort_entries(&mut hits, &query.sort, &mapping);
            groups.push((resource.clone(), hits));
        }

        let total = groups.iter().map(|(_, hits)| hits.len()).sum();
        let distribution = query
            .lexicon_stats
            .then(|| groups.iter().map(|(r, hits)| (r.clone(), hits.len())).collect());

        let hits = if query.split_results {
            Hits::Split(
                groups
                    .into_iter()
                    .map(|(resource, hits)| (resource, page(&hits, query.from, query.size)))
                    .collect(),
            )
        } else {
            let mappings = query
                .resources
                .iter()
                .map(|r| self.mapping(r).map(|m| (r.clone(), m)))
                .collect::<Result<BTreeMap<_, _>, QueryError>>()?;
            let mut merged: Vec<&Entry> = groups.into_iter().flat_map(|(_, hits)| hits).collect();
            merged.sort_by(|a, b| {
                let (ma, mb) = (&mappings[&a.resource_id], &mappings[&b.resource_id]);
                compare_entries(a, ma, b, mb, &query.sort)
            });
            Hits::Flat(page(&merged, query.from, query.size))
        };

        debug!(total, resources = ?query.resources, "executed query");
        Ok(QueryResult {
            hits,
            total,
            distribution,
        })
    }

    fn statistics(&self, query: &StatisticsQuery) -> Result<Vec<FieldValueCount>, KarpError> {
        Ok(self
            .value_counts(&query.resource, &query.field)?
            .into_iter()
            .map(|(value, count)| FieldValueCount { value, count })
            .collect())
    }
}

fn page(entries: &[&Entry], from: usize, size: usize) -> Vec<Hit> {
    entries.iter().skip(from).take(size).map(|e| Hit::from(*e)).collect()
}

fn sort_entries(entries: &mut [&Entry], keys: &[SortKey], mapping: &FieldMapping) {
    entries.sort_by(|a, b| compare_entries(a, mapping, b, mapping, keys));
}

/// Order by each sort key in turn, then by resource and id so results are
/// deterministic.
fn compare_entries(a: &Entry, ma: &FieldMapping, b: &Entry, mb: &FieldMapping, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let va = sort_value(a, ma, key);
        let vb = sort_value(b, mb, key);
        let ordering = match (va, vb) {
            (Some(x), Some(y)) => {
                let ord = x.compare(&y);
                match key.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            }
            // Entries without a value go last in either direction.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.resource_id.cmp(&b.resource_id).then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SortValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Number(_) => 1,
            Self::Text(_) => 2,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Collections sort by their smallest value ascending and by their largest
/// value descending.
fn sort_value(entry: &Entry, mapping: &FieldMapping, key: &SortKey) -> Option<SortValue> {
    let source = mapping.backend(&key.backend)?.source.clone();
    let values = EntryView::new(entry, mapping).values(&source);
    let candidates = values.iter().filter_map(SortValue::from_json);
    match key.order {
        SortOrder::Asc => candidates.min_by(SortValue::compare),
        SortOrder::Desc => candidates.max_by(SortValue::compare),
    }
}
