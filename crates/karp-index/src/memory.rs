//! In-memory index: one entry table per resource, searched with [`Filter`]s.
//!
//! This is the reference executor backend used by the CLI and the test
//! suites. It evaluates the same query shapes an Elasticsearch index would,
//! without any network round trip.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use karp_core::entry::Entry;
use karp_core::error::{KarpError, QueryError};
use karp_core::resource::ResourceConfig;

use crate::cache::MappingSource;
use crate::filter::{EntryView, PreparedFilter};
use crate::mapping::FieldMapping;

struct ResourceIndex {
    mapping: Arc<FieldMapping>,
    entries: BTreeMap<String, Entry>,
}

/// All indexed resources and their entries.
#[derive(Default)]
pub struct MemoryIndex {
    resources: BTreeMap<String, ResourceIndex>,
}

impl MemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or re-create) the index of a resource. Entries already stored
    /// for that resource are kept and searched with the new mapping.
    ///
    /// # Errors
    ///
    /// Returns [`KarpError::Config`] if the configuration is invalid.
    pub fn create_index(&mut self, config: &ResourceConfig) -> Result<(), KarpError> {
        config.validate()?;
        let mapping = Arc::new(FieldMapping::from_config(config));
        match self.resources.get_mut(&config.resource_id) {
            Some(index) => index.mapping = mapping,
            None => {
                self.resources.insert(
                    config.resource_id.clone(),
                    ResourceIndex {
                        mapping,
                        entries: BTreeMap::new(),
                    },
                );
            }
        }
        info!(resource = %config.resource_id, "index created");
        Ok(())
    }

    /// Drop a resource index with all its entries.
    pub fn delete_index(&mut self, resource_id: &str) -> bool {
        self.resources.remove(resource_id).is_some()
    }

    /// Index an entry, replacing any entry with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`KarpError::Index`] if the entry's resource has no index.
    pub fn add_entry(&mut self, entry: Entry) -> Result<(), KarpError> {
        let index = self
            .resources
            .get_mut(&entry.resource_id)
            .ok_or_else(|| KarpError::Index(format!("no index for resource '{}'", entry.resource_id)))?;
        debug!(resource = %entry.resource_id, id = %entry.id, "indexing entry");
        index.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    /// Index many entries; stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`KarpError::Index`] if any entry's resource has no index.
    pub fn add_entries(&mut self, entries: impl IntoIterator<Item = Entry>) -> Result<usize, KarpError> {
        let mut count = 0;
        for entry in entries {
            self.add_entry(entry)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn remove_entry(&mut self, resource_id: &str, id: &str) -> Option<Entry> {
        self.resources.get_mut(resource_id)?.entries.remove(id)
    }

    /// Entries of a resource in id order. Unknown resources have none.
    pub fn entries(&self, resource_id: &str) -> impl Iterator<Item = &Entry> {
        self.resources
            .get(resource_id)
            .into_iter()
            .flat_map(|index| index.entries.values())
    }

    #[must_use]
    pub fn count(&self, resource_id: &str) -> usize {
        self.resources.get(resource_id).map_or(0, |index| index.entries.len())
    }

    #[must_use]
    pub fn resource_ids(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    /// Entries of `resource_id` matching `filter`, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownResource`] if the resource has no index.
    pub fn search(&self, resource_id: &str, filter: &PreparedFilter) -> Result<Vec<&Entry>, QueryError> {
        let index = self.index(resource_id)?;
        Ok(index
            .entries
            .values()
            .filter(|entry| filter.matches(entry, &index.mapping))
            .collect())
    }

    /// Number of entries holding each distinct value of a logical field,
    /// most frequent first. Ties are ordered by value.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownResource`] if the resource has no index.
    pub fn value_counts(&self, resource_id: &str, field: &str) -> Result<Vec<(String, usize)>, QueryError> {
        let index = self.index(resource_id)?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in index.entries.values() {
            let view = EntryView::new(entry, &index.mapping);
            let distinct: HashSet<String> = view
                .values(field)
                .into_iter()
                .filter_map(|value| match value {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    serde_json::Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect();
            for value in distinct {
                *counts.entry(value).or_default() += 1;
            }
        }
        let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }

    fn index(&self, resource_id: &str) -> Result<&ResourceIndex, QueryError> {
        self.resources
            .get(resource_id)
            .ok_or_else(|| QueryError::UnknownResource(resource_id.to_string()))
    }
}

impl MappingSource for MemoryIndex {
    fn mapping(&self, resource_id: &str) -> Result<Arc<FieldMapping>, QueryError> {
        self.index(resource_id).map(|index| Arc::clone(&index.mapping))
    }
}
