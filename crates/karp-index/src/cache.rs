//! Per-resource mapping cache.
//!
//! Readers take a cheap `Arc` snapshot of a resource; writers replace the
//! whole entry. A compile that started before a config reload keeps using
//! the snapshot it took, so it never observes a half-updated mapping.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{debug, info};

use karp_core::error::QueryError;
use karp_core::resource::ResourceConfig;

use crate::mapping::FieldMapping;

/// Anything that can hand out the field mapping of a resource.
pub trait MappingSource: Send + Sync {
    /// Snapshot of the mapping for `resource_id`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownResource`] if the resource is not known.
    fn mapping(&self, resource_id: &str) -> Result<Arc<FieldMapping>, QueryError>;
}

struct CachedResource {
    config: ResourceConfig,
    fingerprint: String,
    mapping: OnceLock<Arc<FieldMapping>>,
}

impl CachedResource {
    fn new(config: ResourceConfig) -> Self {
        Self {
            fingerprint: config.fingerprint(),
            config,
            mapping: OnceLock::new(),
        }
    }

    fn mapping(&self) -> Arc<FieldMapping> {
        Arc::clone(
            self.mapping
                .get_or_init(|| Arc::new(FieldMapping::from_config(&self.config))),
        )
    }
}

/// Thread-safe cache of resource configurations and their lazily built mappings.
#[derive(Default)]
pub struct MappingCache {
    resources: RwLock<HashMap<String, Arc<CachedResource>>>,
}

impl MappingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a resource configuration.
    ///
    /// Returns `true` if the cache changed. Re-inserting an identical
    /// configuration keeps the already built mapping.
    pub fn upsert(&self, config: ResourceConfig) -> bool {
        let id = config.resource_id.clone();
        let fingerprint = config.fingerprint();
        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);

        if resources
            .get(&id)
            .is_some_and(|cached| cached.fingerprint == fingerprint)
        {
            debug!(resource = %id, "config unchanged, keeping cached mapping");
            return false;
        }

        let replaced = resources
            .insert(id.clone(), Arc::new(CachedResource::new(config)))
            .is_some();
        info!(resource = %id, replaced, "resource config cached");
        true
    }

    /// Drop a resource. Returns `true` if it was present.
    pub fn remove(&self, resource_id: &str) -> bool {
        let removed = self
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(resource_id)
            .is_some();
        if removed {
            info!(resource = %resource_id, "resource removed from cache");
        }
        removed
    }

    /// The configuration a resource was cached with.
    #[must_use]
    pub fn config(&self, resource_id: &str) -> Option<ResourceConfig> {
        self.get(resource_id).map(|cached| cached.config.clone())
    }

    /// Sorted ids of every cached resource.
    #[must_use]
    pub fn resource_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, resource_id: &str) -> Option<Arc<CachedResource>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource_id)
            .cloned()
    }
}

impl MappingSource for MappingCache {
    fn mapping(&self, resource_id: &str) -> Result<Arc<FieldMapping>, QueryError> {
        self.get(resource_id)
            .map(|cached| cached.mapping())
            .ok_or_else(|| QueryError::UnknownResource(resource_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karp_core::resource::{FieldConfig, FieldType};

    fn saldo() -> ResourceConfig {
        ResourceConfig::new("saldo").with_field("baseform", FieldConfig::new(FieldType::String))
    }

    #[test]
    fn unknown_resource_is_an_error() {
        let cache = MappingCache::new();
        assert_eq!(
            cache.mapping("nope").unwrap_err(),
            QueryError::UnknownResource("nope".to_string())
        );
    }

    #[test]
    fn mapping_is_built_once_and_shared() {
        let cache = MappingCache::new();
        assert!(cache.upsert(saldo()));
        let a = cache.mapping("saldo").unwrap();
        let b = cache.mapping("saldo").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.field("baseform").is_some());
    }

    #[test]
    fn identical_upsert_keeps_mapping() {
        let cache = MappingCache::new();
        cache.upsert(saldo());
        let before = cache.mapping("saldo").unwrap();
        assert!(!cache.upsert(saldo()));
        assert!(Arc::ptr_eq(&before, &cache.mapping("saldo").unwrap()));
    }

    #[test]
    fn changed_upsert_replaces_mapping_but_old_snapshot_survives() {
        let cache = MappingCache::new();
        cache.upsert(saldo());
        let old = cache.mapping("saldo").unwrap();

        let changed = saldo().with_field("pos", FieldConfig::new(FieldType::String));
        assert!(cache.upsert(changed));

        let new = cache.mapping("saldo").unwrap();
        assert!(new.field("pos").is_some());
        assert!(old.field("pos").is_none(), "earlier snapshot is unaffected");
    }

    #[test]
    fn remove_and_list() {
        let cache = MappingCache::new();
        cache.upsert(saldo());
        cache.upsert(ResourceConfig::new("places"));
        assert_eq!(cache.resource_ids(), vec!["places", "saldo"]);
        assert_eq!(cache.len(), 2);

        assert!(cache.remove("places"));
        assert!(!cache.remove("places"));
        assert!(cache.config("places").is_none());
        assert_eq!(cache.config("saldo").unwrap().resource_id, "saldo");
    }

    #[test]
    fn concurrent_readers_see_consistent_mappings() {
        let cache = Arc::new(MappingCache::new());
        cache.upsert(saldo());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for n in 0..50 {
                        if i == 0 {
                            let field = format!("f{n}");
                            cache.upsert(saldo().with_field(field, FieldConfig::new(FieldType::Integer)));
                        }
                        let mapping = cache.mapping("saldo").unwrap();
                        assert!(mapping.field("baseform").is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
