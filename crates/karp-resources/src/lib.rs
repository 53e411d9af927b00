//! # karp-resources
//!
//! Resource configurations live as one file per resource in a directory
//! (`<id>.json`, `<id>.yaml` or `<id>.yml`). That directory is the source of
//! truth; the [`MappingCache`] is derived from it and kept current by
//! feeding it [`ConfigEvent`]s from the [`ConfigWatcher`].

pub mod watcher;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use karp_core::error::{ConfigError, KarpError};
use karp_core::resource::ResourceConfig;
use karp_index::MappingCache;

pub use watcher::{ConfigEvent, ConfigWatcher};

/// File extensions recognized as resource configurations.
pub const CONFIG_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Whether `path` looks like a resource configuration file.
#[must_use]
pub fn is_config_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext))
}

/// Read, parse and validate a single configuration file.
///
/// # Errors
///
/// Returns [`KarpError::Io`] if the file cannot be read and
/// [`KarpError::Config`] if it is not a valid configuration.
pub fn load_file(path: &Path) -> Result<ResourceConfig, KarpError> {
    let text = std::fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => ResourceConfig::from_json(&text),
        Some("yaml" | "yml") => ResourceConfig::from_yaml(&text),
        _ => Err(ConfigError::Parse(format!(
            "{}: not a resource configuration file",
            path.display()
        ))),
    }?;
    config.validate()?;
    Ok(config)
}

/// Load every valid configuration in `dir`, sorted by resource id.
///
/// Invalid files are logged and skipped so one broken resource does not take
/// the others down.
///
/// # Errors
///
/// Returns [`KarpError::Io`] if the directory cannot be read.
pub fn load_dir(dir: &Path) -> Result<Vec<ResourceConfig>, KarpError> {
    Ok(scan(dir)?.into_iter().map(|(_, config)| config).collect())
}

fn scan(dir: &Path) -> Result<Vec<(PathBuf, ResourceConfig)>, KarpError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_config_file(path))
        .collect();
    paths.sort();

    let mut configs = Vec::with_capacity(paths.len());
    for path in paths {
        match load_file(&path) {
            Ok(config) => configs.push((path, config)),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid resource config"),
        }
    }
    configs.sort_by(|a, b| a.1.resource_id.cmp(&b.1.resource_id));
    Ok(configs)
}

/// Keeps a [`MappingCache`] in sync with a configuration directory.
pub struct ResourceRegistry {
    dir: PathBuf,
    cache: Arc<MappingCache>,
    /// Which resource each file defined when it was last loaded.
    files: HashMap<PathBuf, String>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, cache: Arc<MappingCache>) -> Self {
        Self {
            dir: dir.into(),
            cache,
            files: HashMap::new(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<MappingCache> {
        &self.cache
    }

    /// Load the whole directory into the cache. Returns the number of
    /// resources loaded.
    ///
    /// # Errors
    ///
    /// Returns [`KarpError::Io`] if the directory cannot be read.
    pub fn load(&mut self) -> Result<usize, KarpError> {
        let configs = scan(&self.dir)?;
        let count = configs.len();
        for (path, config) in configs {
            self.files.insert(path, config.resource_id.clone());
            self.cache.upsert(config);
        }
        info!(dir = %self.dir.display(), resources = count, "resource configs loaded");
        Ok(count)
    }

    /// Apply a watcher event to the cache. Returns `true` if the cache changed.
    pub fn apply(&mut self, event: &ConfigEvent) -> bool {
        match event {
            ConfigEvent::Changed(path) => match load_file(path) {
                Ok(config) => {
                    let id = config.resource_id.clone();
                    let previous = self.files.insert(path.clone(), id.clone());
                    // A file that was renamed to another resource id drops the old one.
                    let dropped = previous.is_some_and(|old| old != id && self.release(&old));
                    self.cache.upsert(config) || dropped
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring invalid resource config");
                    false
                }
            },
            ConfigEvent::Removed(path) => self.files.remove(path).is_some_and(|id| self.release(&id)),
        }
    }

    /// A file no longer defines `id`. The resource stays if another file
    /// still defines it, reloaded from that file; otherwise it is evicted.
    fn release(&self, id: &str) -> bool {
        let mut others: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, defined)| defined.as_str() == id)
            .map(|(path, _)| path.clone())
            .collect();
        others.sort();

        for path in others.into_iter().rev() {
            match load_file(&path) {
                Ok(config) if config.resource_id == id => {
                    info!(resource = id, path = %path.display(), "resource still defined elsewhere");
                    return self.cache.upsert(config);
                }
                // Its own watcher event will bring the cache up to date.
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "cannot reload resource config"),
            }
        }
        self.cache.remove(id)
    }
}
