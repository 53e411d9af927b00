//! Entry type: a versioned lexical entry as seen by the search layer.

use serde::{Deserialize, Serialize};

/// A single entry of a resource. The `entry` body is free-form JSON shaped
/// by the resource configuration; the remaining fields are system metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(alias = "resource")]
    pub resource_id: String,
    #[serde(default = "default_version")]
    pub version: u64,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub last_modified: f64,
    #[serde(default)]
    pub last_modified_by: String,
    pub entry: serde_json::Value,
}

fn default_version() -> u64 {
    1
}

impl Entry {
    pub fn new(id: impl Into<String>, resource_id: impl Into<String>, entry: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            resource_id: resource_id.into(),
            version: default_version(),
            last_modified: 0.0,
            last_modified_by: String::new(),
            entry,
        }
    }

    /// The value of a system field (`_id`, `_entry_version`, ...), if `name` is one.
    #[must_use]
    pub fn system_field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "_id" => Some(self.id.clone().into()),
            "_entry_version" => Some(self.version.into()),
            "_last_modified" => Some(self.last_modified.into()),
            "_last_modified_by" => Some(self.last_modified_by.clone().into()),
            _ => None,
        }
    }
}
