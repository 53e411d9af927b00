//! Resource configuration: the field schema of a lexical resource.
//!
//! A resource configuration is the JSON (or YAML) document that describes
//! which fields an entry of the resource has. The search layer reads it
//! to decide how each field is indexed, searched, and sorted.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// Fields every entry carries regardless of its resource configuration.
pub const SYSTEM_FIELDS: [&str; 4] = ["_id", "_entry_version", "_last_modified", "_last_modified_by"];

/// The configuration of a single resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldConfig>,
    /// Default sort order, used when a query on this resource gives none.
    #[serde(default, deserialize_with = "one_or_many")]
    pub sort: Vec<String>,
}

/// Definition of a single field in a resource configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub collection: bool,
    /// Sub-fields; only meaningful for `object` fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldConfig>,
}

/// Supported field types in resource configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Integer,
    Number,
    String,
    LongString,
    Object,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::LongString => "long_string",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

impl FieldConfig {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            collection: false,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field: FieldConfig) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

impl ResourceConfig {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_name: None,
            fields: BTreeMap::new(),
            sort: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field: FieldConfig) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, field: impl Into<String>) -> Self {
        self.sort.push(field.into());
        self
    }

    /// Parse a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid configuration.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Look up a (possibly dotted) field path.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&FieldConfig> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.fields.get(part)?;
        }
        Some(current)
    }

    /// Check the structural rules the search layer relies on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_id.trim().is_empty() {
            return Err(ConfigError::EmptyResourceId);
        }
        validate_fields(&self.fields, "")?;
        for field in &self.sort {
            if self.field(field).is_none() && !SYSTEM_FIELDS.contains(&field.as_str()) {
                return Err(ConfigError::UnknownSortField(field.clone()));
            }
        }
        Ok(())
    }

    /// SHA-256 of the canonical JSON form, hex encoded.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        // BTreeMap keeps the serialized form stable across runs.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn validate_fields(fields: &BTreeMap<String, FieldConfig>, prefix: &str) -> Result<(), ConfigError> {
    for (name, field) in fields {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match field.field_type {
            FieldType::Object if field.fields.is_empty() => {
                return Err(ConfigError::ObjectWithoutFields(path));
            }
            FieldType::Object => validate_fields(&field.fields, &path)?,
            other if !field.fields.is_empty() => {
                return Err(ConfigError::UnexpectedSubFields {
                    field: path,
                    field_type: other.to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
