//! Field mapping: how the logical fields of a resource are laid out in the
//! search backend, and how to search and sort by each of them.
//!
//! Conventions:
//! - `string` fields are analyzed text with an unanalyzed `<field>.raw`
//!   keyword sub-field used for exact matching and sorting.
//! - `long_string` fields are analyzed text without a raw sub-field; they
//!   cannot be sorted on.
//! - `object` fields are flattened into dotted paths (`senses.id`).
//! - The system fields (`_id`, `_entry_version`, ...) exist in every resource.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{json, Map, Value};

use karp_core::error::QueryError;
use karp_core::resource::{FieldConfig, FieldType, ResourceConfig};

/// Name of the unanalyzed sub-field generated for `string` fields.
pub const RAW_SUFFIX: &str = "raw";

/// Backend representation of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Boolean,
    Long,
    Double,
    /// Analyzed free text.
    Text,
    /// Unanalyzed exact-match string.
    Keyword,
    Object,
}

/// A logical field after flattening.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedField {
    pub path: String,
    pub kind: FieldKind,
    pub collection: bool,
    /// The unanalyzed sub-field of an analyzed text field, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Every backend field this logical field is indexed as.
    pub backend_paths: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub system: bool,
}

/// Reverse lookup entry: which logical field a backend path reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendField {
    pub source: String,
    pub analyzed: bool,
}

impl MappedField {
    fn new(path: String, kind: FieldKind, collection: bool, with_raw: bool) -> Self {
        let raw = with_raw.then(|| format!("{path}.{RAW_SUFFIX}"));
        let mut backend_paths = vec![path.clone()];
        backend_paths.extend(raw.clone());
        Self {
            path,
            kind,
            collection,
            raw,
            backend_paths,
            system: false,
        }
    }

    fn system(path: &str, kind: FieldKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
            collection: false,
            raw: None,
            backend_paths: vec![path.to_string()],
            system: true,
        }
    }

    #[must_use]
    pub fn is_analyzed(&self) -> bool {
        self.kind == FieldKind::Text
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, FieldKind::Long | FieldKind::Double)
    }

    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(self.kind, FieldKind::Text | FieldKind::Keyword)
    }

    /// Backend field for exact (unanalyzed) matching. Analyzed text only has
    /// one through its raw sub-field; objects have none.
    #[must_use]
    pub fn exact_path(&self) -> Option<&str> {
        match self.kind {
            FieldKind::Text => self.raw.as_deref(),
            FieldKind::Object => None,
            _ => Some(&self.path),
        }
    }

    /// Backend field to sort by, if the field is sortable at all.
    #[must_use]
    pub fn sort_path(&self) -> Option<&str> {
        match self.kind {
            FieldKind::Boolean | FieldKind::Long | FieldKind::Double | FieldKind::Keyword => {
                Some(&self.path)
            }
            FieldKind::Text => self.raw.as_deref(),
            FieldKind::Object => None,
        }
    }
}

/// The flattened field mapping of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    resource_id: String,
    fields: BTreeMap<String, MappedField>,
    backend: HashMap<String, BackendField>,
    default_sort: Vec<String>,
    es_properties: Value,
}

impl FieldMapping {
    /// Build the mapping of a resource from its configuration.
    #[must_use]
    pub fn from_config(config: &ResourceConfig) -> Self {
        let mut fields = flatten_fields(&config.fields);
        for (name, kind) in system_fields() {
            fields.insert(name.to_string(), MappedField::system(name, kind));
        }

        let mut backend = HashMap::new();
        for field in fields.values() {
            for path in &field.backend_paths {
                backend.insert(
                    path.clone(),
                    BackendField {
                        source: field.path.clone(),
                        analyzed: field.is_analyzed() && *path == field.path,
                    },
                );
            }
        }

        tracing::debug!(
            resource = %config.resource_id,
            fields = fields.len(),
            "built field mapping"
        );

        Self {
            resource_id: config.resource_id.clone(),
            fields,
            backend,
            default_sort: config.sort.clone(),
            es_properties: es_properties(&config.fields),
        }
    }

    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    #[must_use]
    pub fn field(&self, path: &str) -> Option<&MappedField> {
        self.fields.get(path)
    }

    /// Like [`field`](Self::field), but an unknown field is an error.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnsupportedField`] if the field is not configured.
    pub fn require(&self, path: &str) -> Result<&MappedField, QueryError> {
        self.field(path)
            .ok_or_else(|| QueryError::unsupported_field(path, &self.resource_id))
    }

    /// Whether the field is analyzed free text.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnsupportedField`] if the field is not configured.
    pub fn is_analyzed(&self, path: &str) -> Result<bool, QueryError> {
        self.require(path).map(MappedField::is_analyzed)
    }

    /// Backend field for exact matching of a logical field.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnsupportedField`] if the field is not configured
    /// or is analyzed without a raw sub-field (`long_string`).
    pub fn exact_field(&self, path: &str) -> Result<&str, QueryError> {
        self.require(path)?
            .exact_path()
            .ok_or_else(|| QueryError::unsupported_field(path, &self.resource_id))
    }

    /// Backend field to sort by for a logical field.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnsupportedField`] if the field is not configured
    /// or has no sortable representation (e.g. `long_string`, `object`).
    pub fn sort_field(&self, path: &str) -> Result<&str, QueryError> {
        self.require(path)?
            .sort_path()
            .ok_or_else(|| QueryError::unsupported_field(path, &self.resource_id))
    }

    /// Which logical field a backend path reads from.
    #[must_use]
    pub fn backend(&self, path: &str) -> Option<&BackendField> {
        self.backend.get(path)
    }

    pub fn fields(&self) -> impl Iterator<Item = &MappedField> {
        self.fields.values()
    }

    /// The resource's configured default sort, as logical field names.
    #[must_use]
    pub fn default_sort(&self) -> &[String] {
        &self.default_sort
    }

    /// The Elasticsearch index mapping for this resource.
    #[must_use]
    pub fn es_mapping(&self) -> Value {
        json!({
            "dynamic": false,
            "properties": self.es_properties,
        })
    }
}

fn system_fields() -> [(&'static str, FieldKind); 4] {
    [
        ("_id", FieldKind::Keyword),
        ("_entry_version", FieldKind::Long),
        ("_last_modified", FieldKind::Double),
        ("_last_modified_by", FieldKind::Keyword),
    ]
}

/// Flatten a configured field tree into a map from dotted logical path to
/// its mapped representation. Object fields appear alongside their children.
#[must_use]
pub fn flatten_fields(fields: &BTreeMap<String, FieldConfig>) -> BTreeMap<String, MappedField> {
    let mut out = BTreeMap::new();
    flatten_into(fields, "", false, &mut out);
    out
}

fn flatten_into(
    fields: &BTreeMap<String, FieldConfig>,
    prefix: &str,
    inherited_collection: bool,
    out: &mut BTreeMap<String, MappedField>,
) {
    for (name, config) in fields {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        let collection = inherited_collection || config.collection;
        let kind = match config.field_type {
            FieldType::Boolean => FieldKind::Boolean,
            FieldType::Integer => FieldKind::Long,
            FieldType::Number => FieldKind::Double,
            FieldType::String | FieldType::LongString => FieldKind::Text,
            FieldType::Object => FieldKind::Object,
        };

        // Only `string` gets a raw sub-field; `long_string` is text without one.
        let with_raw = config.field_type == FieldType::String;
        out.insert(
            path.clone(),
            MappedField::new(path.clone(), kind, collection, with_raw),
        );

        if config.field_type == FieldType::Object {
            flatten_into(&config.fields, &path, collection, out);
        }
    }
}

fn es_properties(fields: &BTreeMap<String, FieldConfig>) -> Value {
    let mut props = Map::new();
    for (name, config) in fields {
        let mapping = match config.field_type {
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::Integer => json!({"type": "long"}),
            FieldType::Number => json!({"type": "double"}),
            FieldType::String => json!({
                "type": "text",
                "fields": {RAW_SUFFIX: {"type": "keyword"}},
            }),
            FieldType::LongString => json!({"type": "text"}),
            FieldType::Object => json!({"properties": es_properties(&config.fields)}),
        };
        props.insert(name.clone(), mapping);
    }
    props.insert("_entry_version".to_string(), json!({"type": "long"}));
    props.insert("_last_modified".to_string(), json!({"type": "double"}));
    props.insert("_last_modified_by".to_string(), json!({"type": "keyword"}));
    Value::Object(props)
}
