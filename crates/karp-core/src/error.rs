//! Error types for Karp.

use thiserror::Error;

/// Top-level result type for Karp operations.
pub type Result<T> = std::result::Result<T, KarpError>;

/// Top-level error type for Karp.
#[derive(Debug, Error)]
pub enum KarpError {
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The coarse classification of a [`QueryError`], used by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedQuery,
    UnsupportedField,
    UnsupportedQuery,
}

/// Errors raised while parsing or compiling a query.
///
/// All of them are deterministic functions of the input; retrying never helps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("malformed query at {position} ('{fragment}'): {message}")]
    MalformedQuery {
        fragment: String,
        position: usize,
        message: String,
    },

    #[error("unknown operator '{token}' at {position}")]
    UnknownOperator { token: String, position: usize },

    #[error("field '{field}' is not supported by resource '{resource}'")]
    UnsupportedField { field: String, resource: String },

    #[error("unsupported query: {message}")]
    UnsupportedQuery { message: String },

    #[error("unknown resource: {0}")]
    UnknownResource(String),
}

impl QueryError {
    pub fn malformed(fragment: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self::MalformedQuery {
            fragment: fragment.into(),
            position,
            message: message.into(),
        }
    }

    pub fn unsupported_field(field: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::UnsupportedField {
            field: field.into(),
            resource: resource.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedQuery {
            message: message.into(),
        }
    }

    /// Coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedQuery { .. } | Self::UnknownOperator { .. } => ErrorKind::MalformedQuery,
            Self::UnsupportedField { .. } => ErrorKind::UnsupportedField,
            Self::UnsupportedQuery { .. } | Self::UnknownResource(_) => ErrorKind::UnsupportedQuery,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedQuery { .. } => "malformed_query",
            Self::UnknownOperator { .. } => "unknown_operator",
            Self::UnsupportedField { .. } => "unsupported_field",
            Self::UnsupportedQuery { .. } => "unsupported_query",
            Self::UnknownResource(_) => "unknown_resource",
        }
    }

    /// The 4xx status the HTTP layer answers with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownResource(_) => 404,
            _ => 400,
        }
    }
}

/// Errors related to resource and runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("resource id must not be empty")]
    EmptyResourceId,

    #[error("object field '{0}' has no sub-fields")]
    ObjectWithoutFields(String),

    #[error("field '{field}' of type {field_type} cannot have sub-fields")]
    UnexpectedSubFields { field: String, field_type: String },

    #[error("default sort field '{0}' is not configured")]
    UnknownSortField(String),

    #[error("config parse error: {0}")]
    Parse(String),
}
