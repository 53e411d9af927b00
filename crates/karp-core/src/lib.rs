//! # karp-core
//!
//! Core types shared by every Karp crate:
//! - Error hierarchy ([`KarpError`], [`QueryError`], [`ConfigError`])
//! - Resource configuration ([`ResourceConfig`], [`FieldConfig`], [`FieldType`])
//! - [`Entry`], a single versioned lexical entry as seen by the search layer
//! - Runtime configuration ([`KarpConfig`])

pub mod config;
pub mod entry;
pub mod error;
pub mod resource;

pub use config::KarpConfig;
pub use entry::Entry;
pub use error::{ConfigError, ErrorKind, KarpError, QueryError, Result};
pub use resource::{FieldConfig, FieldType, ResourceConfig};
