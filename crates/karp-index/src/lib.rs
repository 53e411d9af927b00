//! # karp-index
//!
//! Everything Karp knows about how a resource is indexed:
//! - [`FieldMapping`]: flattened logical fields, their analyzed/raw/sort
//!   representations and the generated Elasticsearch mapping
//! - [`MappingCache`]: per-resource, copy-on-write cache of mappings
//! - [`Filter`]: backend-neutral query tree
//! - [`MemoryIndex`]: in-memory index evaluating filters over entries

pub mod cache;
pub mod filter;
pub mod mapping;
pub mod memory;

pub use cache::{MappingCache, MappingSource};
pub use filter::{EntryView, Filter, PreparedFilter, RangeBounds, Scalar};
pub use mapping::{BackendField, FieldKind, FieldMapping, MappedField};
pub use memory::MemoryIndex;
