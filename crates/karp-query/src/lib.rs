//! # karp-query
//!
//! Query engine for Karp. Compiles query-DSL strings into backend queries
//! and runs them.
//!
//! Includes:
//! - Tree-walking query builder, generic over a [`QueryEmitter`]
//! - Elasticsearch and in-memory [`Filter`](karp_index::Filter) emitters
//! - [`compile_query`] / [`QueryCompiler`] with sort and pagination handling
//! - [`SearchExecutor`] for the in-memory index, with field statistics
//! - Result formatter (JSON, Table, Markdown)

pub mod builder;
pub mod compiler;
pub mod emit;
pub mod executor;
pub mod formatter;

pub use builder::QueryBuilder;
pub use compiler::{
    compile_query, compile_statistics, CompiledQuery, QueryCompiler, QueryLimits, QueryRequest, SortKey,
    SortOrder, SortSpec, StatisticsQuery,
};
pub use emit::{ElasticEmitter, FilterEmitter, QueryEmitter};
pub use executor::SearchExecutor;
pub use formatter::{format_results, FieldValueCount, Hit, Hits, OutputFormat, QueryResult};
