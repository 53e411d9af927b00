//! Search request → compiled backend query.
//!
//! Parses the query string, walks it with a [`QueryBuilder`], resolves the
//! sort order and validates pagination. The result is a backend query plus
//! everything the executor needs to run it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use karp_core::config::QuerySettings;
use karp_core::error::QueryError;
use karp_index::{FieldMapping, MappingSource};
use karp_parser::parse_with_depth;

use crate::builder::QueryBuilder;
use crate::emit::{ElasticEmitter, QueryEmitter};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// A requested sort: `field`, `field|asc` or `field|desc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl FromStr for SortSpec {
    type Err = QueryError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (field, order) = match spec.split_once('|') {
            None => (spec, SortOrder::Asc),
            Some((field, "asc")) => (field, SortOrder::Asc),
            Some((field, "desc")) => (field, SortOrder::Desc),
            Some((_, other)) => {
                return Err(QueryError::malformed(
                    spec,
                    spec.len() - other.len(),
                    "sort order must be 'asc' or 'desc'",
                ))
            }
        };
        if field.is_empty() {
            return Err(QueryError::malformed(spec, 0, "sort field is empty"));
        }
        Ok(Self {
            field: field.to_string(),
            order,
        })
    }
}

/// A sort resolved against the target resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    /// Logical field name.
    pub field: String,
    /// Backend field the backend sorts by.
    pub backend: String,
    pub order: SortOrder,
}

/// A search request as it arrives from an API client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub q: Option<String>,
    pub resources: Vec<String>,
    pub from: usize,
    pub size: usize,
    pub sort: Vec<String>,
    pub lexicon_stats: bool,
    pub split_results: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            q: None,
            resources: Vec::new(),
            from: 0,
            size: 25,
            sort: Vec::new(),
            lexicon_stats: true,
            split_results: false,
        }
    }
}

impl QueryRequest {
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_query(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort.push(sort.into());
        self
    }

    #[must_use]
    pub fn paginate(mut self, from: usize, size: usize) -> Self {
        self.from = from;
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_lexicon_stats(mut self, lexicon_stats: bool) -> Self {
        self.lexicon_stats = lexicon_stats;
        self
    }

    #[must_use]
    pub fn split(mut self) -> Self {
        self.split_results = true;
        self
    }

    /// Apply configured defaults to a request built from scratch.
    #[must_use]
    pub fn with_settings(mut self, settings: &QuerySettings) -> Self {
        self.size = settings.default_size;
        self.lexicon_stats = settings.lexicon_stats;
        self
    }
}

/// Hard limits enforced at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub max_depth: usize,
    pub max_result_window: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_depth: karp_parser::DEFAULT_MAX_DEPTH,
            max_result_window: 10_000,
        }
    }
}

impl From<&QuerySettings> for QueryLimits {
    fn from(settings: &QuerySettings) -> Self {
        Self {
            max_depth: settings.max_depth,
            max_result_window: settings.max_result_window,
        }
    }
}

/// A compiled search, generic over the backend fragment type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery<F> {
    pub query: F,
    pub resources: Vec<String>,
    pub from: usize,
    pub size: usize,
    pub sort: Vec<SortKey>,
    pub split_results: bool,
    pub lexicon_stats: bool,
}

/// Compiles requests against the mappings of a [`MappingSource`].
pub struct QueryCompiler<'a, S: MappingSource + ?Sized, E: QueryEmitter> {
    source: &'a S,
    emitter: E,
    limits: QueryLimits,
}

impl<'a, S: MappingSource + ?Sized, E: QueryEmitter> QueryCompiler<'a, S, E> {
    pub fn new(source: &'a S, emitter: E) -> Self {
        Self {
            source,
            emitter,
            limits: QueryLimits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Compile a request.
    ///
    /// # Errors
    ///
    /// Any [`QueryError`]: unknown resources, a malformed query string,
    /// unsupported fields or operations, unsortable sort fields and
    /// pagination beyond the result window.
    pub fn compile(&self, request: &QueryRequest) -> Result<CompiledQuery<E::Fragment>, QueryError> {
        if request.resources.is_empty() {
            return Err(QueryError::unsupported("at least one resource is required"));
        }
        let mappings = request
            .resources
            .iter()
            .map(|id| self.source.mapping(id))
            .collect::<Result<Vec<_>, _>>()?;

        let window = request.from.saturating_add(request.size);
        if window > self.limits.max_result_window {
            return Err(QueryError::unsupported(format!(
                "from + size must not exceed {}, got {window}",
                self.limits.max_result_window
            )));
        }

        let ast = match request.q.as_deref() {
            Some(q) => parse_with_depth(q, self.limits.max_depth)?,
            None => karp_parser::Ast::empty(),
        };
        let query = match &ast.root {
            Some(root) => QueryBuilder::new(&self.emitter, &mappings).walk(root)?,
            None => self.emitter.match_all(),
        };
        let sort = resolve_sort(&request.sort, &mappings)?;

        debug!(
            q = request.q.as_deref().unwrap_or(""),
            resources = ?request.resources,
            sort = sort.len(),
            "compiled query"
        );

        Ok(CompiledQuery {
            query,
            resources: request.resources.clone(),
            from: request.from,
            size: request.size,
            sort,
            split_results: request.split_results,
            lexicon_stats: request.lexicon_stats,
        })
    }
}

/// Resolve sort specs against every target resource. Without explicit specs
/// a single-resource search uses the resource's configured default sort.
fn resolve_sort(specs: &[String], mappings: &[Arc<FieldMapping>]) -> Result<Vec<SortKey>, QueryError> {
    let specs: Vec<SortSpec> = if specs.is_empty() {
        match mappings {
            [only] => only
                .default_sort()
                .iter()
                .map(|field| SortSpec {
                    field: field.clone(),
                    order: SortOrder::Asc,
                })
                .collect(),
            _ => Vec::new(),
        }
    } else {
        specs.iter().map(|s| s.parse()).collect::<Result<_, _>>()?
    };

    specs
        .into_iter()
        .map(|spec| {
            // One sort clause covers every index, so the backend path must agree.
            let mut backend: Option<(&str, &str)> = None;
            for mapping in mappings {
                let path = mapping.sort_field(&spec.field)?;
                match backend {
                    None => backend = Some((path, mapping.resource_id())),
                    Some((first, resource)) if first != path => {
                        return Err(QueryError::unsupported(format!(
                            "cannot sort by '{}': it is '{first}' in {resource} but '{path}' in {}",
                            spec.field,
                            mapping.resource_id()
                        )));
                    }
                    Some(_) => {}
                }
            }
            Ok(SortKey {
                backend: backend.map_or_else(|| spec.field.clone(), |(path, _)| path.to_string()),
                field: spec.field,
                order: spec.order,
            })
        })
        .collect()
}

/// Compile a search into Elasticsearch query DSL.
///
/// `query_string = None` (or an empty string) matches everything.
///
/// # Errors
///
/// See [`QueryCompiler::compile`].
#[allow(clippy::too_many_arguments)]
pub fn compile_query(
    source: &dyn MappingSource,
    query_string: Option<&str>,
    resource_ids: &[String],
    from: usize,
    size: usize,
    sort: &[String],
    lexicon_stats: bool,
    split_results: bool,
) -> Result<CompiledQuery<Value>, QueryError> {
    let request = QueryRequest {
        q: query_string.map(str::to_string),
        resources: resource_ids.to_vec(),
        from,
        size,
        sort: sort.to_vec(),
        lexicon_stats,
        split_results,
    };
    QueryCompiler::new(source, ElasticEmitter).compile(&request)
}

impl CompiledQuery<Value> {
    fn es_sort(&self) -> Value {
        self.sort
            .iter()
            .map(|key| json!({ key.backend.as_str(): { "order": key.order.to_string() } }))
            .collect()
    }

    /// The `_search` body for all resources at once.
    #[must_use]
    pub fn to_es_body(&self) -> Value {
        let mut body = json!({
            "query": self.query,
            "from": self.from,
            "size": self.size,
            "track_total_hits": true,
        });
        if !self.sort.is_empty() {
            body["sort"] = self.es_sort();
        }
        if self.lexicon_stats {
            body["aggs"] = json!({
                "distribution": { "terms": { "field": "_index", "size": self.resources.len() } }
            });
        }
        body
    }

    /// Newline-delimited `_msearch` payload with one search per resource,
    /// used when results are split by resource.
    #[must_use]
    pub fn to_es_msearch(&self) -> String {
        let mut body = json!({
            "query": self.query,
            "from": self.from,
            "size": self.size,
            "track_total_hits": true,
        });
        if !self.sort.is_empty() {
            body["sort"] = self.es_sort();
        }
        let body = body.to_string();

        let mut out = String::new();
        for resource in &self.resources {
            out.push_str(&json!({ "index": resource }).to_string());
            out.push('\n');
            out.push_str(&body);
            out.push('\n');
        }
        out
    }
}

/// A value-count query over one field of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsQuery {
    pub resource: String,
    /// Logical field name.
    pub field: String,
    /// Backend field the aggregation runs on.
    pub backend: String,
}

impl StatisticsQuery {
    #[must_use]
    pub fn to_es_body(&self) -> Value {
        json!({
            "size": 0,
            "aggs": {
                "field_values": {
                    "terms": { "field": self.backend, "size": 10_000 }
                }
            }
        })
    }
}

/// Compile a statistics query for `field` of `resource`. The field must be
/// sortable, which is the same as having an unanalyzed representation.
///
/// # Errors
///
/// Returns [`QueryError::UnknownResource`] or [`QueryError::UnsupportedField`].
pub fn compile_statistics(
    source: &(impl MappingSource + ?Sized),
    resource: &str,
    field: &str,
) -> Result<StatisticsQuery, QueryError> {
    let mapping = source.mapping(resource)?;
    let backend = mapping.sort_field(field)?.to_string();
    Ok(StatisticsQuery {
        resource: resource.to_string(),
        field: field.to_string(),
        backend,
    })
}
