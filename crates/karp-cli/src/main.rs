//! Karp CLI: compile and run lexical search queries
//!
//! Commands: parse, compile, search, stats, mapping, resources, watch, completions

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use karp_core::entry::Entry;
use karp_core::error::QueryError;
use karp_core::KarpConfig;
use karp_index::{MappingCache, MappingSource, MemoryIndex};
use karp_query::{
    compile_statistics, format_results, ElasticEmitter, FilterEmitter, OutputFormat, QueryCompiler, QueryLimits,
    QueryRequest, SearchExecutor,
};
use karp_resources::{ConfigWatcher, ResourceRegistry};

#[derive(Parser)]
#[command(name = "karp")]
#[command(version)]
#[command(about = "Query-DSL compiler and search tool for lexical resources")]
struct Cli {
    /// Runtime configuration file
    #[arg(long, global = true, default_value = "karp.toml")]
    config: PathBuf,

    /// Directory with resource configurations (overrides the config file)
    #[arg(long, global = true)]
    resources_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SearchArgs {
    /// Query string; omit to match everything
    query: Option<String>,

    /// Resource to search (repeatable)
    #[arg(short, long = "resource", required = true)]
    resources: Vec<String>,

    #[arg(long, default_value_t = 0)]
    from: usize,

    /// Page size (defaults to the configured size)
    #[arg(long)]
    size: Option<usize>,

    /// Sort spec `field`, `field|asc` or `field|desc` (repeatable)
    #[arg(long)]
    sort: Vec<String>,

    /// Group hits by resource
    #[arg(long)]
    split: bool,

    /// Skip the per-resource hit distribution
    #[arg(long)]
    no_stats: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Elasticsearch `_search` body
    Es,
    /// Elasticsearch `_msearch` payload, one search per resource
    Msearch,
    /// Backend-neutral filter tree
    Filter,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Table,
    Markdown,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Table => OutputFormat::Table,
            Format::Markdown => OutputFormat::Markdown,
        }
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Parse a query and print its syntax tree
    Parse {
        query: String,
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compile a query into a backend query
    #[command(alias = "c")]
    Compile {
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long, value_enum, default_value = "es")]
        backend: Backend,
    },
    /// Run a query against entries loaded from a JSON-lines file
    #[command(alias = "s")]
    Search {
        #[command(flatten)]
        search: SearchArgs,
        /// JSON-lines file with one entry per line
        #[arg(long)]
        entries: PathBuf,
        #[arg(long, value_enum, default_value = "json")]
        format: Format,
    },
    /// Count the values of a field
    Stats {
        #[arg(short, long)]
        resource: String,
        #[arg(long)]
        field: String,
        /// JSON-lines file with one entry per line; without it the
        /// Elasticsearch aggregation is printed
        #[arg(long)]
        entries: Option<PathBuf>,
    },
    /// Print the Elasticsearch mapping of a resource
    Mapping { resource: String },
    /// List the configured resources
    Resources,
    /// Watch the resource directory and report configuration changes
    Watch,
    /// Generate shell completions
    Completions { shell: clap_complete::Shell },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        match err.downcast_ref::<QueryError>() {
            Some(query_err) => eprintln!("error[{}]: {query_err}", query_err.code()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = KarpConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(&config.logging.level);

    let resources_dir = cli
        .resources_dir
        .clone()
        .unwrap_or_else(|| config.resources.dir.clone());

    match cli.command {
        Commands::Parse { query, json } => {
            let ast = karp_parser::parse_with_depth(&query, config.query.max_depth)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ast)?);
            } else {
                match &ast.root {
                    Some(root) => print!("{root}"),
                    None => println!("(empty query)"),
                }
            }
        }
        Commands::Compile { search, backend } => {
            let cache = load_cache(&resources_dir)?;
            let request = build_request(&search, &config);
            let limits = QueryLimits::from(&config.query);
            match backend {
                Backend::Es | Backend::Msearch => {
                    let compiled = QueryCompiler::new(cache.as_ref(), ElasticEmitter)
                        .with_limits(limits)
                        .compile(&request)?;
                    match backend {
                        Backend::Msearch => print!("{}", compiled.to_es_msearch()),
                        _ => println!("{}", serde_json::to_string_pretty(&compiled.to_es_body())?),
                    }
                }
                Backend::Filter => {
                    let compiled = QueryCompiler::new(cache.as_ref(), FilterEmitter)
                        .with_limits(limits)
                        .compile(&request)?;
                    println!("{}", serde_json::to_string_pretty(&compiled)?);
                }
            }
        }
        Commands::Search {
            search,
            entries,
            format,
        } => {
            let index = load_index(&resources_dir, &entries)?;
            let request = build_request(&search, &config);
            let compiled = QueryCompiler::new(&index, FilterEmitter)
                .with_limits(QueryLimits::from(&config.query))
                .compile(&request)?;
            let result = index.execute(&compiled)?;
            let output = format_results(&result, format.into());
            if output.ends_with('\n') {
                print!("{output}");
            } else {
                println!("{output}");
            }
        }
        Commands::Stats {
            resource,
            field,
            entries,
        } => match entries {
            Some(entries) => {
                let index = load_index(&resources_dir, &entries)?;
                let stats = compile_statistics(&index, &resource, &field)?;
                let counts = index.statistics(&stats)?;
                println!("{}", serde_json::to_string_pretty(&counts)?);
            }
            None => {
                let cache = load_cache(&resources_dir)?;
                let stats = compile_statistics(cache.as_ref(), &resource, &field)?;
                println!("{}", serde_json::to_string_pretty(&stats.to_es_body())?);
            }
        },
        Commands::Mapping { resource } => {
            let cache = load_cache(&resources_dir)?;
            let mapping = cache.mapping(&resource)?;
            println!("{}", serde_json::to_string_pretty(&mapping.es_mapping())?);
        }
        Commands::Resources => {
            let cache = load_cache(&resources_dir)?;
            for id in cache.resource_ids() {
                println!("{id}");
            }
        }
        Commands::Watch => watch(&resources_dir)?,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "karp", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// `KARP_LOG` wins over `RUST_LOG`, which wins over the configured level.
/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("KARP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_request(args: &SearchArgs, config: &KarpConfig) -> QueryRequest {
    let mut request = QueryRequest::new(args.resources.iter().cloned()).with_settings(&config.query);
    request.q = args.query.clone();
    request.from = args.from;
    if let Some(size) = args.size {
        request.size = size;
    }
    request.sort = args.sort.clone();
    request.split_results = args.split;
    if args.no_stats {
        request.lexicon_stats = false;
    }
    request
}

fn load_cache(dir: &Path) -> anyhow::Result<Arc<MappingCache>> {
    let cache = Arc::new(MappingCache::new());
    let mut registry = ResourceRegistry::new(dir, Arc::clone(&cache));
    registry
        .load()
        .with_context(|| format!("loading resources from {}", dir.display()))?;
    Ok(cache)
}

fn load_index(dir: &Path, entries: &Path) -> anyhow::Result<MemoryIndex> {
    let mut index = MemoryIndex::new();
    let configs = karp_resources::load_dir(dir)
        .with_context(|| format!("loading resources from {}", dir.display()))?;
    for config in &configs {
        index.create_index(config)?;
    }

    let file = std::fs::File::open(entries).with_context(|| format!("opening {}", entries.display()))?;
    let mut count = 0;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: Entry = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid entry", entries.display(), n + 1))?;
        index.add_entry(entry)?;
        count += 1;
    }
    info!(entries = count, resources = configs.len(), "index loaded");
    Ok(index)
}

fn watch(dir: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let cache = Arc::new(MappingCache::new());
    let mut registry = ResourceRegistry::new(dir, Arc::clone(&cache));
    let loaded = registry.load()?;
    let watcher = ConfigWatcher::start(dir)?;
    println!("watching {} ({loaded} resources)", dir.display());

    loop {
        let Some(event) = watcher.recv_timeout(std::time::Duration::from_secs(1)) else {
            continue;
        };
        if registry.apply(&event) {
            println!("{}: {}", event.path().display(), cache.resource_ids().join(", "));
        }
    }
}
