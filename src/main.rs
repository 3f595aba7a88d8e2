//! Trawl main entry point
//!
//! This is the command-line interface for the Trawl structured-data crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use trawl::config::{
    compute_config_hash, find_schema, hash_content, load_config_with_hash, load_schemas, validate,
    validate_schema, validate_seed_url, Config, PaginationRule, SelectorSchema,
};
use trawl::crawler::{Coordinator, CrawlOptions, HttpRenderer, Paginator};
use trawl::extract::Extractor;
use trawl::middleware::MiddlewareChain;
use trawl::output::{load_statistics, print_statistics, print_summary, write_json_lines, WriteMode};
use trawl::state::WorkUnit;
use trawl::storage::{FlushPolicy, StateStore};
use trawl::url::extract_domain;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Page ceiling applied when a schema paginates and nothing else bounds it
const DEFAULT_MAX_PAGES: u32 = 50;

/// Trawl: a resumable structured-data crawler
///
/// Trawl fetches a listing page, extracts records with a selector schema
/// (or infers the repeating structure when there is none), follows
/// pagination, and remembers finished pages so an interrupted crawl picks
/// up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(version)]
#[command(about = "A resumable structured-data crawler", long_about = None)]
struct Cli {
    /// Seed URL to start from
    #[arg(value_name = "URL")]
    url: String,

    /// Name of the schema to use from the selectors file
    #[arg(long, value_name = "NAME")]
    config: Option<String>,

    /// Selector schema file (JSON)
    #[arg(long, value_name = "PATH", default_value = "selectors.json")]
    selectors: PathBuf,

    /// Crawl settings file (TOML)
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// CSS selector for the repeating item container
    #[arg(long, value_name = "SELECTOR")]
    container: Option<String>,

    /// Field mapping, e.g. "title:h2,price:.price,link:a@href"
    #[arg(long, value_name = "MAPPING")]
    fields: Option<String>,

    /// Follow the link matching this selector to the next page
    #[arg(long, value_name = "SELECTOR", conflicts_with = "page_template")]
    next: Option<String>,

    /// Page URL template containing {page}
    #[arg(long, value_name = "TEMPLATE")]
    page_template: Option<String>,

    /// Number of parallel requests
    #[arg(long)]
    concurrency: Option<u32>,

    /// Requests per second across all workers (0 = unlimited)
    #[arg(long)]
    rate_limit: Option<f64>,

    /// Maximum number of items to extract
    #[arg(long)]
    max_items: Option<usize>,

    /// Maximum number of pages to visit
    #[arg(long)]
    max_pages: Option<u32>,

    /// Disable state management (no resume)
    #[arg(long)]
    no_state: bool,

    /// Path of the state database
    #[arg(long, value_name = "PATH")]
    state_db: Option<PathBuf>,

    /// Forget stored progress for this target before crawling
    #[arg(long, conflicts_with = "stats")]
    fresh: bool,

    /// Show stored statistics for this target and exit
    #[arg(long)]
    stats: bool,

    /// Write records as JSON lines to this file
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let seed = validate_seed_url(&cli.url)?;
    let (config, config_hash) = load_settings(&cli)?;
    let schema = resolve_schema(&cli, &seed)?;

    let target = state_target(&cli, &seed);
    let state = open_state(&config, &target);

    if cli.stats {
        let store = state.lock().unwrap_or_else(|p| p.into_inner());
        let stats = load_statistics(&store).context("Failed to read stored statistics")?;
        print_statistics(&stats);
        return Ok(());
    }

    if cli.fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
        state.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    handle_crawl(&cli, config, config_hash, schema, seed, state).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawl=info,warn"),
            1 => EnvFilter::new("trawl=debug,info"),
            2 => EnvFilter::new("trawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads crawl settings and applies command-line overrides
fn load_settings(cli: &Cli) -> anyhow::Result<(Config, String)> {
    let (mut config, settings_hash) = match &cli.settings {
        Some(path) => {
            tracing::info!("Loading settings from: {}", path.display());
            load_config_with_hash(path)
                .with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => (Config::default(), String::new()),
    };

    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(rate) = cli.rate_limit {
        config.crawler.rate_limit = rate;
    }
    if cli.max_items.is_some() {
        config.crawler.max_items = cli.max_items;
    }
    if cli.max_pages.is_some() {
        config.crawler.max_pages = cli.max_pages;
    }
    if cli.no_state {
        config.state.enabled = false;
    }
    if let Some(path) = &cli.state_db {
        config.state.database_path = path.display().to_string();
    }

    validate(&config)?;

    let schema_hash = compute_config_hash(&cli.selectors).unwrap_or_default();
    let hash = hash_content(&format!("{}\n{}", settings_hash, schema_hash));
    tracing::debug!("Configuration hash: {}", hash);

    Ok((config, hash))
}

/// Picks the selector schema for the run
///
/// Inline `--container`/`--fields` win over the selectors file; inline
/// pagination flags replace the chosen schema's rule.
fn resolve_schema(cli: &Cli, seed: &Url) -> anyhow::Result<Option<SelectorSchema>> {
    let mut schema = if cli.container.is_some() || cli.fields.is_some() {
        let host = extract_domain(seed).unwrap_or_default();
        let mut inline = SelectorSchema::new("inline", host);
        if let Some(container) = &cli.container {
            inline = inline.with_container(container.clone());
        }
        if let Some(fields) = &cli.fields {
            for (name, selector) in parse_fields(fields)? {
                inline = inline.with_field(name, selector);
            }
        }
        Some(inline)
    } else if cli.selectors.exists() {
        let schemas = load_schemas(&cli.selectors)
            .with_context(|| format!("Failed to load {}", cli.selectors.display()))?;
        let found = find_schema(&schemas, cli.config.as_deref(), seed)?.cloned();
        match &found {
            Some(schema) => tracing::info!("Using selector schema '{}'", schema.name),
            None => tracing::info!("No selector schema matches {}; using smart extraction", seed),
        }
        found
    } else {
        if let Some(name) = &cli.config {
            bail!("Schema '{}' requested but {} does not exist", name, cli.selectors.display());
        }
        None
    };

    let inline_rule = match (&cli.next, &cli.page_template) {
        (Some(selector), _) => Some(PaginationRule::next_button(selector.clone())),
        (None, Some(template)) => Some(PaginationRule::page_param(template.clone())),
        (None, None) => None,
    };
    if let Some(rule) = inline_rule {
        let host = extract_domain(seed).unwrap_or_default();
        schema = Some(
            schema
                .unwrap_or_else(|| SelectorSchema::new("inline", host))
                .with_pagination(rule),
        );
    }

    if let Some(schema) = &schema {
        validate_schema(schema)?;
    }
    Ok(schema)
}

/// Parses `name:selector` pairs separated by commas
fn parse_fields(mapping: &str) -> anyhow::Result<Vec<(String, String)>> {
    mapping
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((name, selector)) if !name.trim().is_empty() && !selector.trim().is_empty() => {
                Ok((name.trim().to_string(), selector.trim().to_string()))
            }
            _ => Err(anyhow::anyhow!(
                "Invalid field mapping '{}', expected name:selector",
                pair
            )),
        })
        .collect()
}

/// Key the state store files progress under
fn state_target(cli: &Cli, seed: &Url) -> String {
    match &cli.output {
        Some(path) => path.display().to_string(),
        None => WorkUnit::seed(seed.as_str())
            .map(|unit| unit.key().to_string())
            .unwrap_or_else(|_| seed.to_string()),
    }
}

/// Opens the state store, falling back to memory-only on failure
fn open_state(config: &Config, target: &str) -> Arc<Mutex<StateStore>> {
    let store = if config.state.enabled {
        let policy = FlushPolicy {
            every: config.state.flush_every,
            interval: std::time::Duration::from_secs(config.state.flush_interval_secs),
        };
        let path = Path::new(&config.state.database_path);
        match StateStore::open(path, target, policy) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(
                    "Failed to open state database {}: {}; continuing without resume",
                    path.display(),
                    e
                );
                StateStore::memory_only(target)
            }
        }
    } else {
        tracing::info!("State management disabled");
        StateStore::memory_only(target)
    };

    Arc::new(Mutex::new(store))
}

/// Handles the main crawl operation
async fn handle_crawl(
    cli: &Cli,
    config: Config,
    config_hash: String,
    schema: Option<SelectorSchema>,
    seed: Url,
    state: Arc<Mutex<StateStore>>,
) -> anyhow::Result<()> {
    let mut options = CrawlOptions::from_config(&config.crawler);
    let rule = schema.as_ref().and_then(|s| s.pagination.clone());
    if let Some(rule) = &rule {
        if options.max_pages.is_none() && rule.max_pages.is_none() {
            tracing::info!(
                "Pagination ({:?}) without a page ceiling; stopping after {} pages",
                rule.kind,
                DEFAULT_MAX_PAGES
            );
            options.max_pages = Some(DEFAULT_MAX_PAGES);
        }
    }

    let renderer = HttpRenderer::new(&config.identity.proxies)
        .context("Failed to build HTTP client")?;
    let extractor = Extractor::new(schema.as_ref())?;
    let chain = MiddlewareChain::from_config(&config);
    tracing::debug!("Middleware chain: {}", chain.names().join(" -> "));

    tracing::info!(
        "Starting crawl of {} (concurrency {}, {} req/s)",
        seed,
        options.concurrency,
        config.crawler.rate_limit
    );

    // Records of units completed by earlier runs live only in the output file
    let write_mode = WriteMode::for_store(&state.lock().unwrap_or_else(|p| p.into_inner()));
    if write_mode == WriteMode::Append {
        if let Some(path) = &cli.output {
            tracing::info!("Resuming; appending new records to {}", path.display());
        }
    }

    let coordinator = Coordinator::new(Arc::new(renderer), extractor, options)
        .with_chain(chain)
        .with_paginator(Paginator::new(rule))
        .with_state(state)
        .with_config_hash(config_hash);
    let output = coordinator.output();

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing in-flight pages");
            cancel.cancel();
        }
    });

    let seed_unit = WorkUnit::seed(seed.as_str())?;
    let summary = coordinator.run(vec![seed_unit]).await;

    let records = output.take_records().unwrap_or_default();
    if let Some(path) = &cli.output {
        let written = write_json_lines(path, &records, write_mode)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Wrote {} record(s) to {}", written, path.display());
    }

    print_summary(&summary);

    if summary.is_total_failure() && summary.units_skipped_via_resume == 0 {
        bail!("No items extracted");
    }
    Ok(())
}
