//! Galaxy Crawler main entry point
//!
//! This is the command-line interface for the Ansible Galaxy crawler.

use anyhow::Context;
use clap::{Parser, Subcommand};
use galaxy_crawler::config::{load_config_with_hash, validate, Config, OutputFormat};
use galaxy_crawler::crawler::{build_http_client, run_crawl, CrawlReport};
use galaxy_crawler::output::{load_statistics, print_statistics};
use galaxy_crawler::query::QueryBuilder;
use galaxy_crawler::resolver::{DependencyResolver, HttpRoleLookup};
use galaxy_crawler::storage::{
    load_json_dir, open_relational, DatabaseUrl, RelationalSink, RunStatus, SqliteSink,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Galaxy Crawler: a resilient bulk extractor for the Ansible Galaxy API
///
/// Walks the paginated Galaxy REST API, filters records against download
/// or star thresholds and stores them as JSON batches or in SQLite.
#[derive(Parser, Debug)]
#[command(name = "galaxy-crawler")]
#[command(version)]
#[command(about = "A resilient Ansible Galaxy API crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the API and store the filtered records
    Crawl(CrawlArgs),

    /// Bring the relational store schema up to date
    Migrate,

    /// Load JSON batch files into the relational store
    Load {
        /// Directory holding `<target>/<target>_<n>.json` batches
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Show statistics from the relational store
    Stats,
}

#[derive(clap::Args, Debug)]
struct CrawlArgs {
    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Seconds to sleep between successful fetches
    #[arg(long, value_name = "N")]
    interval: Option<u64>,

    /// Retries per request before the crawl fails
    #[arg(long, value_name = "N")]
    retry: Option<u32>,

    /// Sort key (download, star, name, id, contributor_name, fork, watcher)
    #[arg(long, value_name = "K")]
    order_by: Option<String>,

    /// Sort ascending instead of descending
    #[arg(long)]
    inverse: bool,

    /// Filter expression such as `download>500` (repeatable)
    #[arg(long = "filter", value_name = "EXPR")]
    filters: Vec<String>,
}

impl CrawlArgs {
    /// Command-line values take priority over env and file values
    fn apply(&self, config: &mut Config) {
        if let Some(interval) = self.interval {
            config.crawler.interval_secs = interval;
        }
        if let Some(retry) = self.retry {
            config.crawler.retry = retry;
        }
        if let Some(order_by) = &self.order_by {
            config.crawler.order_by = order_by.clone();
        }
        if self.inverse {
            config.crawler.inverse = true;
        }
        if !self.filters.is_empty() {
            config.crawler.filters = self.filters.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Crawl(args) => {
            args.apply(&mut config);
            validate(&config).context("invalid command-line override")?;
            if args.dry_run {
                handle_dry_run(&config)?;
                Ok(ExitCode::SUCCESS)
            } else {
                handle_crawl(&config, &config_hash).await
            }
        }
        Command::Migrate => {
            handle_migrate(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { dir } => {
            handle_load(&config, &dir).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats => {
            handle_stats(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("galaxy_crawler=info,warn"),
            1 => EnvFilter::new("galaxy_crawler=debug,info"),
            2 => EnvFilter::new("galaxy_crawler=trace,debug"),
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

/// Handles `crawl --dry-run`: shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Galaxy Crawler Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Deprecated records: {}", config.api.deprecated);

    println!("\nCrawler Configuration:");
    println!("  Interval: {}s", config.crawler.interval_secs);
    println!("  Retry: {}", config.crawler.retry);
    println!("  Page size: {}", config.crawler.page_size);
    println!(
        "  Order: {} ({})",
        config.order()?.as_str(),
        if config.crawler.inverse {
            "ascending"
        } else {
            "descending"
        }
    );

    println!("\nTargets ({}):", config.crawler.targets.len());
    for target in config.targets()? {
        println!("  - {}", target);
    }

    println!("\nFilters ({}):", config.crawler.filters.len());
    for expr in &config.crawler.filters {
        println!("  - {}", expr);
    }

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Formats: {}", config.output.formats.join(", "));
    if let Some(url) = config.database_url()? {
        println!("  Database: {}", url);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the `crawl` command
///
/// Runs are recorded in the relational store when it is file-backed. Role
/// dependencies are linked after the crawl when sqlite output is enabled.
async fn handle_crawl(config: &Config, config_hash: &str) -> anyhow::Result<ExitCode> {
    let mut bookkeeping = open_bookkeeping(config)?;
    let run_id = match bookkeeping.as_mut() {
        Some(sink) => Some(sink.create_run(config_hash)?),
        None => None,
    };

    tracing::info!(
        "Targets: {}, order: {}, filters: {}",
        config.crawler.targets.join(", "),
        config.crawler.order_by,
        config.crawler.filters.len()
    );

    let result = run_crawl(config).await;
    let status = match &result {
        Ok(report) => run_status(report),
        Err(_) => RunStatus::Failed,
    };

    if let (Some(sink), Some(run_id)) = (bookkeeping.as_mut(), run_id) {
        sink.finish_run(run_id, status)?;
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    println!(
        "Crawl {}: {} pages fetched, {} pages parsed, {} records saved",
        status.to_db_string(),
        report.pages_fetched,
        report.pages_parsed,
        report.records_saved
    );

    if report.interrupted {
        return Ok(ExitCode::FAILURE);
    }

    if let Some(sink) = bookkeeping.as_mut() {
        let mut resolver = role_resolver(config)?;
        resolver.load_mapping(Path::new(&config.output.directory))?;
        let linked = sink.link_role_dependencies(&mut resolver).await?;
        println!("{} role dependency edges stored", linked);
    }

    Ok(ExitCode::SUCCESS)
}

/// A second connection to the relational store, only for file databases
fn open_bookkeeping(config: &Config) -> anyhow::Result<Option<SqliteSink>> {
    if !config.formats()?.contains(&OutputFormat::Sqlite) {
        return Ok(None);
    }
    match config.database_url()? {
        Some(DatabaseUrl::Sqlite(_)) => Ok(Some(open_relational(config)?)),
        _ => Ok(None),
    }
}

fn run_status(report: &CrawlReport) -> RunStatus {
    if report.interrupted {
        RunStatus::Interrupted
    } else if report.early_stopped {
        RunStatus::EarlyStopped
    } else {
        RunStatus::Completed
    }
}

fn role_resolver(config: &Config) -> anyhow::Result<DependencyResolver<HttpRoleLookup>> {
    let client = build_http_client(&config.api)?;
    let builder = QueryBuilder::new(
        &config.api.base_url,
        config.api.deprecated,
        config.crawler.page_size,
    )?;
    Ok(DependencyResolver::new(HttpRoleLookup::new(client, builder))
        .with_lookup_interval(Duration::from_secs(config.crawler.interval_secs)))
}

/// Handles the `migrate` command
fn handle_migrate(config: &Config) -> anyhow::Result<()> {
    let url = config
        .database_url()?
        .context("database-url is not configured")?;
    let mut sink = SqliteSink::open(&url)?;

    if sink.is_migration_required()? {
        sink.migrate()?;
        println!("✓ Database {} migrated", url);
    } else {
        println!("✓ Database {} is up to date", url);
    }
    Ok(())
}

/// Handles the `load` command
async fn handle_load(config: &Config, dir: &Path) -> anyhow::Result<()> {
    println!("=== Loading JSON Batches ===\n");
    println!("Source: {}", dir.display());

    let mut sink = open_relational(config)?;
    let mut resolver = role_resolver(config)?;
    let report = load_json_dir(dir, &mut sink, &mut resolver).await?;

    for (target, count) in &report.records {
        println!("  {}: {}", target, count);
    }
    println!("  role dependency edges: {}", report.dependencies);
    println!("\n✓ Load finished");
    Ok(())
}

/// Handles the `stats` command
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    if let Some(url) = config.database_url()? {
        println!("Database: {}\n", url);
    }
    let sink = open_relational(config)?;
    let stats = load_statistics(&sink)?;
    print_statistics(&stats);
    Ok(())
}
