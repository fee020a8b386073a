//! Storage module for persisting crawled records
//!
//! This module handles every persistence destination of the crawler, including:
//! - JSON batch files, one per target and commit
//! - SQLite tables per target with schema migrations
//! - Role dependency edges and run tracking
//! - Loading JSON batch files into the relational store

mod engine;
mod json;
mod loader;
mod schema;
mod sqlite;
mod traits;

pub use engine::DatabaseUrl;
pub use json::{batch_path, list_batches, BatchFile, JsonSink};
pub use loader::{load_json_dir, read_target, LoadReport};
pub use schema::head_version;
pub use sqlite::SqliteSink;
pub use traits::{RelationalSink, Sink, StorageError, StorageResult};

use crate::config::{Config, OutputFormat};
use std::path::Path;

/// Opens every sink enabled in the configuration
///
/// The relational sink must already be migrated.
///
/// # Returns
///
/// * `Ok(Vec<Box<dyn Sink>>)` - Sinks in configured order
/// * `Err(CrawlerError)` - A sink could not be opened or needs migration
pub fn open_sinks(config: &Config) -> crate::Result<Vec<Box<dyn Sink>>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    for format in config.formats()? {
        match format {
            OutputFormat::Json => {
                sinks.push(Box::new(JsonSink::new(Path::new(&config.output.directory))?));
            }
            OutputFormat::Sqlite => {
                sinks.push(Box::new(open_relational(config)?));
            }
        }
    }
    Ok(sinks)
}

/// Opens the configured relational store and checks its schema version
///
/// An in-memory database lives only as long as the returned sink, so it is
/// migrated here. File databases must be brought to head with `migrate`.
pub fn open_relational(config: &Config) -> crate::Result<SqliteSink> {
    let url = config.database_url()?.ok_or_else(|| {
        crate::ConfigError::Validation("database-url is not configured".to_string())
    })?;
    let mut sink = SqliteSink::open(&url)?;
    if url == DatabaseUrl::InMemory && sink.is_migration_required()? {
        sink.migrate()?;
    }
    sink.ensure_migrated()?;
    Ok(sink)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    EarlyStopped,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::EarlyStopped => "early_stopped",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "early_stopped" => Some(Self::EarlyStopped),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
