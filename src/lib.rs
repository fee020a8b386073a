//! Galaxy Crawler: a resilient bulk extractor for the Ansible Galaxy API
//!
//! This crate walks the paginated Galaxy REST API one resource kind at a
//! time, shrinking page sizes around server errors, filters the decoded
//! records against thresholds and persists them to JSON batch files or a
//! SQLite store. A secondary pass resolves role dependency references.

pub mod config;
pub mod crawler;
pub mod filter;
pub mod output;
pub mod query;
pub mod record;
pub mod resolver;
pub mod storage;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Filter error: {0}")]
    Filter(#[from] filter::FilterError),

    #[error("Query error: {0}")]
    Query(#[from] query::QueryError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Dependency resolution error: {0}")]
    Resolve(#[from] resolver::ResolveError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request to {url} failed after {attempts} attempts")]
    RequestFailed { url: String, attempts: u32 },

    #[error("Unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unsupported target: {0}")]
    UnsupportedTarget(String),

    #[error("Unsupported order key: {0}")]
    UnsupportedOrder(String),

    #[error("Unsupported storage URL: {0}")]
    UnsupportedStorage(String),

    #[error("Invalid filter: {0}")]
    Filter(#[from] filter::FilterError),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Coordinator, CrawlReport};
pub use filter::{Filter, FilterChain};
pub use query::{Paginator, QueryBuilder, QueryOrder, Target};
pub use record::Record;
