use crate::filter::FilterChain;
use crate::query::{QueryOrder, Target, DEFAULT_API_BASE_URL};
use crate::storage::DatabaseUrl;
use crate::{ConfigError, ConfigResult};
use serde::Deserialize;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Root of the v1 API, e.g. `https://galaxy.ansible.com/api/v1/`
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Whether to request deprecated records
    #[serde(default)]
    pub deprecated: bool,

    /// Total request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Optional User-Agent header value
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Sleep between successful fetches (seconds)
    #[serde(rename = "interval-secs", default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Number of retries for failed requests
    #[serde(default = "default_retry")]
    pub retry: u32,

    /// Additional delay between retries of the same request (milliseconds)
    #[serde(rename = "retry-delay-ms", default)]
    pub retry_delay_ms: u64,

    /// Records per page in normal operation
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Capacity of the fetch-to-parse payload channel
    #[serde(rename = "channel-capacity", default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long the parser waits on the channel before re-checking its stop flag (seconds)
    #[serde(rename = "receive-timeout-secs", default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,

    /// Commit sinks every N pages
    #[serde(rename = "commit-every", default = "default_commit_every")]
    pub commit_every: u32,

    /// Resource kinds to crawl, in order
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,

    /// Sort key
    #[serde(rename = "order-by", default = "default_order_by")]
    pub order_by: String,

    /// Ascending order instead of the default descending order
    #[serde(default)]
    pub inverse: bool,

    /// Filter expressions such as `download>500`
    #[serde(default)]
    pub filters: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving JSON batches and the role id cache
    pub directory: String,

    /// Enabled sinks: `json`, `sqlite`
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    /// Relational store URL, e.g. `sqlite:///./out/galaxy.db`
    #[serde(rename = "database-url", default)]
    pub database_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            deprecated: false,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: None,
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retry: default_retry(),
            retry_delay_ms: 0,
            page_size: default_page_size(),
            channel_capacity: default_channel_capacity(),
            receive_timeout_secs: default_receive_timeout_secs(),
            commit_every: default_commit_every(),
            targets: default_targets(),
            order_by: default_order_by(),
            inverse: false,
            filters: Vec::new(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    10
}

fn default_retry() -> u32 {
    3
}

fn default_page_size() -> u32 {
    100
}

fn default_channel_capacity() -> usize {
    16
}

fn default_receive_timeout_secs() -> u64 {
    3
}

fn default_commit_every() -> u32 {
    10
}

fn default_targets() -> Vec<String> {
    [
        "tags",
        "platforms",
        "providers",
        "namespaces",
        "provider_namespaces",
        "roles",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_order_by() -> String {
    "download".to_string()
}

fn default_formats() -> Vec<String> {
    vec!["json".to_string()]
}

/// Enabled persistence destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Sqlite,
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" | "rdb" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "Output format '{}' is not supported",
                other
            ))),
        }
    }
}

impl Config {
    /// Targets to crawl, in configured order
    pub fn targets(&self) -> ConfigResult<Vec<Target>> {
        self.crawler.targets.iter().map(|t| t.parse()).collect()
    }

    /// Sort key for every target
    pub fn order(&self) -> ConfigResult<QueryOrder> {
        self.crawler.order_by.parse()
    }

    /// Filters applied by the parser
    pub fn filter_chain(&self) -> ConfigResult<FilterChain> {
        Ok(FilterChain::from_exprs(&self.crawler.filters)?)
    }

    /// Enabled output formats
    pub fn formats(&self) -> ConfigResult<Vec<OutputFormat>> {
        self.output.formats.iter().map(|f| f.parse()).collect()
    }

    /// Parsed relational store URL, if configured
    pub fn database_url(&self) -> ConfigResult<Option<DatabaseUrl>> {
        self.output
            .database_url
            .as_deref()
            .map(DatabaseUrl::parse)
            .transpose()
    }
}
