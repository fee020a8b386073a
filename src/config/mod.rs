//! Configuration module for the Galaxy crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! with `GALAXY_CRAWLER_*` environment variables overriding file values.
//!
//! # Example
//!
//! ```no_run
//! use galaxy_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Crawler will sort by: {}", config.crawler.order_by);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, Config, CrawlerConfig, OutputConfig, OutputFormat};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash,
    ENV_VARS_PREFIX,
};
pub use validation::validate;
