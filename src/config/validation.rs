use crate::config::types::{ApiConfig, Config, CrawlerConfig, OutputConfig, OutputFormat};
use crate::filter::FilterChain;
use crate::query::{QueryOrder, Target};
use crate::storage::DatabaseUrl;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Largest page size the API accepts
const MAX_PAGE_SIZE: u32 = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates remote API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_page_size(config.page_size)?;

    if config.channel_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "channel-capacity must be >= 1, got {}",
            config.channel_capacity
        )));
    }

    if config.receive_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "receive-timeout-secs must be >= 1, got {}",
            config.receive_timeout_secs
        )));
    }

    if config.commit_every < 1 {
        return Err(ConfigError::Validation(format!(
            "commit-every must be >= 1, got {}",
            config.commit_every
        )));
    }

    if config.targets.is_empty() {
        return Err(ConfigError::Validation(
            "at least one target is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for raw in &config.targets {
        let target: Target = raw.parse()?;
        if !seen.insert(target) {
            return Err(ConfigError::Validation(format!(
                "target '{}' is listed more than once",
                target
            )));
        }
    }

    config.order_by.parse::<QueryOrder>()?;
    FilterChain::from_exprs(&config.filters)?;

    Ok(())
}

/// Page sizes must be a power of ten so a failing page splits into whole sub-pages
fn validate_page_size(page_size: u32) -> Result<(), ConfigError> {
    let mut n = page_size;
    while n >= 10 && n % 10 == 0 {
        n /= 10;
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE || n != 1 {
        return Err(ConfigError::Validation(format!(
            "page-size must be a power of ten between 1 and {}, got {}",
            MAX_PAGE_SIZE, page_size
        )));
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.formats.is_empty() {
        return Err(ConfigError::Validation(
            "at least one output format is required".to_string(),
        ));
    }

    let formats = config
        .formats
        .iter()
        .map(|f| f.parse::<OutputFormat>())
        .collect::<Result<Vec<_>, _>>()?;

    match (&config.database_url, formats.contains(&OutputFormat::Sqlite)) {
        (Some(url), _) => {
            DatabaseUrl::parse(url)?;
        }
        (None, true) => {
            return Err(ConfigError::Validation(
                "database-url is required when the sqlite format is enabled".to_string(),
            ));
        }
        (None, false) => {}
    }

    Ok(())
}
