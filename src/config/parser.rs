use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Prefix of environment variables overriding file values
pub const ENV_VARS_PREFIX: &str = "GALAXY_CRAWLER_";

/// Loads and parses a configuration file from the given path
///
/// Environment variables prefixed with `GALAXY_CRAWLER_` override file
/// values before validation.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use galaxy_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// println!("Interval: {}s", config.crawler.interval_secs);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Applies `GALAXY_CRAWLER_*` overrides read through `lookup`
///
/// Values that cannot be parsed are ignored with a warning, leaving the
/// file value in place.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        let key = format!("{}{}", ENV_VARS_PREFIX, name);
        lookup(&key).map(|v| (key, v))
    };

    if let Some((key, value)) = get("INTERVAL") {
        match value.trim().parse() {
            Ok(v) => config.crawler.interval_secs = v,
            Err(_) => tracing::warn!("Cannot parse {}. Use configured value instead.", key),
        }
    }
    if let Some((key, value)) = get("RETRY") {
        match value.trim().parse() {
            Ok(v) => config.crawler.retry = v,
            Err(_) => tracing::warn!("Cannot parse {}. Use configured value instead.", key),
        }
    }
    if let Some((key, value)) = get("INVERSE") {
        match parse_bool(&value) {
            Some(v) => config.crawler.inverse = v,
            None => tracing::warn!("Cannot parse {}. Use configured value instead.", key),
        }
    }
    if let Some((_, value)) = get("ORDER_BY") {
        config.crawler.order_by = value.trim().to_lowercase();
    }
    if let Some((_, value)) = get("FILTERS") {
        config.crawler.filters = split_list(&value);
    }
    if let Some((_, value)) = get("TARGETS") {
        config.crawler.targets = split_list(&value);
    }
    if let Some((_, value)) = get("OUTPUT_FORMAT") {
        config.output.formats = split_list(&value);
    }
    if let Some((_, value)) = get("OUTPUT_DIR") {
        config.output.directory = value;
    }
    if let Some((_, value)) = get("DATABASE_URL") {
        config.output.database_url = Some(value);
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" | "t" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "f" => Some(false),
        _ => None,
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to tell crawl runs recorded in the relational store apart.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
