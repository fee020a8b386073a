//! Crawler coordinator - main crawl orchestration logic
//!
//! This module wires the fetcher and the response parser together:
//! - Building the HTTP client, query builder and filter chain from config
//! - Running both units as tokio tasks over a bounded channel
//! - Stopping the fetcher once the parser is gone
//! - Handling Ctrl-C by stopping both units

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, Crawler, FetchSettings, FetcherOutcome};
use crate::crawler::parser::{ParserExit, ResponseParser};
use crate::crawler::signal::StopSignal;
use crate::filter::{parse_expr, FilterField};
use crate::query::{QueryBuilder, QueryOrder};
use crate::storage::{open_sinks, Sink};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Summary of a finished crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub pages_fetched: u64,
    pub pages_parsed: u64,
    pub records_saved: u64,
    /// A record failed the filter chain and ended the crawl
    pub early_stopped: bool,
    /// Ctrl-C or an external stop ended the crawl
    pub interrupted: bool,
    pub fetcher: FetcherOutcome,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    crawler: Crawler,
    parser: ResponseParser,
    fetch_stop: StopSignal,
    parse_stop: StopSignal,
    handle_ctrl_c: bool,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `sinks` - Destinations for the records that pass the filters
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlerError)` - Invalid configuration or HTTP client failure
    pub fn new(config: &Config, sinks: Vec<Box<dyn Sink>>) -> crate::Result<Self> {
        let targets = config.targets()?;
        let order = config.order()?;
        let filters = config.filter_chain()?;
        warn_on_unsorted_filters(&config.crawler.filters, order);

        let client = build_http_client(&config.api)?;
        let builder = QueryBuilder::new(
            &config.api.base_url,
            config.api.deprecated,
            config.crawler.page_size,
        )?;

        let settings = FetchSettings {
            targets,
            order,
            ascending: config.crawler.inverse,
            page_size: config.crawler.page_size,
            retry: config.crawler.retry,
            retry_delay: Duration::from_millis(config.crawler.retry_delay_ms),
            interval: Duration::from_secs(config.crawler.interval_secs),
        };

        let (tx, rx) = mpsc::channel(config.crawler.channel_capacity.max(1));
        let fetch_stop = StopSignal::new();
        let parse_stop = StopSignal::new();

        let crawler = Crawler::new(client, builder, settings, tx, fetch_stop.clone());
        let parser = ResponseParser::new(rx, sinks, filters, parse_stop.clone())
            .with_commit_every(config.crawler.commit_every)
            .with_receive_timeout(Duration::from_secs(config.crawler.receive_timeout_secs));

        Ok(Self {
            crawler,
            parser,
            fetch_stop,
            parse_stop,
            handle_ctrl_c: true,
        })
    }

    /// Whether Ctrl-C stops the crawl (enabled by default)
    pub fn with_ctrl_c(mut self, enabled: bool) -> Self {
        self.handle_ctrl_c = enabled;
        self
    }

    /// Stop flags of the fetcher and the parser, in that order
    pub fn stop_signals(&self) -> (StopSignal, StopSignal) {
        (self.fetch_stop.clone(), self.parse_stop.clone())
    }

    /// Runs the crawl until the fetcher runs out of targets, the parser
    /// stops early, or the crawl is interrupted
    ///
    /// The fetcher's fatal failure, or the parser's, is returned as the error.
    pub async fn run(self) -> crate::Result<CrawlReport> {
        let Coordinator {
            crawler,
            parser,
            fetch_stop,
            parse_stop,
            handle_ctrl_c,
        } = self;

        let start_time = Instant::now();
        tracing::info!("Starting crawl");

        let fetch_task = tokio::spawn(crawler.run());
        let parse_task = tokio::spawn(parser.run());

        let watcher = handle_ctrl_c.then(|| {
            let fetch_stop = fetch_stop.clone();
            let parse_stop = parse_stop.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::error!("SIGINT received.");
                        parse_stop.stop();
                        fetch_stop.stop();
                    }
                    Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {}", e),
                }
            })
        });

        // Once the parser is gone nothing consumes pages; the fetcher must stop.
        let parse_then_stop_fetcher = async {
            let joined = parse_task.await;
            fetch_stop.stop();
            joined
        };
        let (fetch_joined, parse_joined) = tokio::join!(fetch_task, parse_then_stop_fetcher);

        if let Some(watcher) = watcher {
            watcher.abort();
        }

        let fetch = fetch_joined??;
        let parse = parse_joined??;

        let report = CrawlReport {
            pages_fetched: fetch.pages_fetched,
            pages_parsed: parse.pages_parsed,
            records_saved: parse.records_saved,
            early_stopped: parse.early_stopped(),
            interrupted: parse.exit == ParserExit::StopRequested,
            fetcher: fetch.outcome,
        };

        tracing::info!(
            "Crawl finished: {} pages fetched, {} records saved in {:?}",
            report.pages_fetched,
            report.records_saved,
            start_time.elapsed()
        );

        Ok(report)
    }
}

/// Early stop assumes records arrive sorted by the filtered field
fn warn_on_unsorted_filters(exprs: &[String], order: QueryOrder) {
    for expr in exprs {
        let Ok((field, _, _)) = parse_expr(expr) else {
            continue;
        };
        let sorted_by = match field {
            FilterField::Download => QueryOrder::Download,
            FilterField::Star => QueryOrder::Star,
            FilterField::Fork => QueryOrder::Fork,
            FilterField::Ansible => {
                tracing::warn!(
                    "Filter `{}` cannot match the sort order; the crawl may stop early",
                    expr
                );
                continue;
            }
        };
        if sorted_by != order {
            tracing::warn!(
                "Filter `{}` tests a field other than the sort key '{}'; the crawl may stop early",
                expr,
                order.as_str()
            );
        }
    }
}

/// Runs a complete crawl with the sinks enabled in the configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl ended normally, early or by interruption
/// * `Err(CrawlerError)` - Crawl failed with an error
///
/// # Example
///
/// ```no_run
/// use galaxy_crawler::config::load_config;
/// use galaxy_crawler::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("crawler.toml"))?;
/// let report = run_crawl(&config).await?;
/// println!("{} records saved", report.records_saved);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: &Config) -> crate::Result<CrawlReport> {
    let sinks = open_sinks(config)?;
    Coordinator::new(config, sinks)?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, extra: &str) -> Config {
        let text = format!(
            "[api]\nbase-url = \"{}\"\n[crawler]\ninterval-secs = 0\n{}\n[output]\ndirectory = \"out\"\n",
            base_url, extra
        );
        toml::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_coordinator_rejects_bad_target() {
        let cfg = config("http://127.0.0.1:9/", "targets = [\"collections\"]");
        assert!(matches!(
            Coordinator::new(&cfg, Vec::new()),
            Err(crate::CrawlerError::Config(crate::ConfigError::UnsupportedTarget(_)))
        ));
    }

    #[tokio::test]
    async fn test_external_stop_interrupts_crawl() {
        let cfg = config("http://127.0.0.1:9/", "targets = [\"roles\"]");
        let coordinator = Coordinator::new(&cfg, Vec::new()).unwrap().with_ctrl_c(false);
        let (fetch_stop, parse_stop) = coordinator.stop_signals();
        fetch_stop.stop();
        parse_stop.stop();

        let report = coordinator.run().await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.fetcher, FetcherOutcome::Stopped);
        assert_eq!(report.pages_fetched, 0);
    }
}
