//! API fetcher
//!
//! This module walks the paginated API one target at a time, including:
//! - Building the HTTP client from the API configuration
//! - Requesting pages with a bounded retry budget
//! - Advancing to the next target on 404
//! - Shrinking the page size around 500 responses
//! - Rate limiting between successful fetches

use crate::config::ApiConfig;
use crate::crawler::signal::StopSignal;
use crate::crawler::ResponseEnvelope;
use crate::query::{Paginator, QueryBuilder, QueryError, QueryOrder, Target};
use crate::CrawlerError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The API configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("galaxy-crawler/{}", env!("CARGO_PKG_VERSION")));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Crawl behavior of a [`Crawler`]
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub targets: Vec<Target>,
    pub order: QueryOrder,
    pub ascending: bool,
    pub page_size: u32,
    /// Retries after the first failed attempt of a request
    pub retry: u32,
    pub retry_delay: Duration,
    pub interval: Duration,
}

/// How the fetch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherOutcome {
    /// Every target returned 404
    Completed,
    /// The stop flag was raised or the parser went away
    Stopped,
}

/// Summary of a finished fetch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub pages_fetched: u64,
    pub outcome: FetcherOutcome,
}

/// Result of requesting one page
#[derive(Debug)]
enum PageFetch {
    Payload(Value),
    /// 404: the current target has no more pages
    Exhausted,
    /// 500: the paginator now walks the failing span in smaller pages
    Shrunk,
    /// 500 on a single-record page
    Skipped,
    Stopped,
}

/// Producer half of the pipeline
pub struct Crawler {
    client: Client,
    builder: QueryBuilder,
    settings: FetchSettings,
    position: usize,
    paginator: Paginator,
    tx: mpsc::Sender<ResponseEnvelope>,
    stop: StopSignal,
    pages_fetched: u64,
}

impl Crawler {
    pub fn new(
        client: Client,
        builder: QueryBuilder,
        settings: FetchSettings,
        tx: mpsc::Sender<ResponseEnvelope>,
        stop: StopSignal,
    ) -> Self {
        let paginator = Paginator::new(settings.page_size);
        Self {
            client,
            builder,
            settings,
            position: 0,
            paginator,
            tx,
            stop,
            pages_fetched: 0,
        }
    }

    /// Target currently being crawled, `None` once all are done
    pub fn current_target(&self) -> Option<Target> {
        self.settings.targets.get(self.position).copied()
    }

    /// Runs the fetch loop until every target is exhausted, the stop flag is
    /// raised or a request fails for good
    ///
    /// The payload channel always receives an end-of-stream envelope (when
    /// it has room) and is closed on return.
    pub async fn run(mut self) -> crate::Result<FetchReport> {
        let result = self.crawl_loop().await;

        if let Err(e) = &result {
            tracing::error!("Crawler failed: {}", e);
            self.stop.stop();
        }
        self.finish();

        result.map(|outcome| FetchReport {
            pages_fetched: self.pages_fetched,
            outcome,
        })
    }

    async fn crawl_loop(&mut self) -> crate::Result<FetcherOutcome> {
        loop {
            if self.stop.is_stopped() {
                return Ok(FetcherOutcome::Stopped);
            }
            let Some(target) = self.current_target() else {
                return Ok(FetcherOutcome::Completed);
            };

            let page = self.paginator.next_page();
            let url = self
                .builder
                .order_by(self.settings.order, self.settings.ascending)
                .set_page(page)
                .build(target)?;

            match self.fetch_page(&url).await? {
                PageFetch::Payload(body) => {
                    self.pages_fetched += 1;
                    let envelope = ResponseEnvelope::new(target, body);
                    tokio::select! {
                        sent = self.tx.send(envelope) => {
                            if sent.is_err() {
                                tracing::info!("Parser closed the payload channel");
                                return Ok(FetcherOutcome::Stopped);
                            }
                        }
                        _ = self.stop.stopped() => return Ok(FetcherOutcome::Stopped),
                    }
                    self.wait().await;
                }
                PageFetch::Exhausted => {
                    tracing::info!("Done: {}", target);
                    self.next_target();
                }
                PageFetch::Shrunk | PageFetch::Skipped => {}
                PageFetch::Stopped => return Ok(FetcherOutcome::Stopped),
            }
        }
    }

    /// Requests `url`, retrying failed attempts up to the retry budget
    async fn fetch_page(&mut self, url: &Url) -> crate::Result<PageFetch> {
        let attempts = self.settings.retry + 1;
        let mut failures = 0;

        loop {
            match self.request(url).await {
                Ok(fetch) => return Ok(fetch),
                Err(e) => {
                    failures += 1;
                    if failures >= attempts {
                        tracing::error!("Retry count over the threshold for '{}': {}", url, e);
                        return Err(CrawlerError::RequestFailed {
                            url: url.to_string(),
                            attempts,
                        });
                    }
                    tracing::error!(
                        "Request to '{}' was failed with {}. Retrying...{}/{}",
                        url,
                        e,
                        failures,
                        self.settings.retry
                    );
                }
            }

            if self.stop.is_stopped() {
                return Ok(PageFetch::Stopped);
            }
            if !self.settings.retry_delay.is_zero() {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }
    }

    async fn request(&mut self, url: &Url) -> crate::Result<PageFetch> {
        let http_error = |source| CrawlerError::Http {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        match status {
            s if s.is_success() => {
                tracing::info!("{}: '{}'", status.as_u16(), url);
                let body: Value = response.json().await.map_err(http_error)?;
                Ok(PageFetch::Payload(body))
            }
            StatusCode::NOT_FOUND => {
                tracing::warn!("{}: '{}'", status.as_u16(), url);
                Ok(PageFetch::Exhausted)
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::warn!("{}: '{}'", status.as_u16(), url);
                Ok(self.shrink_or_skip(url))
            }
            _ => Err(CrawlerError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    fn shrink_or_skip(&mut self, url: &Url) -> PageFetch {
        if Paginator::extract_page_size(url) == Some(1) {
            tracing::warn!("Skip due to 500: {}", url);
            return PageFetch::Skipped;
        }
        match self.paginator.enter_failed_state() {
            Ok(()) => {
                tracing::info!(
                    "Retry the failed span with page size {}",
                    self.paginator.page_size()
                );
                PageFetch::Shrunk
            }
            Err(e @ (QueryError::Unshrinkable { .. } | QueryError::NothingToRetry)) => {
                tracing::warn!("Skip due to 500 ({}): {}", e, url);
                PageFetch::Skipped
            }
            Err(e) => {
                tracing::error!("Cannot shrink page for {}: {}", url, e);
                PageFetch::Skipped
            }
        }
    }

    fn next_target(&mut self) {
        self.position += 1;
        self.paginator = Paginator::new(self.settings.page_size);
    }

    async fn wait(&self) {
        if self.settings.interval.is_zero() {
            return;
        }
        tracing::info!("Wait for {} sec", self.settings.interval.as_secs_f64());
        tokio::select! {
            _ = tokio::time::sleep(self.settings.interval) => {}
            _ = self.stop.stopped() => {}
        }
    }

    fn finish(&mut self) {
        let target = self
            .current_target()
            .or_else(|| self.settings.targets.last().copied());
        if let Some(target) = target {
            if self.tx.try_send(ResponseEnvelope::end_of_stream(target)).is_err() {
                tracing::debug!("Payload channel full or closed; end-of-stream marker dropped");
            }
        }
        tracing::info!("Crawler finished");
    }
}
