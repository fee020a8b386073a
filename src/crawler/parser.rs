//! Response parser
//!
//! Consumer half of the pipeline: drains the payload channel, filters the
//! records of each page and hands the survivors to every sink.

use crate::crawler::signal::StopSignal;
use crate::crawler::ResponseEnvelope;
use crate::filter::FilterChain;
use crate::query::Target;
use crate::record::Record;
use crate::storage::Sink;
use crate::CrawlerError;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Why the parse loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserExit {
    /// An end-of-stream envelope arrived
    EndOfStream,
    /// Every sender went away
    ChannelClosed,
    /// A record failed the filter chain
    EarlyStop,
    /// The stop flag was raised from outside
    StopRequested,
}

/// Summary of a finished parse loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseReport {
    pub pages_parsed: u64,
    pub records_saved: u64,
    pub exit: ParserExit,
}

impl ParseReport {
    pub fn early_stopped(&self) -> bool {
        self.exit == ParserExit::EarlyStop
    }
}

/// Consumer half of the pipeline
pub struct ResponseParser {
    rx: mpsc::Receiver<ResponseEnvelope>,
    sinks: Vec<Box<dyn Sink>>,
    filters: FilterChain,
    commit_every: u32,
    receive_timeout: Duration,
    stop: StopSignal,
    pages_parsed: u64,
    records_saved: u64,
}

impl ResponseParser {
    pub fn new(
        rx: mpsc::Receiver<ResponseEnvelope>,
        sinks: Vec<Box<dyn Sink>>,
        filters: FilterChain,
        stop: StopSignal,
    ) -> Self {
        Self {
            rx,
            sinks,
            filters,
            commit_every: 10,
            receive_timeout: Duration::from_secs(3),
            stop,
            pages_parsed: 0,
            records_saved: 0,
        }
    }

    /// Commit sinks every `pages` pages
    pub fn with_commit_every(mut self, pages: u32) -> Self {
        self.commit_every = pages.max(1);
        self
    }

    /// How long one receive waits before the stop flag is checked again
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Runs the parse loop
    ///
    /// Sinks are committed on every exit path. A payload without a
    /// `results` list ends the loop with `MalformedResponse`.
    pub async fn run(mut self) -> crate::Result<ParseReport> {
        let result = self.parse_loop().await;

        self.stop.stop();
        if let Err(e) = &result {
            tracing::error!("{}", e);
        }
        tracing::info!("Saving obtained information...");
        self.commit_all();
        tracing::info!("Parser finished");

        result.map(|exit| ParseReport {
            pages_parsed: self.pages_parsed,
            records_saved: self.records_saved,
            exit,
        })
    }

    async fn parse_loop(&mut self) -> crate::Result<ParserExit> {
        loop {
            if self.stop.is_stopped() {
                return Ok(ParserExit::StopRequested);
            }

            let envelope = match tokio::time::timeout(self.receive_timeout, self.rx.recv()).await {
                Err(_) => continue,
                Ok(None) => return Ok(ParserExit::ChannelClosed),
                Ok(Some(envelope)) => envelope,
            };

            let target = envelope.target;
            let Some(payload) = envelope.payload else {
                tracing::info!("Scraping finished");
                return Ok(ParserExit::EndOfStream);
            };

            if let Some(link) = payload.get("next_link").and_then(Value::as_str) {
                tracing::debug!("Next link was found: {}", link);
            }

            let results = payload
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    CrawlerError::MalformedResponse(format!(
                        "Failed to parse response. Returned json for {} has no results.",
                        target
                    ))
                })?;
            tracing::info!("{} {} were found.", results.len(), target);

            let (accepted, early_stop) = self.apply_filters(target, results);
            self.save_all(target, &accepted);
            self.pages_parsed += 1;

            if self.pages_parsed % u64::from(self.commit_every) == 0 {
                self.commit_all();
            }

            if early_stop {
                self.stop.stop();
                return Ok(ParserExit::EarlyStop);
            }
            tracing::info!("Wait for next response...");
        }
    }

    /// Records passing the chain, up to the first failing one
    fn apply_filters(&self, target: Target, results: &[Value]) -> (Vec<Record>, bool) {
        let mut accepted = Vec::with_capacity(results.len());
        for item in results {
            let Some(record) = item.as_object() else {
                tracing::warn!("Skip a {} result that is not an object", target);
                continue;
            };
            if !self.filters.passed(target, record) {
                tracing::info!(
                    "A {} record fell below the filter threshold; stopping",
                    target
                );
                return (accepted, true);
            }
            accepted.push(record.clone());
        }
        (accepted, false)
    }

    fn save_all(&mut self, target: Target, records: &[Record]) {
        if records.is_empty() {
            return;
        }
        let mut saved = false;
        for sink in &mut self.sinks {
            match sink.save(target, records) {
                Ok(()) => saved = true,
                Err(e) => tracing::error!("{} sink failed to save {}: {}", sink.name(), target, e),
            }
        }
        if saved {
            self.records_saved += records.len() as u64;
        }
    }

    fn commit_all(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.commit() {
                tracing::error!("{} sink failed to commit: {}", sink.name(), e);
            }
        }
    }
}
