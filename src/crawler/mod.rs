//! Crawler module: the fetch/parse pipeline
//!
//! This module contains the core crawling logic, including:
//! - The fetcher walking the paginated API with retry and page shrinking
//! - The response parser filtering records and feeding the sinks
//! - Cooperative stop flags for both units
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod signal;

pub use coordinator::{run_crawl, Coordinator, CrawlReport};
pub use fetcher::{build_http_client, Crawler, FetchReport, FetchSettings, FetcherOutcome};
pub use parser::{ParseReport, ParserExit, ResponseParser};
pub use signal::StopSignal;

use crate::query::Target;
use serde_json::Value;

/// One decoded page travelling from the fetcher to the parser
///
/// A `None` payload marks the end of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub target: Target,
    pub payload: Option<Value>,
}

impl ResponseEnvelope {
    pub fn new(target: Target, payload: Value) -> Self {
        Self {
            target,
            payload: Some(payload),
        }
    }

    pub fn end_of_stream(target: Target) -> Self {
        Self {
            target,
            payload: None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.payload.is_none()
    }
}
