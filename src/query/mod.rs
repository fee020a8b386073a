//! Query module for addressing the Galaxy collection endpoints
//!
//! This module contains:
//! - `Target`: the crawlable resource kinds
//! - `QueryOrder`: sort keys and their per-target fields
//! - `Paginator`: page cursor with adaptive failure recovery
//! - `QueryBuilder`: request URL construction

mod builder;
mod order;
mod paginator;
mod target;

pub use builder::{QueryBuilder, DEFAULT_API_BASE_URL};
pub use order::QueryOrder;
pub use paginator::{Page, Paginator};
pub use target::Target;

use thiserror::Error;

/// Errors raised while building queries or recovering pagination
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Page size {page_size} cannot be shrunk any further")]
    Unshrinkable { page_size: u32 },

    #[error("No page has been requested yet, nothing to retry")]
    NothingToRetry,

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}
