//! Output module for crawl summaries
//!
//! This module handles:
//! - Reading per-target statistics back from the relational store
//! - Printing them for the `stats` command

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
