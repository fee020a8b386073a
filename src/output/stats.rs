//! Statistics generation from the relational store
//!
//! This module provides functionality for extracting and displaying
//! what a crawl or a load left in the SQLite database.

use crate::query::Target;
use crate::storage::{RunRecord, SqliteSink};
use crate::CrawlerError;
use std::collections::BTreeMap;

/// Relational store statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Row count per target table
    pub records_by_target: BTreeMap<Target, u64>,

    /// Number of role dependency edges
    pub dependencies: u64,

    /// Most recent crawl run, if any was recorded
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Total rows across all target tables
    pub fn total_records(&self) -> u64 {
        self.records_by_target.values().sum()
    }
}

/// Loads statistics from the relational store
///
/// # Arguments
///
/// * `sink` - A migrated SQLite sink
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlerError)` - Failed to query statistics
pub fn load_statistics(sink: &SqliteSink) -> Result<CrawlStatistics, CrawlerError> {
    let mut records_by_target = BTreeMap::new();
    for target in Target::LOAD_ORDER {
        records_by_target.insert(target, sink.count_records(target)?);
    }

    Ok(CrawlStatistics {
        records_by_target,
        dependencies: sink.count_dependencies()?,
        latest_run: sink.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Galaxy Statistics ===\n");

    println!("Records by Target:");
    let total = stats.total_records();
    for (target, count) in &stats.records_by_target {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", target, count, percentage);
    }
    println!("  Total: {}", total);
    println!();

    println!("Role dependency edges: {}", stats.dependencies);
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  Id: {}", run.id);
            println!("  Started: {}", run.started_at);
            println!(
                "  Finished: {}",
                run.finished_at.as_deref().unwrap_or("(not finished)")
            );
            println!("  Status: {}", run.status.to_db_string());
            println!("  Config hash: {}", run.config_hash);
        }
        None => println!("No crawl runs recorded"),
    }
}
