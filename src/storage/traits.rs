//! Storage traits and error types
//!
//! This module defines the sink interface consumed by the response parser
//! and the extra operations of relational sinks.

use crate::query::Target;
use crate::record::Record;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record of {target} has no primary key 'id'")]
    MissingId { target: Target },

    #[error("Schema migration required (current version {current}, head {head})")]
    MigrationRequired { current: u32, head: u32 },

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A persistence destination fed by the response parser
///
/// Only the parser task touches a sink, so implementations need `Send` but
/// not `Sync`.
pub trait Sink: Send {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Hands over the records of one page
    ///
    /// # Arguments
    ///
    /// * `target` - Resource kind the records belong to
    /// * `records` - Records that passed the filter chain
    fn save(&mut self, target: Target, records: &[Record]) -> StorageResult<()>;

    /// Makes everything saved so far durable
    fn commit(&mut self) -> StorageResult<()>;
}

/// A sink backed by a versioned relational schema
pub trait RelationalSink: Sink {
    /// Returns true when the schema is behind the compiled-in head
    ///
    /// A database without version information is stamped at version 0 and
    /// reported as requiring migration.
    fn is_migration_required(&mut self) -> StorageResult<bool>;

    /// Applies every pending migration
    fn migrate(&mut self) -> StorageResult<()>;
}
