//! SQLite relational sink
//!
//! This module provides the relational implementation of the Sink trait,
//! plus run bookkeeping and role dependency edges.

use crate::query::Target;
use crate::record::{parse_timestamp, record_id, record_name, summary_field, Record};
use crate::resolver::{DependencyEdge, DependencyResolver, RoleLookup};
use crate::storage::engine::DatabaseUrl;
use crate::storage::schema::{
    current_version, head_version, initialize_schema, numeric_columns, stamp, apply_migrations,
};
use crate::storage::traits::{RelationalSink, Sink, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

/// SQLite sink
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens the database named by `url`
    ///
    /// The schema is not migrated here; callers check
    /// [`RelationalSink::is_migration_required`] first.
    pub fn open(url: &DatabaseUrl) -> StorageResult<Self> {
        match url {
            DatabaseUrl::InMemory => Self::new_in_memory(),
            DatabaseUrl::Sqlite(path) => Self::new(path),
        }
    }

    /// Creates a new SqliteSink backed by a file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Fails with `MigrationRequired` unless the schema is at head
    pub fn ensure_migrated(&mut self) -> StorageResult<()> {
        if self.is_migration_required()? {
            return Err(StorageError::MigrationRequired {
                current: current_version(&self.conn)?.unwrap_or(0),
                head: head_version(),
            });
        }
        Ok(())
    }

    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    pub fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Closes a run with its final status
    pub fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    pub fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                })
            })
            .optional()?;

        Ok(run)
    }

    // ===== Records =====

    /// Number of stored records of `target`
    pub fn count_records(&self, target: Target) -> StorageResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", target.as_str());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Loads the raw documents of every stored record of `target`, ordered by id
    pub fn load_records(&self, target: Target) -> StorageResult<Vec<Record>> {
        let sql = format!("SELECT raw FROM {} ORDER BY id", target.as_str());
        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        raws.iter()
            .map(|raw| serde_json::from_str(raw).map_err(StorageError::from))
            .collect()
    }

    // ===== Dependencies =====

    /// Inserts dependency edges, ignoring ones already stored
    ///
    /// # Returns
    ///
    /// Number of newly inserted edges
    pub fn insert_dependencies(&mut self, edges: &[DependencyEdge]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO role_dependencies (from_role_id, to_role_id) VALUES (?1, ?2)",
            )?;
            for edge in edges {
                inserted += stmt.execute(params![edge.from_role_id, edge.to_role_id])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Number of stored dependency edges
    pub fn count_dependencies(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM role_dependencies", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Resolves dependency edges over every stored role and stores them
    ///
    /// Resolution failures other than cache I/O are logged by the resolver
    /// and never abort the call.
    pub async fn link_role_dependencies<L: RoleLookup>(
        &mut self,
        resolver: &mut DependencyResolver<L>,
    ) -> crate::Result<usize> {
        let roles = self.load_records(Target::Roles)?;
        tracing::info!("Try to resolve dependencies of {} roles.", roles.len());
        let edges = resolver.resolve(&roles).await?;
        let inserted = self.insert_dependencies(&edges)?;
        tracing::info!("{} dependency edges stored ({} resolved)", inserted, edges.len());
        Ok(inserted)
    }

    fn upsert(tx: &rusqlite::Transaction<'_>, target: Target, record: &Record) -> StorageResult<()> {
        let id = record_id(record).ok_or(StorageError::MissingId { target })?;

        let mut columns = vec!["id", "name"];
        let mut values = vec![
            SqlValue::Integer(id),
            record_name(record).map_or(SqlValue::Null, |n| SqlValue::Text(n.to_string())),
        ];

        if target.has_namespace() {
            columns.push("namespace");
            values.push(namespace_of(record).map_or(SqlValue::Null, SqlValue::Text));
        }
        for column in numeric_columns(target) {
            columns.push(column);
            values.push(to_sql_number(record.get(*column)));
        }
        if target == Target::Roles {
            columns.push("min_ansible_version");
            values.push(
                record
                    .get("min_ansible_version")
                    .and_then(Value::as_str)
                    .map_or(SqlValue::Null, |v| SqlValue::Text(v.to_string())),
            );
        }
        for column in ["created", "modified"] {
            columns.push(column);
            values.push(normalize_timestamp(target, id, column, record.get(column)));
        }
        columns.push("raw");
        values.push(SqlValue::Text(serde_json::to_string(record)?));

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = columns
            .iter()
            .skip(1)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
            target.as_str(),
            columns.join(", "),
            placeholders,
            updates
        );

        tx.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

impl Sink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn save(&mut self, target: Target, records: &[Record]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        for record in records {
            // Dropping the transaction on error rolls it back.
            Self::upsert(&tx, target, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        // Every save commits its own transaction; flush the WAL for durability.
        if !self.conn.is_autocommit() {
            return Err(StorageError::Database(
                "a transaction is still open".to_string(),
            ));
        }
        self.conn
            .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))
            .optional()?;
        Ok(())
    }
}

impl RelationalSink for SqliteSink {
    fn is_migration_required(&mut self) -> StorageResult<bool> {
        let head = head_version();
        let current = current_version(&self.conn)?;
        tracing::debug!("Schema version: Head-> {} Current -> {:?}", head, current);
        match current {
            Some(version) => Ok(version != head),
            None => {
                tracing::info!("Initialize database (version 0)");
                stamp(&self.conn, 0)?;
                Ok(true)
            }
        }
    }

    fn migrate(&mut self) -> StorageResult<()> {
        let applied = apply_migrations(&mut self.conn)?;
        tracing::info!("{} schema migrations applied (head {})", applied, head_version());
        Ok(())
    }
}

fn namespace_of(record: &Record) -> Option<String> {
    summary_field(record, "namespace")
        .and_then(|ns| ns.get("name"))
        .or_else(|| record.get("namespace").filter(|v| v.is_string()))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn to_sql_number(value: Option<&Value>) -> SqlValue {
    match value {
        Some(v) if v.is_i64() => v.as_i64().map_or(SqlValue::Null, SqlValue::Integer),
        Some(v) => v.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        None => SqlValue::Null,
    }
}

fn normalize_timestamp(target: Target, id: i64, column: &str, value: Option<&Value>) -> SqlValue {
    let Some(raw) = value.and_then(Value::as_str) else {
        return SqlValue::Null;
    };
    match parse_timestamp(raw) {
        Some(ts) => SqlValue::Text(ts.to_rfc3339()),
        None => {
            tracing::warn!(
                "Cannot parse {} '{}' of {} id={}. Store NULL instead.",
                column,
                raw,
                target,
                id
            );
            SqlValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DependencyRef;
    use crate::resolver::ResolveError;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoLookup;

    #[async_trait]
    impl RoleLookup for NoLookup {
        async fn dependencies_of(&self, _role_id: i64) -> Result<Vec<DependencyRef>, ResolveError> {
            Ok(Vec::new())
        }
    }

    fn migrated() -> SqliteSink {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.migrate().unwrap();
        sink
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn role(id: i64, name: &str, downloads: i64, deps: Value) -> Record {
        record(json!({
            "id": id,
            "name": name,
            "download_count": downloads,
            "stargazers_count": 1,
            "forks_count": 0,
            "min_ansible_version": "2.4",
            "created": "2019-03-01T10:00:00.123456Z",
            "modified": "not a date",
            "summary_fields": {"namespace": {"name": "ns"}, "dependencies": deps}
        }))
    }

    #[test]
    fn test_fresh_database_requires_migration() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        assert!(sink.is_migration_required().unwrap());
        assert_eq!(current_version(&sink.conn).unwrap(), Some(0));
        assert!(matches!(
            sink.ensure_migrated(),
            Err(StorageError::MigrationRequired { current: 0, .. })
        ));

        sink.migrate().unwrap();
        assert!(!sink.is_migration_required().unwrap());
        assert!(sink.ensure_migrated().is_ok());
    }

    #[test]
    fn test_save_upserts_by_id() {
        let mut sink = migrated();
        sink.save(Target::Roles, &[role(1, "nginx", 10, json!([]))]).unwrap();
        sink.save(Target::Roles, &[role(1, "nginx", 20, json!([])), role(2, "java", 5, json!([]))])
            .unwrap();
        sink.commit().unwrap();

        assert_eq!(sink.count_records(Target::Roles).unwrap(), 2);
        let downloads: i64 = sink
            .conn
            .query_row("SELECT download_count FROM roles WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(downloads, 20);
    }

    #[test]
    fn test_timestamps_are_normalized() {
        let mut sink = migrated();
        sink.save(Target::Roles, &[role(1, "nginx", 10, json!([]))]).unwrap();

        let (created, modified): (Option<String>, Option<String>) = sink
            .conn
            .query_row("SELECT created, modified FROM roles WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(created.as_deref(), Some("2019-03-01T10:00:00.123456+00:00"));
        assert_eq!(modified, None);
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let mut sink = migrated();
        let batch = [
            record(json!({"id": 1, "name": "web"})),
            record(json!({"name": "no id"})),
        ];
        let result = sink.save(Target::Tags, &batch);
        assert!(matches!(result, Err(StorageError::MissingId { .. })));
        assert_eq!(sink.count_records(Target::Tags).unwrap(), 0);
    }

    #[test]
    fn test_runs() {
        let mut sink = migrated();
        let run_id = sink.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        sink.finish_run(run_id, RunStatus::Completed).unwrap();
        let run = sink.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());

        assert!(matches!(
            sink.finish_run(999, RunStatus::Failed),
            Err(StorageError::RunNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_link_role_dependencies() {
        let mut sink = migrated();
        sink.save(
            Target::Roles,
            &[
                role(1, "a", 10, json!(["ns.b"])),
                role(2, "b", 10, json!(["ns.a", "gone.role"])),
            ],
        )
        .unwrap();

        let mut resolver = DependencyResolver::new(NoLookup);
        let inserted = sink.link_role_dependencies(&mut resolver).await.unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(sink.count_dependencies().unwrap(), 2);

        // Re-linking stores nothing new.
        let inserted = sink.link_role_dependencies(&mut resolver).await.unwrap();
        assert_eq!(inserted, 0);
    }
}
