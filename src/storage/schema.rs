//! Database schema definitions and migrations
//!
//! The version table is created on open. Everything else is created by
//! numbered migrations, applied in order by [`apply_migrations`].

use crate::query::Target;
use rusqlite::{params, Connection, OptionalExtension};

/// SQL creating the version bookkeeping table
pub const VERSION_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER NOT NULL
);
"#;

const MIGRATION_1_INIT: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS providers (
    id INTEGER PRIMARY KEY,
    name TEXT,
    created TEXT,
    modified TEXT,
    raw TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS platforms (
    id INTEGER PRIMARY KEY,
    name TEXT,
    created TEXT,
    modified TEXT,
    raw TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT,
    created TEXT,
    modified TEXT,
    raw TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS namespaces (
    id INTEGER PRIMARY KEY,
    name TEXT,
    created TEXT,
    modified TEXT,
    raw TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS provider_namespaces (
    id INTEGER PRIMARY KEY,
    name TEXT,
    namespace TEXT,
    created TEXT,
    modified TEXT,
    raw TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    name TEXT,
    namespace TEXT,
    download_count INTEGER,
    stargazers_count INTEGER,
    forks_count INTEGER,
    watchers_count INTEGER,
    created TEXT,
    modified TEXT,
    raw TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS roles (
    id INTEGER PRIMARY KEY,
    name TEXT,
    namespace TEXT,
    download_count INTEGER,
    stargazers_count INTEGER,
    forks_count INTEGER,
    min_ansible_version TEXT,
    created TEXT,
    modified TEXT,
    raw TEXT NOT NULL
);

-- Resolved role dependency edges
CREATE TABLE IF NOT EXISTS role_dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_role_id INTEGER NOT NULL,
    to_role_id INTEGER NOT NULL,
    UNIQUE(from_role_id, to_role_id)
);
"#;

const MIGRATION_2_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_roles_namespace_name ON roles(namespace, name);
CREATE INDEX IF NOT EXISTS idx_repositories_namespace ON repositories(namespace);
CREATE INDEX IF NOT EXISTS idx_role_dependencies_to ON role_dependencies(to_role_id);
"#;

/// Migrations in application order; version `i + 1` is `MIGRATIONS[i]`
pub const MIGRATIONS: &[&str] = &[MIGRATION_1_INIT, MIGRATION_2_INDEXES];

/// Schema version the code expects
pub fn head_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Creates the version table if needed
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(VERSION_TABLE_SQL)?;
    Ok(())
}

/// Returns the stored schema version, `None` for an unversioned database
pub fn current_version(conn: &Connection) -> Result<Option<u32>, rusqlite::Error> {
    conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
        row.get::<_, Option<u32>>(0)
    })
    .optional()
    .map(Option::flatten)
}

/// Records `version` as the current schema version
pub fn stamp(conn: &Connection, version: u32) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM schema_migrations", [])?;
    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        params![version],
    )?;
    Ok(())
}

/// Applies every migration above the stored version in one transaction
///
/// # Returns
///
/// * `Ok(u32)` - Number of migrations applied
/// * `Err(rusqlite::Error)` - A migration failed; nothing was applied
pub fn apply_migrations(conn: &mut Connection) -> Result<u32, rusqlite::Error> {
    let current = current_version(conn)?.unwrap_or(0);
    let head = head_version();
    if current >= head {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for (idx, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        tracing::info!("Applying schema migration {}", idx + 1);
        tx.execute_batch(sql)?;
    }
    stamp(&tx, head)?;
    tx.commit()?;

    Ok(head - current)
}

/// Numeric columns stored for a target, matching the record keys
pub fn numeric_columns(target: Target) -> &'static [&'static str] {
    match target {
        Target::Roles => &["download_count", "stargazers_count", "forks_count"],
        Target::Repositories => &[
            "download_count",
            "stargazers_count",
            "forks_count",
            "watchers_count",
        ],
        _ => &[],
    }
}
