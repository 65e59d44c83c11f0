//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        conn.execute_batch(STORAGE_SCHEMA)?;
        conn.execute_batch(GOVERNANCES_SCHEMA)?;
        conn.execute_batch(DELEGATES_SCHEMA)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Key/value storage (sequence counter)
const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS storage (
    key TEXT PRIMARY KEY,
    value TEXT
);
"#;

/// Governance aggregates, one row per governance
const GOVERNANCES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS governances (
    id TEXT PRIMARY KEY,
    current_delegates INTEGER NOT NULL DEFAULT 0,
    total_delegates INTEGER NOT NULL DEFAULT 0,
    delegated_votes_raw TEXT NOT NULL DEFAULT '0',
    delegated_votes TEXT NOT NULL DEFAULT '0'
);
"#;

/// Delegate standings with validity range [block_from, block_to)
const DELEGATES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS delegates (
    uid INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL,
    governance TEXT NOT NULL,
    user TEXT NOT NULL,
    delegated_votes_raw TEXT NOT NULL,
    delegated_votes TEXT NOT NULL,
    token_holders_represented_amount INTEGER NOT NULL DEFAULT 0,
    block_from INTEGER NOT NULL,
    block_to INTEGER
);

CREATE INDEX IF NOT EXISTS idx_delegates_governance ON delegates(governance, block_from);
CREATE INDEX IF NOT EXISTS idx_delegates_id ON delegates(id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_delegates_open ON delegates(governance, user) WHERE block_to IS NULL;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('storage', 'governances', 'delegates')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
