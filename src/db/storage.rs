//! Key/value storage table and the sequence counter kept in it

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::DelegatesDb;
use crate::error::{DelegatesError, Result};

/// Storage key of the sequence counter.
pub const CURRENT_BLOCK_KEY: &str = "currentBlock";

pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = conn
        .query_row("SELECT value FROM storage WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    Ok(value.flatten())
}

pub fn set_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO storage (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Process-wide monotonic sequence ("current block").
///
/// Loaded once from storage; every `advance` is persisted before it returns.
#[derive(Debug)]
pub struct SequenceCounter {
    current: i64,
}

impl SequenceCounter {
    pub fn load(db: &DelegatesDb) -> Result<Self> {
        let current = db.with_conn(|conn| match get_value(conn, CURRENT_BLOCK_KEY)? {
            Some(value) => value.parse::<i64>().map_err(|e| {
                DelegatesError::Internal(format!("invalid {CURRENT_BLOCK_KEY} value {value:?}: {e}"))
            }),
            None => Ok(0),
        })?;
        debug!(current, "Loaded sequence counter");
        Ok(Self { current })
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    /// Increment and persist. Returns the new value.
    pub fn advance(&mut self, db: &DelegatesDb) -> Result<i64> {
        let next = self.current + 1;
        db.with_conn(|conn| set_value(conn, CURRENT_BLOCK_KEY, &next.to_string()))?;
        self.current = next;
        Ok(next)
    }
}
