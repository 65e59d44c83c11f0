//! SQLite store for governance and delegate records
//!
//! ## Tables
//!
//! - `storage` - key/value pairs, holds the sequence counter
//! - `governances` - one aggregate row per governance, overwritten on compute
//! - `delegates` - delegate standings with `[block_from, block_to)` validity;
//!   at most one open row per `(governance, user)`

pub mod delegates;
pub mod governances;
pub mod schema;
pub mod storage;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{DelegatesError, Result};

pub use delegates::{delegate_id, DelegateRow};
pub use governances::GovernanceRow;
pub use storage::SequenceCounter;

/// SQLite database for governance rankings
pub struct DelegatesDb {
    conn: Mutex<Connection>,
}

impl DelegatesDb {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DelegatesError::Internal(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");

        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DelegatesError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| DelegatesError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Write one compute pass: overwrite the aggregate, close the governance's
    /// open delegate rows at `block` and open `delegates`. Atomic.
    pub fn record_pass(
        &self,
        governance: &GovernanceRow,
        block: i64,
        delegates: &[DelegateRow],
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            governances::upsert_governance(&tx, governance)?;
            let closed = delegates::close_open_delegates(&tx, &governance.id, block)?;
            for row in delegates {
                delegates::insert_delegate(&tx, row)?;
            }
            tx.commit()?;
            Ok(closed)
        })
    }

    pub fn governance(&self, id: &str) -> Result<Option<GovernanceRow>> {
        self.with_conn(|conn| governances::get_governance(conn, id))
    }

    pub fn current_delegates(&self, governance: &str) -> Result<Vec<DelegateRow>> {
        self.with_conn(|conn| delegates::current_delegates(conn, governance))
    }

    pub fn delegates_at(&self, governance: &str, block: i64) -> Result<Vec<DelegateRow>> {
        self.with_conn(|conn| delegates::delegates_at(conn, governance, block))
    }

    pub fn delegate_history(&self, governance: &str, user: &str) -> Result<Vec<DelegateRow>> {
        self.with_conn(|conn| delegates::delegate_history(conn, governance, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governance(id: &str, delegates: i64) -> GovernanceRow {
        GovernanceRow {
            id: id.to_string(),
            current_delegates: delegates,
            total_delegates: delegates,
            delegated_votes_raw: "0".to_string(),
            delegated_votes: "0.0".to_string(),
        }
    }

    fn delegate(governance: &str, user: &str, block: i64) -> DelegateRow {
        DelegateRow {
            id: delegate_id(governance, user),
            governance: governance.to_string(),
            user: user.to_string(),
            delegated_votes_raw: "1".to_string(),
            delegated_votes: "0.000000000000000001".to_string(),
            token_holders_represented_amount: 1,
            block_from: block,
            block_to: None,
        }
    }

    #[test]
    fn test_successive_passes_close_superseded_rows() {
        let db = DelegatesDb::open_in_memory().unwrap();

        db.record_pass(&governance("g", 2), 1, &[delegate("g", "A", 1), delegate("g", "B", 1)])
            .unwrap();
        let closed = db
            .record_pass(&governance("g", 2), 2, &[delegate("g", "B", 2), delegate("g", "C", 2)])
            .unwrap();
        assert_eq!(closed, 2);

        let a = db.delegate_history("g", "A").unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].block_to, Some(2));

        let current: Vec<String> = db.current_delegates("g").unwrap().into_iter().map(|r| r.user).collect();
        assert_eq!(current, vec!["B", "C"]);

        let past: Vec<String> = db.delegates_at("g", 1).unwrap().into_iter().map(|r| r.user).collect();
        assert_eq!(past, vec!["A", "B"]);

        // other governances untouched
        assert!(db.current_delegates("other").unwrap().is_empty());
    }

    #[test]
    fn test_single_open_row_per_user() {
        let db = DelegatesDb::open_in_memory().unwrap();
        db.record_pass(&governance("g", 1), 1, &[delegate("g", "A", 1)]).unwrap();

        let duplicate = db.with_conn(|conn| delegates::insert_delegate(conn, &delegate("g", "A", 1)));
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_failed_pass_rolls_back() {
        let db = DelegatesDb::open_in_memory().unwrap();
        db.record_pass(&governance("g", 1), 1, &[delegate("g", "A", 1)]).unwrap();

        // duplicate user in one pass violates the open-row index
        let result = db.record_pass(&governance("g", 9), 2, &[delegate("g", "B", 2), delegate("g", "B", 2)]);
        assert!(result.is_err());

        assert_eq!(db.governance("g").unwrap().unwrap().current_delegates, 1);
        let current = db.current_delegates("g").unwrap();
        assert_eq!(current.len(), 1);
        assert!(current[0].is_open());
    }

    #[test]
    fn test_sequence_counter_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("delegates.db");

        {
            let db = DelegatesDb::open(&path).unwrap();
            let mut counter = SequenceCounter::load(&db).unwrap();
            assert_eq!(counter.current(), 0);
            assert_eq!(counter.advance(&db).unwrap(), 1);
            assert_eq!(counter.advance(&db).unwrap(), 2);
        }

        let db = DelegatesDb::open(&path).unwrap();
        let counter = SequenceCounter::load(&db).unwrap();
        assert_eq!(counter.current(), 2);
    }
}
