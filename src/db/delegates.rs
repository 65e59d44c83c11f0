//! Delegate rows with validity ranges
//!
//! A row is current while `block_to` is NULL. Recomputing a governance closes
//! every open row at the new sequence value and opens fresh ones; rows are
//! never deleted, so any past ranking can be read back with `delegates_at`.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateRow {
    /// `governance/address`
    pub id: String,
    pub governance: String,
    pub user: String,
    pub delegated_votes_raw: String,
    pub delegated_votes: String,
    pub token_holders_represented_amount: i64,
    pub block_from: i64,
    pub block_to: Option<i64>,
}

impl DelegateRow {
    pub fn is_open(&self) -> bool {
        self.block_to.is_none()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            governance: row.get("governance")?,
            user: row.get("user")?,
            delegated_votes_raw: row.get("delegated_votes_raw")?,
            delegated_votes: row.get("delegated_votes")?,
            token_holders_represented_amount: row.get("token_holders_represented_amount")?,
            block_from: row.get("block_from")?,
            block_to: row.get("block_to")?,
        })
    }
}

/// Delegate record id.
pub fn delegate_id(governance: &str, user: &str) -> String {
    format!("{governance}/{user}")
}

const SELECT_COLUMNS: &str = "SELECT id, governance, user, delegated_votes_raw, delegated_votes,
    token_holders_represented_amount, block_from, block_to FROM delegates";

/// Close every open row of `governance` at `block`. Returns rows closed.
pub fn close_open_delegates(conn: &Connection, governance: &str, block: i64) -> Result<usize> {
    let closed = conn.execute(
        "UPDATE delegates SET block_to = ?2 WHERE governance = ?1 AND block_to IS NULL",
        params![governance, block],
    )?;
    Ok(closed)
}

/// Insert a row as given (its `block_to` is normally `None`).
pub fn insert_delegate(conn: &Connection, row: &DelegateRow) -> Result<()> {
    conn.execute(
        "INSERT INTO delegates (id, governance, user, delegated_votes_raw, delegated_votes,
            token_holders_represented_amount, block_from, block_to)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.id,
            row.governance,
            row.user,
            row.delegated_votes_raw,
            row.delegated_votes,
            row.token_holders_represented_amount,
            row.block_from,
            row.block_to
        ],
    )?;
    Ok(())
}

fn query_rows(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<DelegateRow>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, DelegateRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Open rows of `governance` in rank order.
pub fn current_delegates(conn: &Connection, governance: &str) -> Result<Vec<DelegateRow>> {
    query_rows(
        conn,
        &format!("{SELECT_COLUMNS} WHERE governance = ?1 AND block_to IS NULL ORDER BY uid"),
        [governance],
    )
}

/// Rows of `governance` valid at `block`, in rank order.
pub fn delegates_at(conn: &Connection, governance: &str, block: i64) -> Result<Vec<DelegateRow>> {
    query_rows(
        conn,
        &format!(
            "{SELECT_COLUMNS} WHERE governance = ?1 AND block_from <= ?2
             AND (block_to IS NULL OR block_to > ?2) ORDER BY uid"
        ),
        params![governance, block],
    )
}

/// Every row ever written for `user` in `governance`, oldest first.
pub fn delegate_history(conn: &Connection, governance: &str, user: &str) -> Result<Vec<DelegateRow>> {
    query_rows(
        conn,
        &format!("{SELECT_COLUMNS} WHERE governance = ?1 AND user = ?2 ORDER BY uid"),
        params![governance, user],
    )
}
