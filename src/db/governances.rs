//! Governance aggregate rows

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceRow {
    pub id: String,
    pub current_delegates: i64,
    pub total_delegates: i64,
    pub delegated_votes_raw: String,
    pub delegated_votes: String,
}

impl GovernanceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            current_delegates: row.get("current_delegates")?,
            total_delegates: row.get("total_delegates")?,
            delegated_votes_raw: row.get("delegated_votes_raw")?,
            delegated_votes: row.get("delegated_votes")?,
        })
    }
}

/// Insert or overwrite the aggregate for `row.id`.
pub fn upsert_governance(conn: &Connection, row: &GovernanceRow) -> Result<()> {
    conn.execute(
        "INSERT INTO governances (id, current_delegates, total_delegates, delegated_votes_raw, delegated_votes)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            current_delegates = excluded.current_delegates,
            total_delegates = excluded.total_delegates,
            delegated_votes_raw = excluded.delegated_votes_raw,
            delegated_votes = excluded.delegated_votes",
        params![
            row.id,
            row.current_delegates,
            row.total_delegates,
            row.delegated_votes_raw,
            row.delegated_votes
        ],
    )?;
    Ok(())
}

pub fn get_governance(conn: &Connection, id: &str) -> Result<Option<GovernanceRow>> {
    let row = conn
        .query_row(
            "SELECT id, current_delegates, total_delegates, delegated_votes_raw, delegated_votes
             FROM governances WHERE id = ?1",
            [id],
            GovernanceRow::from_row,
        )
        .optional()?;
    Ok(row)
}
