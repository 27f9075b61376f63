//! Revision ledger SQL.
//!
//! # Responsibility
//! - Append, read, and page through the shared `revisions` table.
//! - Apply the two ledger-side purge outcomes: message rewrite or delete.
//!
//! # Invariants
//! - Ids come from SQLite `AUTOINCREMENT`; a deleted id is never reissued.
//! - `history` ordering is always `id DESC` (most recent first).

use crate::model::revision::{Revision, RevisionId, PURGED_MESSAGE};
use crate::repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::time::{SystemTime, UNIX_EPOCH};

const REVISION_SELECT_SQL: &str = "SELECT
    id,
    timestamp_ms,
    author,
    message,
    approved_timestamp_ms
FROM revisions";

const HISTORY_DEFAULT_LIMIT: u32 = 20;
const HISTORY_LIMIT_MAX: u32 = 100;

/// Pagination options for ledger history reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum rows to return. Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    /// Number of rows to skip.
    pub offset: u32,
}

/// Normalizes the history page size according to the ledger contract.
pub fn normalize_history_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => HISTORY_DEFAULT_LIMIT,
        Some(value) if value > HISTORY_LIMIT_MAX => HISTORY_LIMIT_MAX,
        Some(value) => value,
    }
}

/// Appends one ledger row and returns the committed record.
///
/// Must run inside the caller's SQL transaction; the assigned id becomes
/// durable only when that transaction commits.
pub fn insert_revision(conn: &Connection, author: &str, message: &str) -> RepoResult<Revision> {
    let timestamp_ms = now_epoch_ms();
    conn.execute(
        "INSERT INTO revisions (timestamp_ms, author, message, approved_timestamp_ms)
         VALUES (?1, ?2, ?3, NULL);",
        params![timestamp_ms, author, message],
    )?;

    Ok(Revision {
        id: conn.last_insert_rowid(),
        timestamp_ms,
        author: author.to_string(),
        message: message.to_string(),
        approved_timestamp_ms: None,
    })
}

/// Loads one revision by id.
pub fn get_revision(conn: &Connection, id: RevisionId) -> RepoResult<Option<Revision>> {
    let revision = conn
        .query_row(
            &format!("{REVISION_SELECT_SQL} WHERE id = ?1;"),
            [id],
            parse_revision_row,
        )
        .optional()?;
    Ok(revision)
}

/// Loads the revision with the largest id, if the ledger is non-empty.
pub fn youngest_revision(conn: &Connection) -> RepoResult<Option<Revision>> {
    let revision = conn
        .query_row(
            &format!("{REVISION_SELECT_SQL} ORDER BY id DESC LIMIT 1;"),
            [],
            parse_revision_row,
        )
        .optional()?;
    Ok(revision)
}

/// Pages through the ledger, most recent first.
pub fn list_history(conn: &Connection, query: &HistoryQuery) -> RepoResult<Vec<Revision>> {
    let limit = normalize_history_limit(query.limit);
    let mut stmt = conn.prepare(&format!(
        "{REVISION_SELECT_SQL} ORDER BY id DESC LIMIT ?1 OFFSET ?2;"
    ))?;
    let mut rows = stmt.query(params![limit, query.offset])?;
    let mut revisions = Vec::new();
    while let Some(row) = rows.next()? {
        revisions.push(parse_revision_row(row)?);
    }
    Ok(revisions)
}

/// Rewrites a retained purge tombstone's message to the sentinel value.
///
/// Returns `false` when no ledger row has the given id.
pub fn mark_purged(conn: &Connection, id: RevisionId) -> RepoResult<bool> {
    let changed = conn.execute(
        "UPDATE revisions SET message = ?2 WHERE id = ?1;",
        params![id, PURGED_MESSAGE],
    )?;
    Ok(changed == 1)
}

/// Removes one ledger row outright. Returns `false` when absent.
pub fn delete_revision(conn: &Connection, id: RevisionId) -> RepoResult<bool> {
    let changed = conn.execute("DELETE FROM revisions WHERE id = ?1;", [id])?;
    Ok(changed == 1)
}

/// Stamps moderation approval time on one revision.
pub fn set_approved(conn: &Connection, id: RevisionId) -> RepoResult<bool> {
    let changed = conn.execute(
        "UPDATE revisions SET approved_timestamp_ms = ?2 WHERE id = ?1;",
        params![id, now_epoch_ms()],
    )?;
    Ok(changed == 1)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

fn parse_revision_row(row: &Row<'_>) -> rusqlite::Result<Revision> {
    Ok(Revision {
        id: row.get("id")?,
        timestamp_ms: row.get("timestamp_ms")?,
        author: row.get("author")?,
        message: row.get("message")?,
        approved_timestamp_ms: row.get("approved_timestamp_ms")?,
    })
}
