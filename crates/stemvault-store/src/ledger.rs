//! Revision ledger queries.
//!
//! The `revisions` table is append-only (enforced by triggers). HEAD is the
//! row with the highest `seq`; every new row must name the current HEAD as
//! its parent.

#![allow(clippy::result_large_err)]

use crate::errors::{Result, StoreContext};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use stemvault_core::errors::{ExError, ExErrorKind};

/// A raw row from the `revisions` ledger table.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionRow {
    /// Insertion order; 0 for rows not yet written
    pub seq: i64,
    pub hash: String,
    pub parent_hash: Option<String>,
    pub tree_digest: String,
    pub author: String,
    pub author_id: String,
    /// Persisted message, trailers included
    pub message: String,
    /// Structured track-change summary (JSON), when one was recorded
    pub track_changes: Option<String>,
    /// CAS digest of the diff artifact, when one was recorded
    pub diff_digest: Option<String>,
    /// `commit`, `revert` or `merge`
    pub kind: String,
    pub restored_from: Option<String>,
    /// Milliseconds since epoch
    pub created_at: i64,
}

const COLUMNS: &str = "seq, hash, parent_hash, tree_digest, author, author_id, message, \
                       track_changes, diff_digest, kind, restored_from, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<RevisionRow> {
    Ok(RevisionRow {
        seq: row.get(0)?,
        hash: row.get(1)?,
        parent_hash: row.get(2)?,
        tree_digest: row.get(3)?,
        author: row.get(4)?,
        author_id: row.get(5)?,
        message: row.get(6)?,
        track_changes: row.get(7)?,
        diff_digest: row.get(8)?,
        kind: row.get(9)?,
        restored_from: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Current HEAD, or `None` when no revision exists
pub fn head(conn: &Connection) -> Result<Option<RevisionRow>> {
    conn.query_row(
        &format!("SELECT {} FROM revisions ORDER BY seq DESC LIMIT 1", COLUMNS),
        [],
        map_row,
    )
    .optional()
    .store_op("ledger")
}

pub fn count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM revisions", [], |row| row.get(0))
        .store_op("ledger")
}

/// Every revision, latest first
pub fn list(conn: &Connection) -> Result<Vec<RevisionRow>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM revisions ORDER BY seq DESC", COLUMNS))
        .store_op("ledger")?;
    let rows = stmt
        .query_map([], map_row)
        .store_op("ledger")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .store_op("ledger")?;
    Ok(rows)
}

/// Rows whose hash starts with `prefix` (at most two, enough to detect
/// ambiguity)
pub fn find_by_prefix(conn: &Connection, prefix: &str) -> Result<Vec<RevisionRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM revisions WHERE substr(hash, 1, length(?1)) = ?1 ORDER BY seq LIMIT 2",
            COLUMNS
        ))
        .store_op("ledger")?;
    let rows = stmt
        .query_map([prefix], map_row)
        .store_op("ledger")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .store_op("ledger")?;
    Ok(rows)
}

/// Append a revision whose parent must still be HEAD.
///
/// # Errors
///
/// - `Concurrency`: HEAD moved since `row.parent_hash` was read
/// - `Persistence`: SQLite failure
pub fn append(conn: &mut Connection, row: &RevisionRow) -> Result<i64> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .store_op("ledger")?;

    let current: Option<String> = tx
        .query_row(
            "SELECT hash FROM revisions ORDER BY seq DESC LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()
        .store_op("ledger")?;

    if current != row.parent_hash {
        return Err(ExError::new(ExErrorKind::Concurrency)
            .with_op("append_revision")
            .with_revision(row.hash.clone())
            .with_message(format!(
                "HEAD moved: expected {}, found {}",
                row.parent_hash.as_deref().unwrap_or("NONE"),
                current.as_deref().unwrap_or("NONE")
            )));
    }

    tx.execute(
        r#"
        INSERT INTO revisions (
            hash, parent_hash, tree_digest, author, author_id, message,
            track_changes, diff_digest, kind, restored_from, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        rusqlite::params![
            row.hash,
            row.parent_hash,
            row.tree_digest,
            row.author,
            row.author_id,
            row.message,
            row.track_changes,
            row.diff_digest,
            row.kind,
            row.restored_from,
            row.created_at,
        ],
    )
    .store_op("ledger")?;
    let seq = tx.last_insert_rowid();

    tx.commit().store_op("ledger")?;
    tracing::debug!(hash = %row.hash, seq, kind = %row.kind, "Appended revision");

    Ok(seq)
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM repository_meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
    .store_op("ledger")
}

/// Insert a metadata value unless the key already has one
pub fn init_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO repository_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )
    .store_op("ledger")?;
    Ok(())
}
