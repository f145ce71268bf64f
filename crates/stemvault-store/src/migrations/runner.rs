#![allow(clippy::result_large_err)]

use crate::errors::{checksum_mismatch, migration_failed, Result, StoreContext};
use crate::migrations::checksums::sql_checksum;
use crate::migrations::embedded::{Migration, MIGRATIONS};
use rusqlite::Connection;
use std::collections::HashMap;

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY,
    migration_id TEXT NOT NULL UNIQUE,
    applied_at INTEGER NOT NULL,
    checksum TEXT
)";

/// Bring the ledger schema up to date.
///
/// Safe to call on every open: applied migrations are verified, not rerun.
///
/// # Errors
///
/// `Persistence` when a migration fails to apply or an applied migration's
/// checksum no longer matches.
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute(VERSION_TABLE, []).store_op("apply_migration")?;
    let applied = applied_checksums(conn)?;

    for migration in MIGRATIONS {
        let checksum = sql_checksum(migration.sql);
        match applied.get(migration.id) {
            Some(Some(recorded)) if *recorded != checksum => {
                return Err(checksum_mismatch(migration.id, recorded, &checksum));
            }
            Some(_) => continue,
            None => apply_one(conn, migration, &checksum)?,
        }
    }
    Ok(())
}

fn applied_checksums(conn: &Connection) -> Result<HashMap<String, Option<String>>> {
    let mut stmt = conn
        .prepare("SELECT migration_id, checksum FROM schema_version")
        .store_op("apply_migration")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))
        .store_op("apply_migration")?;
    rows.collect::<rusqlite::Result<HashMap<_, _>>>()
        .store_op("apply_migration")
}

fn apply_one(conn: &mut Connection, migration: &Migration, checksum: &str) -> Result<()> {
    let tx = conn.transaction().store_op("apply_migration")?;
    tx.execute_batch(migration.sql)
        .map_err(|e| migration_failed(migration.id, e))?;
    tx.execute(
        "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES (?1, ?2, ?3)",
        rusqlite::params![migration.id, chrono::Utc::now().timestamp(), checksum],
    )
    .store_op("apply_migration")?;
    tx.commit().store_op("apply_migration")?;

    tracing::debug!(migration_id = migration.id, "Applied ledger migration");
    Ok(())
}
