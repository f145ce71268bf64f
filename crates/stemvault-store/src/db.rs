//! Ledger connection management

#![allow(clippy::result_large_err)]

use crate::errors::{Result, StoreContext};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Connection::open(path).store_op("open_ledger")
}

/// Open an in-memory SQLite database (for testing)
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().store_op("open_ledger")
}

/// Configure a connection for a single-writer, many-reader ledger
pub fn configure(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so it cannot go through execute()
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .store_op("open_ledger")?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .store_op("open_ledger")?;
    conn.busy_timeout(Duration::from_secs(5))
        .store_op("open_ledger")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_configure_file_db() {
        let dir = TempDir::new().unwrap();
        let conn = open(dir.path().join("ledger.db")).unwrap();
        configure(&conn).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
