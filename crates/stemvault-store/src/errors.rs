//! Store error helpers
//!
//! Every failure leaving this crate is an [`ExError`]. Foreign errors
//! (SQLite, filesystem, JSON) are converted at the call site with
//! [`StoreContext::store_op`], which classifies them and names the
//! operation that failed.

use stemvault_core::errors::{ExError, ExErrorKind};

pub type Result<T> = std::result::Result<T, ExError>;

/// Attach a store operation name to a foreign error
pub trait StoreContext<T> {
    fn store_op(self, op: &str) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, rusqlite::Error> {
    fn store_op(self, op: &str) -> Result<T> {
        self.map_err(|e| {
            ExError::new(ExErrorKind::Persistence)
                .with_op(op)
                .with_message(format!("ledger: {}", e))
        })
    }
}

impl<T> StoreContext<T> for std::result::Result<T, std::io::Error> {
    fn store_op(self, op: &str) -> Result<T> {
        self.map_err(|e| ExError::new(ExErrorKind::Io).with_op(op).with_message(e.to_string()))
    }
}

impl<T> StoreContext<T> for std::result::Result<T, serde_json::Error> {
    fn store_op(self, op: &str) -> Result<T> {
        self.map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op(op)
                .with_message(e.to_string())
        })
    }
}

/// A migration's SQL did not apply
pub fn migration_failed(migration_id: &str, err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("apply_migration")
        .with_entity_id(migration_id)
        .with_message(format!("Migration {} failed: {}", migration_id, err))
}

/// The ledger recorded a different checksum for an applied migration
pub fn checksum_mismatch(migration_id: &str, recorded: &str, embedded: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("apply_migration")
        .with_entity_id(migration_id)
        .with_message(format!(
            "Checksum mismatch for migration {}: ledger has {}, build has {}",
            migration_id, recorded, embedded
        ))
}

/// Existing blob bytes disagree with their digest
pub fn blob_collision(digest: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("put_blob")
        .with_entity_id(digest)
        .with_message(format!("blob {} exists with different content", digest))
}

pub fn blob_missing(digest: &str) -> ExError {
    ExError::new(ExErrorKind::NotFound)
        .with_op("get_blob")
        .with_entity_id(digest)
        .with_message(format!("no blob stored for digest {}", digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_errors_are_classified() {
        let io: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let err = io.store_op("write_blob").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Io);
        assert_eq!(err.op(), Some("write_blob"));

        let json: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        assert_eq!(
            json.store_op("decode_tree").unwrap_err().kind(),
            ExErrorKind::Serialization
        );
    }

    #[test]
    fn test_blob_missing_names_digest() {
        let err = blob_missing("abcd");
        assert_eq!(err.code(), "ERR_NOT_FOUND");
        assert_eq!(err.entity_id(), Some("abcd"));
    }
}
