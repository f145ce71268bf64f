use sha2::{Digest, Sha256};

/// Hex sha256 of a migration's SQL text
pub(crate) fn sql_checksum(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}
