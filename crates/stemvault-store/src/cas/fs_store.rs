//! Filesystem-based Content-Addressable Storage
//!
//! Blobs are immutable once written. Working-tree files are stored with the
//! `bin` extension; tree manifests and diff artifacts with `json`.

#![allow(clippy::result_large_err)]

use crate::cas::atomic::atomic_write;
use crate::errors::{blob_collision, blob_missing, Result, StoreContext};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 2] = ["bin", "json"];
const SHARD_WIDTH: usize = 2;

/// Filesystem-based CAS store
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

/// Hex SHA256 of a byte slice
pub fn digest_of(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

impl FsStore {
    /// Create a new CAS store at the given root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write content to CAS and return the digest
    ///
    /// - Idempotent: writing same content twice succeeds
    /// - Detects collisions: different content under an existing digest fails
    pub fn write(&self, content: &[u8], extension: &str) -> Result<String> {
        let digest = digest_of(content);
        let target_path = self.blob_path(&digest, extension);

        if target_path.exists() {
            let existing = fs::read(&target_path).store_op("read_cas")?;
            if existing == content {
                return Ok(digest);
            }
            return Err(blob_collision(&digest));
        }

        atomic_write(&target_path, content)?;
        tracing::debug!(digest = %digest, size_bytes = content.len(), "Wrote CAS blob");

        Ok(digest)
    }

    /// Read content from CAS by digest
    pub fn read(&self, digest: &str) -> Result<Vec<u8>> {
        match self.locate(digest) {
            Some(path) => fs::read(&path).store_op("read_cas"),
            None => Err(blob_missing(digest)),
        }
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.locate(digest).is_some()
    }

    /// Copy a blob to `dest` without buffering it through the caller
    pub fn copy_to(&self, digest: &str, dest: &Path) -> Result<()> {
        let source = self.locate(digest).ok_or_else(|| blob_missing(digest))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).store_op("create_parent_dir")?;
        }
        fs::copy(&source, dest).store_op("copy_cas")?;
        Ok(())
    }

    /// `<root>/<first two digest chars>/<digest>.<ext>`
    fn blob_path(&self, digest: &str, extension: &str) -> PathBuf {
        let shard = digest.get(..SHARD_WIDTH).unwrap_or(digest);
        self.root.join(shard).join(format!("{}.{}", digest, extension))
    }

    fn locate(&self, digest: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.blob_path(digest, ext))
            .find(|p| p.exists())
    }
}
