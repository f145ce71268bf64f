//! Working-tree scanning and tree manifests
//!
//! A tree manifest maps every file path under the working tree (relative,
//! `/`-separated) to the digest of its content. The repository metadata
//! directory is never part of the tree.

#![allow(clippy::result_large_err)]

use crate::cas::FsStore;
use crate::errors::{Result, StoreContext};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use stemvault_core::errors::{ExError, VaultError};
use walkdir::WalkDir;

/// Name of the repository metadata directory inside a working tree
pub const META_DIR: &str = ".stemvault";

/// Path → content digest for one revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeManifest {
    pub files: BTreeMap<String, String>,
}

impl TreeManifest {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths whose digest differs between `self` and `other`, including
    /// paths present on only one side
    pub fn changed_paths(&self, other: &TreeManifest) -> Vec<String> {
        let keys: BTreeSet<&String> = self.files.keys().chain(other.files.keys()).collect();
        keys.into_iter()
            .filter(|k| self.files.get(*k) != other.files.get(*k))
            .cloned()
            .collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).store_op("encode_tree")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).store_op("decode_tree")
    }
}

/// A file found in the working tree
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// `/`-separated path relative to the tree root
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// List every regular file under `root`, sorted by path, skipping the
/// metadata directory. Symlinks are not followed and not recorded.
pub fn scan(root: &Path) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == META_DIR));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            ExError::from(VaultError::StageFailed {
                path,
                reason: e.to_string(),
            })
            .with_op("scan_tree")
        })?;
        if !entry.file_type().is_file() {
            if entry.file_type().is_symlink() {
                tracing::warn!(path = %entry.path().display(), "Skipping symlink in working tree");
            }
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| {
                ExError::from(VaultError::StageFailed {
                    path: entry.path().display().to_string(),
                    reason: e.to_string(),
                })
            })?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(TreeEntry {
            rel_path: rel,
            abs_path: entry.into_path(),
        });
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

/// Digest of a file on disk without copying it anywhere
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).store_op("hash_file")?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).store_op("hash_file")?;
    Ok(hex::encode(hasher.finalize()))
}

/// Manifest of the working tree as it is right now, without writing blobs
pub fn current_manifest(root: &Path) -> Result<TreeManifest> {
    let mut files = BTreeMap::new();
    for entry in scan(root)? {
        files.insert(entry.rel_path, hash_file(&entry.abs_path)?);
    }
    Ok(TreeManifest { files })
}

/// Copy every working-tree file into the blob store and return the manifest.
///
/// # Errors
///
/// `Commit` (via `StageFailed`) naming the first file that could not be
/// read or stored. Nothing is recorded in the ledger in that case.
pub fn stage(cas: &FsStore, root: &Path) -> Result<TreeManifest> {
    let mut files = BTreeMap::new();
    for entry in scan(root)? {
        let content = std::fs::read(&entry.abs_path).map_err(|e| {
            ExError::from(VaultError::StageFailed {
                path: entry.rel_path.clone(),
                reason: e.to_string(),
            })
            .with_op("stage_tree")
        })?;
        let digest = cas.write(&content, "bin").map_err(|e| {
            ExError::from(VaultError::StageFailed {
                path: entry.rel_path.clone(),
                reason: e.message().to_string(),
            })
            .with_op("stage_tree")
            .with_source(e)
        })?;
        files.insert(entry.rel_path, digest);
    }
    Ok(TreeManifest { files })
}

/// Resolve a manifest path to an absolute path under `root`, refusing
/// anything that would escape it
pub fn resolve_path(root: &Path, rel: &str) -> Result<PathBuf> {
    let mut out = root.to_path_buf();
    for part in rel.split('/') {
        if part.is_empty() || part == "." || part == ".." || (out == root && part == META_DIR) {
            return Err(ExError::from(VaultError::StageFailed {
                path: rel.to_string(),
                reason: "path escapes the working tree".to_string(),
            }));
        }
        out.push(part);
    }
    Ok(out)
}
