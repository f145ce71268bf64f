#![allow(clippy::result_large_err)]

use crate::errors::{Result, StoreContext};
use std::fs;
use std::path::{Path, PathBuf};

/// Hidden sibling of `target` with a per-call random component
fn scratch_sibling(target: &Path) -> PathBuf {
    let stem = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.tmp", stem, uuid::Uuid::new_v4().simple()))
}

/// Replace `target` with `content` in one rename. Parent directories are
/// created; a failed rename removes the scratch file.
///
/// # Errors
///
/// `Io` when the parent, the scratch file, or the rename fails.
pub fn atomic_write(target: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).store_op("atomic_write")?;
    }

    let scratch = scratch_sibling(target);
    fs::write(&scratch, content).store_op("atomic_write")?;
    fs::rename(&scratch, target).or_else(|e| {
        fs::remove_file(&scratch).ok();
        Err(e).store_op("atomic_write")
    })
}
