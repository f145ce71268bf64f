//! Staged, all-or-nothing working-tree rewrites
//!
//! New content is written under `.stemvault/staging/<id>/new` first. Promotion
//! moves each displaced file to `.../backup` and renames the staged file into
//! place; any failure replays the backups in reverse so the tree is left
//! exactly as it was.

#![allow(clippy::result_large_err)]

use crate::cas::FsStore;
use crate::errors::{Result, StoreContext};
use crate::tree::resolve_path;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
enum Action {
    Write(String),
    Delete(String),
}

impl Action {
    fn rel(&self) -> &str {
        match self {
            Action::Write(rel) | Action::Delete(rel) => rel,
        }
    }
}

/// A pending set of file writes and deletions against one working tree
#[derive(Debug)]
pub struct StagedRewrite {
    work_root: PathBuf,
    dir: PathBuf,
    actions: Vec<Action>,
    backed_up: Vec<String>,
    promoted: Vec<String>,
}

impl StagedRewrite {
    /// Open a fresh staging area under `staging_root`
    pub fn begin(staging_root: &Path, work_root: &Path) -> Result<Self> {
        let dir = staging_root.join(uuid::Uuid::now_v7().simple().to_string());
        fs::create_dir_all(dir.join("new")).store_op("create_staging")?;
        fs::create_dir_all(dir.join("backup")).store_op("create_staging")?;
        Ok(Self {
            work_root: work_root.to_path_buf(),
            dir,
            actions: Vec::new(),
            backed_up: Vec::new(),
            promoted: Vec::new(),
        })
    }

    /// Stage new content for `rel`
    pub fn write(&mut self, rel: &str, content: &[u8]) -> Result<()> {
        let staged = resolve_path(&self.dir.join("new"), rel)?;
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).store_op("stage_write")?;
        }
        fs::write(&staged, content).store_op("stage_write")?;
        self.actions.push(Action::Write(rel.to_string()));
        Ok(())
    }

    /// Stage a blob from the store for `rel`
    pub fn write_blob(&mut self, rel: &str, cas: &FsStore, digest: &str) -> Result<()> {
        let staged = resolve_path(&self.dir.join("new"), rel)?;
        cas.copy_to(digest, &staged)?;
        self.actions.push(Action::Write(rel.to_string()));
        Ok(())
    }

    /// Stage a file copied from outside the working tree
    pub fn write_file(&mut self, rel: &str, source: &Path) -> Result<()> {
        let staged = resolve_path(&self.dir.join("new"), rel)?;
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).store_op("stage_copy")?;
        }
        fs::copy(source, &staged).store_op("stage_copy")?;
        self.actions.push(Action::Write(rel.to_string()));
        Ok(())
    }

    /// Stage removal of `rel`
    pub fn delete(&mut self, rel: &str) {
        self.actions.push(Action::Delete(rel.to_string()));
    }

    /// Apply every staged action to the working tree.
    ///
    /// # Errors
    ///
    /// Returns the first I/O failure after rolling back whatever had been
    /// promoted.
    pub fn promote(&mut self) -> Result<()> {
        let actions = std::mem::take(&mut self.actions);
        for action in &actions {
            if let Err(e) = self.promote_one(action) {
                tracing::warn!(path = action.rel(), error = %e, "Promotion failed, rolling back");
                self.rollback()?;
                return Err(e);
            }
        }
        self.actions = actions;
        Ok(())
    }

    fn promote_one(&mut self, action: &Action) -> Result<()> {
        let rel = action.rel();
        let target = resolve_path(&self.work_root, rel)?;

        if target.is_dir() {
            // Only a directory emptied by an earlier deletion can be replaced
            fs::remove_dir(&target).store_op("promote")?;
        } else if target.exists() {
            let backup = resolve_path(&self.dir.join("backup"), rel)?;
            if let Some(parent) = backup.parent() {
                fs::create_dir_all(parent).store_op("backup")?;
            }
            fs::rename(&target, &backup).store_op("backup")?;
            self.backed_up.push(rel.to_string());
        }

        if let Action::Write(_) = action {
            let staged = resolve_path(&self.dir.join("new"), rel)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).store_op("promote")?;
            }
            fs::rename(&staged, &target).store_op("promote")?;
            self.promoted.push(rel.to_string());
        }
        Ok(())
    }

    /// Undo a promotion: drop promoted files and put every backup back
    pub fn rollback(&mut self) -> Result<()> {
        for rel in self.promoted.drain(..).rev() {
            let target = resolve_path(&self.work_root, &rel)?;
            if target.exists() {
                fs::remove_file(&target).store_op("rollback")?;
            }
        }
        for rel in self.backed_up.drain(..).rev() {
            let backup = resolve_path(&self.dir.join("backup"), &rel)?;
            let target = resolve_path(&self.work_root, &rel)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).store_op("rollback")?;
            }
            fs::rename(&backup, &target).store_op("rollback")?;
        }
        Ok(())
    }

    /// Discard the staging area (backups included)
    pub fn finish(self) -> Result<()> {
        let dir = self.dir.clone();
        drop(self);
        if dir.exists() {
            fs::remove_dir_all(&dir).store_op("cleanup_staging")?;
        }
        Ok(())
    }
}

impl Drop for StagedRewrite {
    fn drop(&mut self) {
        if self.dir.exists() && self.backed_up.is_empty() {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Remove now-empty directories left behind after deletions, bottom-up,
/// stopping at `root`
pub fn prune_empty_dirs(root: &Path, rels: &[String]) {
    for rel in rels {
        let mut current = resolve_path(root, rel)
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        while let Some(dir) = current {
            if dir == root || fs::remove_dir(&dir).is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }
}
