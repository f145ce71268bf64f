//! Repository history commands with boundary logging.
//!
//! ## Logging Ownership
//!
//! The engine layer owns lifecycle logging for repository operations:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Lower layers (store, core) use only `tracing::debug!()` for internal details.

#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};
use std::time::Instant;
use stemvault_core::diff::{compute_diff, diff_snapshots, DiffResult};
use stemvault_core::errors::Result;
use stemvault_core::{log_op_end, log_op_error, log_op_start, ProjectSnapshot};
use stemvault_store::{
    CommitOutcome, CommitRequest, Repository, RepositoryState, RestoreOutcome, RevisionInfo,
};

/// Initialize the repository at `root` (idempotent)
///
/// ## Returns
///
/// The repository state after initialization (`Empty` or `HasHistory`)
///
/// ## Errors
///
/// - `Init`: the directories or the ledger could not be created
pub fn init_project(root: &Path) -> Result<RepositoryState> {
    log_op_start!("init", path = %root.display());
    let start = Instant::now();

    let result = Repository::initialize(root)
        .and_then(|_| Repository::state(root))
        .map_err(|e| {
            log_op_error!(
                "init",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "init",
        duration_ms = start.elapsed().as_millis() as u64,
        state = ?result
    );
    Ok(result)
}

/// Record the working tree at `root` as a new revision
///
/// ## Errors
///
/// - `NotFound`: `root` is not an initialized repository
/// - `Commit`: a working-tree file could not be staged
/// - `Concurrency`: HEAD moved while the commit was prepared
pub fn commit_project(root: &Path, request: CommitRequest) -> Result<CommitOutcome> {
    log_op_start!("commit", path = %root.display(), author_id = %request.author_id);
    let start = Instant::now();

    let result = Repository::open(root)
        .and_then(|mut repo| repo.commit(request))
        .map_err(|e| {
            log_op_error!(
                "commit",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "commit",
        duration_ms = start.elapsed().as_millis() as u64,
        revision = result.revision().unwrap_or("NONE")
    );
    Ok(result)
}

/// Every revision of the project, latest first
pub fn project_history(root: &Path) -> Result<Vec<RevisionInfo>> {
    log_op_start!("history", path = %root.display());
    let start = Instant::now();

    let result = Repository::open(root)
        .and_then(|repo| repo.history())
        .map_err(|e| {
            log_op_error!(
                "history",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "history",
        duration_ms = start.elapsed().as_millis() as u64,
        revisions = result.len()
    );
    Ok(result)
}

/// HEAD of the project; `None` before the first commit
pub fn latest_revision(root: &Path) -> Result<Option<String>> {
    log_op_start!("latest_revision", path = %root.display());
    let start = Instant::now();

    let result = Repository::open(root)
        .and_then(|repo| repo.latest_revision_id())
        .map_err(|e| {
            log_op_error!(
                "latest_revision",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "latest_revision",
        duration_ms = start.elapsed().as_millis() as u64,
        revision = result.as_deref().unwrap_or("NONE")
    );
    Ok(result)
}

/// Restore the working tree to `target` as a new revert revision
///
/// ## Errors
///
/// - `NotFound`: unknown target or empty history
/// - `Conflict`: uncommitted edits on a path the restore must rewrite
pub fn restore_project(
    root: &Path,
    target: &str,
    author_id: &str,
    message: &str,
) -> Result<RestoreOutcome> {
    log_op_start!("restore", path = %root.display(), target = target);
    let start = Instant::now();

    let result = Repository::open(root)
        .and_then(|mut repo| repo.restore(target, author_id, message))
        .map_err(|e| {
            log_op_error!(
                "restore",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "restore",
        duration_ms = start.elapsed().as_millis() as u64,
        revision = %result.revision,
        paths_changed = result.paths_changed.len()
    );
    Ok(result)
}

/// Write the zip archive of `rev` into `dest_dir`
pub fn export_archive(root: &Path, rev: &str, dest_dir: &Path) -> Result<PathBuf> {
    log_op_start!("export_archive", path = %root.display(), revision = rev);
    let start = Instant::now();

    let result = Repository::open(root)
        .and_then(|repo| repo.export_archive(rev, dest_dir))
        .map_err(|e| {
            log_op_error!(
                "export_archive",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "export_archive",
        duration_ms = start.elapsed().as_millis() as u64,
        archive = %result.display()
    );
    Ok(result)
}

/// The diff artifact stored with `rev`
pub fn diff_artifact(root: &Path, rev: &str) -> Result<DiffResult> {
    log_op_start!("diff_artifact", path = %root.display(), revision = rev);
    let start = Instant::now();

    let result = Repository::open(root)
        .and_then(|repo| repo.diff_artifact(rev))
        .map_err(|e| {
            log_op_error!(
                "diff_artifact",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "diff_artifact",
        duration_ms = start.elapsed().as_millis() as u64,
        change_count = result.total_change_count
    );
    Ok(result)
}

/// Diff the canonical snapshots of two revisions. A revision without a
/// snapshot counts as an empty project.
pub fn diff_revisions(root: &Path, old_rev: &str, new_rev: &str) -> Result<DiffResult> {
    log_op_start!("diff_revisions", path = %root.display(), old = old_rev, new = new_rev);
    let start = Instant::now();

    let result = diff_revisions_impl(root, old_rev, new_rev).map_err(|e| {
        log_op_error!(
            "diff_revisions",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;

    log_op_end!(
        "diff_revisions",
        duration_ms = start.elapsed().as_millis() as u64,
        change_count = result.total_change_count
    );
    Ok(result)
}

fn diff_revisions_impl(root: &Path, old_rev: &str, new_rev: &str) -> Result<DiffResult> {
    let repo = Repository::open(root)?;
    let old = repo.snapshot_at(old_rev)?;
    let new = repo.snapshot_at(new_rev)?;
    match (old, new) {
        (Some(old), Some(new)) => compute_diff(&old, &new),
        (old, new) => {
            let parse = |bytes: Option<Vec<u8>>| match bytes {
                Some(bytes) => ProjectSnapshot::from_slice(&bytes),
                None => Ok(ProjectSnapshot::empty()),
            };
            diff_snapshots(&parse(old)?, &parse(new)?)
        }
    }
}
