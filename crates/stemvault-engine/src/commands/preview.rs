//! Read-only diff of a candidate snapshot against HEAD

#![allow(clippy::result_large_err)]

use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use stemvault_core::diff::{diff_snapshots, DiffResult, TrackChanges};
use stemvault_core::errors::Result;
use stemvault_core::{log_op_end, log_op_error, log_op_start, ProjectSnapshot};
use stemvault_store::{Repository, RepositoryState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewDiff {
    pub diff: DiffResult,
    pub changes: TrackChanges,
    /// No committed snapshot to compare against; every track is new
    pub first_commit: bool,
}

/// Diff `candidate` against the snapshot at HEAD without touching the
/// repository. A missing repository, empty history, or HEAD without a
/// snapshot all compare against an empty project.
///
/// ## Errors
///
/// - `Validation`: either snapshot is malformed
pub fn preview_diff(root: &Path, candidate: &[u8]) -> Result<PreviewDiff> {
    log_op_start!("preview_diff", path = %root.display());
    let start = Instant::now();

    let result = preview_diff_impl(root, candidate).map_err(|e| {
        log_op_error!(
            "preview_diff",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;

    log_op_end!(
        "preview_diff",
        duration_ms = start.elapsed().as_millis() as u64,
        change_count = result.diff.total_change_count,
        first_commit = result.first_commit
    );
    Ok(result)
}

fn preview_diff_impl(root: &Path, candidate: &[u8]) -> Result<PreviewDiff> {
    let new = ProjectSnapshot::from_slice(candidate)?;

    let previous = match Repository::state(root)? {
        RepositoryState::HasHistory => Repository::open(root)?.snapshot_at("HEAD")?,
        RepositoryState::Uninitialized | RepositoryState::Empty => None,
    };
    let first_commit = previous.is_none();
    let old = match previous {
        Some(bytes) => ProjectSnapshot::from_slice(&bytes)?,
        None => ProjectSnapshot::empty(),
    };

    let diff = diff_snapshots(&old, &new)?;
    Ok(PreviewDiff {
        changes: TrackChanges::from_diff(&diff),
        diff,
        first_commit,
    })
}
