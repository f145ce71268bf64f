//! Upload ingestion: a freshly parsed snapshot plus the uploaded native
//! project files become one new revision.

#![allow(clippy::result_large_err)]

use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use stemvault_core::diff::{compute_diff, TrackChanges};
use stemvault_core::errors::Result;
use stemvault_core::{log_op_end, log_op_error, log_op_start, ProjectSnapshot, SNAPSHOT_FILE_NAME};
use stemvault_store::{CommitOutcome, CommitRequest, Repository, RepositoryState};

/// Who uploaded and why
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub author: String,
    pub author_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub commit: CommitOutcome,
    pub changes: TrackChanges,
    pub diff_attached: bool,
}

/// Commit `parsed_snapshot` and every file of `upload_dir` into the project
/// at `root`, creating the repository on first upload.
///
/// The track-change summary is diffed against the snapshot at HEAD; the
/// first upload reports every track as added and carries no diff artifact.
///
/// ## Errors
///
/// - `Validation`: the parsed snapshot or the HEAD snapshot is malformed
/// - `Init` / `Commit`: the repository could not be created or written
pub fn ingest_parsed(
    root: &Path,
    upload_dir: &Path,
    parsed_snapshot: Vec<u8>,
    meta: &UploadMeta,
) -> Result<IngestOutcome> {
    log_op_start!("ingest_upload", path = %root.display(), author_id = %meta.author_id);
    let start = Instant::now();

    let result = ingest_parsed_impl(root, upload_dir, parsed_snapshot, meta).map_err(|e| {
        log_op_error!(
            "ingest_upload",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;

    log_op_end!(
        "ingest_upload",
        duration_ms = start.elapsed().as_millis() as u64,
        revision = result.commit.revision().unwrap_or("NONE"),
        diff_attached = result.diff_attached
    );
    Ok(result)
}

fn ingest_parsed_impl(
    root: &Path,
    upload_dir: &Path,
    parsed_snapshot: Vec<u8>,
    meta: &UploadMeta,
) -> Result<IngestOutcome> {
    let snapshot = ProjectSnapshot::from_slice(&parsed_snapshot)?;

    let previous = match Repository::state(root)? {
        RepositoryState::HasHistory => Repository::open(root)?.snapshot_at("HEAD")?,
        RepositoryState::Uninitialized | RepositoryState::Empty => None,
    };
    let diff = previous
        .map(|old| compute_diff(&old, &parsed_snapshot))
        .transpose()?;

    let changes = match &diff {
        Some(diff) => TrackChanges::from_diff(diff),
        None => TrackChanges::all_added(&snapshot),
    };
    let diff_attached = diff.is_some();

    let mut request = CommitRequest::new(&meta.author, &meta.author_id, &meta.message)
        .with_changes(changes.clone());
    if let Some(diff) = diff {
        request = request.with_diff(diff);
    }

    let mut repo = Repository::initialize(root)?;
    let commit = repo.overlay_working_tree(
        upload_dir,
        &[(SNAPSHOT_FILE_NAME.to_string(), parsed_snapshot)],
        request,
    )?;

    Ok(IngestOutcome {
        commit,
        changes,
        diff_attached,
    })
}
