//! Command orchestration layer.
//!
//! Synchronous, project-path based commands. Each one opens the repository,
//! does its work and owns the lifecycle logging for it. Callers on an async
//! runtime should go through [`crate::ProjectService`], which adds per-project
//! locking and runs these on blocking threads.

pub mod collaboration;
pub mod history;
pub mod ingest;
pub mod preview;

pub use collaboration::{apply_proposal, MergeOutcome, Proposal, ProposalDecision};
pub use history::{
    commit_project, diff_artifact, diff_revisions, export_archive, init_project, latest_revision,
    project_history, restore_project,
};
pub use ingest::{ingest_parsed, IngestOutcome, UploadMeta};
pub use preview::{preview_diff, PreviewDiff};
