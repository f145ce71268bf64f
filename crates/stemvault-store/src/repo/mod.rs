//! Repository handle and its value types
//!
//! One [`Repository`] value per project path. Writers are expected to be
//! serialized per project by the caller; readers may run concurrently.

mod archive;
mod handle;
pub mod message;

pub use handle::Repository;

/// Tree file mirroring the diff artifact of HEAD. Absent when HEAD was
/// recorded without one.
pub const DIFF_SIDECAR_FILE: &str = "diff.json";

use chrono::{DateTime, Utc};
use serde::Serialize;
use stemvault_core::diff::{DiffResult, TrackChanges};

/// Lifecycle of a repository directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryState {
    Uninitialized,
    Empty,
    HasHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    Commit,
    Revert,
    Merge,
}

impl RevisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionKind::Commit => "commit",
            RevisionKind::Revert => "revert",
            RevisionKind::Merge => "merge",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "commit" => Some(RevisionKind::Commit),
            "revert" => Some(RevisionKind::Revert),
            "merge" => Some(RevisionKind::Merge),
            _ => None,
        }
    }
}

/// One entry of `history()`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionInfo {
    pub hash: String,
    pub parent: Option<String>,
    pub author: String,
    pub author_id: String,
    pub timestamp: DateTime<Utc>,
    /// Persisted message, trailers included
    pub message: String,
    /// Decoded track changes; `None` when absent or undecodable
    pub changes: Option<TrackChanges>,
    pub kind: RevisionKind,
    pub restored_from: Option<String>,
    pub has_diff_artifact: bool,
}

impl RevisionInfo {
    /// Message without the `User-ID`/`Track-Changes` trailers
    pub fn subject(&self) -> &str {
        message::subject(&self.message)
    }

    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(12)]
    }
}

/// Inputs for one commit
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    pub author: String,
    pub author_id: String,
    pub message: String,
    /// Track-level summary, also written into the message trailer
    pub changes: Option<TrackChanges>,
    /// Diff artifact stored beside the revision
    pub diff: Option<DiffResult>,
}

impl CommitRequest {
    pub fn new(
        author: impl Into<String>,
        author_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            author_id: author_id.into(),
            message: message.into(),
            changes: None,
            diff: None,
        }
    }

    pub fn with_changes(mut self, changes: TrackChanges) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_diff(mut self, diff: DiffResult) -> Self {
        self.diff = Some(diff);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    Created { revision: String },
    /// Working tree equals HEAD; nothing was recorded
    NothingToCommit,
}

impl CommitOutcome {
    pub fn revision(&self) -> Option<&str> {
        match self {
            CommitOutcome::Created { revision } => Some(revision),
            CommitOutcome::NothingToCommit => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreOutcome {
    /// The new revert revision
    pub revision: String,
    pub restored_from: String,
    /// Paths rewritten in the working tree
    pub paths_changed: Vec<String>,
    pub diff_attached: bool,
}
