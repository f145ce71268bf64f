//! Collaboration merge adapter.
//!
//! An accepted proposal replaces the canonical working tree with the
//! proposal directory and is recorded as one `merge` revision authored by
//! the collaborator. When a prior snapshot exists the diff is attached to the
//! revision, which the repository mirrors into the tree as `diff.json`. A
//! rejected proposal touches nothing on disk.

#![allow(clippy::result_large_err)]

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use stemvault_core::diff::{compute_diff, DiffResult, TrackChanges};
use stemvault_core::errors::{ExError, ExErrorKind, Result};
use stemvault_core::{log_op_end, log_op_error, log_op_start, ProjectSnapshot, SNAPSHOT_FILE_NAME};
use stemvault_store::{CommitRequest, Repository, RepositoryState};

pub use stemvault_store::DIFF_SIDECAR_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalDecision {
    Accepted,
    Rejected,
}

impl FromStr for ProposalDecision {
    type Err = ExError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "accepted" | "accept" => Ok(ProposalDecision::Accepted),
            "rejected" | "reject" => Ok(ProposalDecision::Rejected),
            other => Err(ExError::new(ExErrorKind::Validation)
                .with_op("parse_decision")
                .with_message(format!("unknown proposal decision {:?}", other))),
        }
    }
}

/// A collaborator's alternate project tree awaiting a decision
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: String,
    pub dir: PathBuf,
    pub author: String,
    pub author_id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged {
        /// `None` when the proposal matched HEAD exactly
        revision: Option<String>,
        changes: Option<TrackChanges>,
        diff_attached: bool,
    },
    Rejected,
}

/// Apply the decision on `proposal` to the project at `root`
///
/// ## Errors
///
/// - `NotFound`: the proposal directory does not exist
/// - `Validation`: the proposal's or HEAD's snapshot is malformed
/// - `Commit`: the merged tree could not be recorded; the working tree is
///   restored
pub fn apply_proposal(
    root: &Path,
    proposal: &Proposal,
    decision: ProposalDecision,
) -> Result<MergeOutcome> {
    log_op_start!(
        "apply_proposal",
        path = %root.display(),
        proposal_id = %proposal.id,
        decision = ?decision
    );
    let start = Instant::now();

    let result = match decision {
        ProposalDecision::Accepted => merge_proposal(root, proposal),
        ProposalDecision::Rejected => Ok(MergeOutcome::Rejected),
    }
    .map_err(|e| {
        log_op_error!(
            "apply_proposal",
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        e
    })?;

    log_op_end!(
        "apply_proposal",
        duration_ms = start.elapsed().as_millis() as u64,
        outcome = ?result
    );
    Ok(result)
}

fn merge_proposal(root: &Path, proposal: &Proposal) -> Result<MergeOutcome> {
    if !proposal.dir.is_dir() {
        return Err(ExError::new(ExErrorKind::NotFound)
            .with_op("apply_proposal")
            .with_entity_id(proposal.id.clone())
            .with_message(format!(
                "proposal directory {} does not exist",
                proposal.dir.display()
            )));
    }

    let previous = match Repository::state(root)? {
        RepositoryState::HasHistory => Repository::open(root)?.snapshot_at("HEAD")?,
        RepositoryState::Uninitialized | RepositoryState::Empty => None,
    };
    let incoming = read_proposal_snapshot(&proposal.dir)?;

    let diff: Option<DiffResult> = match (previous, &incoming) {
        (Some(old), Some(new)) => Some(compute_diff(&old, new)?),
        (None, Some(new)) => {
            // Initial commit: validate, nothing to diff against
            ProjectSnapshot::from_slice(new)?;
            None
        }
        (_, None) => None,
    };

    let mut request =
        CommitRequest::new(&proposal.author, &proposal.author_id, &proposal.description);
    let changes = diff.as_ref().map(TrackChanges::from_diff);
    if let Some(diff) = diff {
        request = request.with_diff(diff);
    }
    if let Some(changes) = &changes {
        request = request.with_changes(changes.clone());
    }
    let diff_attached = request.diff.is_some();

    let mut repo = Repository::initialize(root)?;
    let outcome = repo.replace_working_tree(&proposal.dir, &[], request)?;

    Ok(MergeOutcome::Merged {
        revision: outcome.revision().map(str::to_string),
        changes,
        diff_attached,
    })
}

fn read_proposal_snapshot(dir: &Path) -> Result<Option<Vec<u8>>> {
    let path = dir.join(SNAPSHOT_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }
    std::fs::read(&path).map(Some).map_err(|e| {
        ExError::new(ExErrorKind::Io)
            .with_op("apply_proposal")
            .with_entity_id(path.display().to_string())
            .with_message(e.to_string())
    })
}
