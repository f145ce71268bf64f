//! Async project service
//!
//! Maps project ids onto `<repositories_root>/<project-id>`, serializes writes
//! per project, and runs the blocking repository commands on tokio's blocking
//! pool so one slow project never stalls another.

#![allow(clippy::result_large_err)]

use crate::commands::{
    self, IngestOutcome, MergeOutcome, PreviewDiff, Proposal, ProposalDecision, UploadMeta,
};
use crate::config::EngineConfig;
use crate::locks::ProjectLocks;
use crate::parser::run_parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stemvault_core::core_types::OperationContext;
use stemvault_core::diff::DiffResult;
use stemvault_core::errors::{ExError, ExErrorKind, Result};
use stemvault_store::{CommitOutcome, CommitRequest, RepositoryState, RestoreOutcome, RevisionInfo};

/// Entry point for callers on a tokio runtime
#[derive(Debug, Clone)]
pub struct ProjectService {
    config: Arc<EngineConfig>,
    locks: ProjectLocks,
}

fn validate_id(kind: &str, id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ExError::new(ExErrorKind::Validation)
            .with_op("resolve_project")
            .with_entity_id(id)
            .with_message(format!("invalid {} id {:?}", kind, id)))
    }
}

/// Run a blocking command, tagging any error with the operation context
async fn blocking<T, F>(ctx: &OperationContext, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(f).await.map_err(|e| {
        ExError::new(ExErrorKind::Internal)
            .with_op("spawn_blocking")
            .with_message(e.to_string())
    });
    result.and_then(|r| r).map_err(|e| {
        let e = e.with_request_id(ctx.request_id.clone());
        match &ctx.project_id {
            Some(project_id) => e.with_project_id(project_id.clone()),
            None => e,
        }
    })
}

impl ProjectService {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            locks: ProjectLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Working-tree path of `project_id`
    ///
    /// # Errors
    ///
    /// `Validation` for ids that are empty, start with `.`, or contain
    /// anything but ASCII letters, digits, `-`, `_` and `.`.
    pub fn project_path(&self, project_id: &str) -> Result<PathBuf> {
        validate_id("project", project_id)?;
        Ok(self.config.repositories_root.join(project_id))
    }

    fn context(&self, project_id: &str) -> OperationContext {
        let ctx = OperationContext::for_project(project_id);
        tracing::debug!(project_id, request_id = %ctx.request_id, "Project operation");
        ctx
    }

    /// Run a blocking write command under the project's writer lock. The
    /// guard is owned by the blocking task and released when `f` returns,
    /// even if the caller has stopped awaiting.
    async fn exclusive<T, F>(&self, project_id: &str, ctx: &OperationContext, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let guard = self.locks.acquire(project_id).await;
        blocking(ctx, move || {
            let _guard = guard;
            f()
        })
        .await
    }

    pub async fn init(&self, project_id: &str) -> Result<RepositoryState> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        self.exclusive(project_id, &ctx, move || commands::init_project(&root))
            .await
    }

    pub async fn commit(&self, project_id: &str, request: CommitRequest) -> Result<CommitOutcome> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        self.exclusive(project_id, &ctx, move || commands::commit_project(&root, request))
            .await
    }

    pub async fn history(&self, project_id: &str) -> Result<Vec<RevisionInfo>> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        blocking(&ctx, move || commands::project_history(&root)).await
    }

    pub async fn latest_revision(&self, project_id: &str) -> Result<Option<String>> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        blocking(&ctx, move || commands::latest_revision(&root)).await
    }

    pub async fn restore(
        &self,
        project_id: &str,
        target: &str,
        author_id: &str,
        message: &str,
    ) -> Result<RestoreOutcome> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        let (target, author_id, message) =
            (target.to_string(), author_id.to_string(), message.to_string());
        self.exclusive(project_id, &ctx, move || {
            commands::restore_project(&root, &target, &author_id, &message)
        })
        .await
    }

    /// Export `rev` as a zip under `dest_dir` (default: the configured
    /// archive directory). Does not wait for writers.
    ///
    /// # Errors
    ///
    /// `ParseTimeout` when the export outlives `archive.timeout_secs`.
    pub async fn export_archive(
        &self,
        project_id: &str,
        rev: &str,
        dest_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        let rev = rev.to_string();
        let dest = dest_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.archive.output_dir.clone());
        let timeout_secs = self.config.archive.timeout_secs;

        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            blocking(&ctx, move || commands::export_archive(&root, &rev, &dest)),
        )
        .await
        .map_err(|_| {
            ExError::new(ExErrorKind::ParseTimeout)
                .with_op("export_archive")
                .with_project_id(project_id)
                .with_request_id(ctx.request_id.clone())
                .with_message(format!("archive export exceeded {}s", timeout_secs))
        })?
    }

    pub async fn diff_artifact(&self, project_id: &str, rev: &str) -> Result<DiffResult> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        let rev = rev.to_string();
        blocking(&ctx, move || commands::diff_artifact(&root, &rev)).await
    }

    pub async fn diff_revisions(
        &self,
        project_id: &str,
        old: &str,
        new: &str,
    ) -> Result<DiffResult> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        let (old, new) = (old.to_string(), new.to_string());
        blocking(&ctx, move || commands::diff_revisions(&root, &old, &new)).await
    }

    /// Diff `candidate` against HEAD; never mutates the project
    pub async fn preview_diff(&self, project_id: &str, candidate: Vec<u8>) -> Result<PreviewDiff> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        blocking(&ctx, move || commands::preview_diff(&root, &candidate)).await
    }

    /// Parse an upload directory with the external parser and commit the
    /// result together with the uploaded files.
    ///
    /// # Errors
    ///
    /// - `ParseTimeout` / `ParserFailure`: nothing is written to the project
    /// - see [`commands::ingest_parsed`] for the rest
    pub async fn ingest_upload(
        &self,
        project_id: &str,
        upload_dir: &Path,
        meta: UploadMeta,
    ) -> Result<IngestOutcome> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);

        let scratch = tempfile::TempDir::new().map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("ingest_upload")
                .with_message(format!("cannot create parser scratch dir: {}", e))
        })?;
        let parsed = run_parser(&self.config.parser, upload_dir, scratch.path())
            .await
            .map_err(|e| e.with_project_id(project_id).with_request_id(ctx.request_id.clone()))?;

        let upload_dir = upload_dir.to_path_buf();
        self.exclusive(project_id, &ctx, move || {
            commands::ingest_parsed(&root, &upload_dir, parsed, &meta)
        })
        .await
    }

    /// Accept or reject collaboration proposal `proposal_id`, whose tree
    /// lives at `<collaboration_root>/<proposal_id>`
    pub async fn decide_proposal(
        &self,
        project_id: &str,
        proposal_id: &str,
        decision: ProposalDecision,
        author: &str,
        author_id: &str,
        description: &str,
    ) -> Result<MergeOutcome> {
        validate_id("proposal", proposal_id)?;
        let proposal = Proposal {
            id: proposal_id.to_string(),
            dir: self.config.collaboration_root.join(proposal_id),
            author: author.to_string(),
            author_id: author_id.to_string(),
            description: description.to_string(),
        };
        self.apply_proposal(project_id, proposal, decision).await
    }

    /// Apply `decision` on a proposal whose tree may live anywhere. Only an
    /// accepted proposal waits for the project's writer lock.
    pub async fn apply_proposal(
        &self,
        project_id: &str,
        proposal: Proposal,
        decision: ProposalDecision,
    ) -> Result<MergeOutcome> {
        let root = self.project_path(project_id)?;
        let ctx = self.context(project_id);
        let apply = move || commands::apply_proposal(&root, &proposal, decision);
        match decision {
            ProposalDecision::Accepted => self.exclusive(project_id, &ctx, apply).await,
            ProposalDecision::Rejected => blocking(&ctx, apply).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[tokio::test]
    async fn test_abandoned_writer_keeps_lock_until_command_finishes() {
        // Given a write command that blocks until released
        let service = ProjectService::new(EngineConfig::default());
        let ctx = OperationContext::for_project("song");
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let writer = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .exclusive("song", &ctx, move || {
                        started_tx.send(()).ok();
                        release_rx.recv().ok();
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::spawn_blocking(move || started_rx.recv())
            .await
            .unwrap()
            .unwrap();

        // When the caller gives up while the command is still running
        writer.abort();
        assert!(writer.await.unwrap_err().is_cancelled());

        // Then the project stays locked until the command returns
        let early =
            tokio::time::timeout(Duration::from_millis(100), service.locks.acquire("song")).await;
        assert!(early.is_err());

        release_tx.send(()).unwrap();
        let late =
            tokio::time::timeout(Duration::from_secs(5), service.locks.acquire("song")).await;
        assert!(late.is_ok());
    }
}
