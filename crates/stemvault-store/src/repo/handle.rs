#![allow(clippy::result_large_err)]

use super::{
    archive, message, CommitOutcome, CommitRequest, RepositoryState, RestoreOutcome,
    RevisionInfo, RevisionKind, DIFF_SIDECAR_FILE,
};
use crate::cas::{atomic_write, FsStore};
use crate::errors::{Result, StoreContext};
use crate::ledger::{self, RevisionRow};
use crate::migrations::apply_migrations;
use crate::staging::{prune_empty_dirs, StagedRewrite};
use crate::tree::{self, TreeManifest, META_DIR};
use crate::db;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use stemvault_core::diff::{compute_diff, DiffResult, TrackChanges};
use stemvault_core::errors::{ExError, ExErrorKind, VaultError};
use stemvault_core::SNAPSHOT_FILE_NAME;

const LEDGER_FILE: &str = "ledger.db";
const CAS_DIR: &str = "cas";
const STAGING_DIR: &str = "staging";
const MIN_PREFIX_LEN: usize = 4;

/// Where the tree of a new revision comes from
enum TreeSource {
    /// Stage whatever is in the working tree now
    WorkingTree,
    /// A manifest whose blobs are already in the store
    Manifest(TreeManifest),
}

/// Handle on one project's working tree and revision history.
///
/// Layout inside the working tree:
///
/// ```text
/// <root>/.stemvault/ledger.db      revision ledger (SQLite)
/// <root>/.stemvault/cas/           blobs, tree manifests, diff artifacts
/// <root>/.stemvault/staging/       scratch space for tree rewrites
/// ```
pub struct Repository {
    root: PathBuf,
    staging_root: PathBuf,
    cas: FsStore,
    conn: Connection,
    project_id: String,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("project_id", &self.project_id)
            .finish()
    }
}

fn ledger_path(root: &Path) -> PathBuf {
    root.join(META_DIR).join(LEDGER_FILE)
}

fn dir_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

fn init_failed(root: &Path, cause: ExError) -> ExError {
    ExError::from(VaultError::InitFailed {
        path: root.display().to_string(),
        reason: cause.message().to_string(),
    })
    .with_op("initialize")
    .with_source(cause)
}

/// Content hash identifying a revision
fn revision_hash(
    parent: Option<&str>,
    tree_digest: &str,
    request: &CommitRequest,
    persisted_message: &str,
    created_at: i64,
    kind: RevisionKind,
) -> Result<String> {
    let canonical = serde_json::to_vec(&serde_json::json!([
        parent,
        tree_digest,
        request.author,
        request.author_id,
        created_at,
        persisted_message,
        kind.as_str(),
    ]))
    .store_op("revision_hash")?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Pretty-printed `diff.json` content for the revision `request` records
fn sidecar_content(request: &CommitRequest) -> Result<Option<Vec<u8>>> {
    request
        .diff
        .as_ref()
        .map(serde_json::to_vec_pretty)
        .transpose()
        .store_op("encode_diff_sidecar")
}

/// Undo a promoted rewrite after the revision could not be recorded and hand
/// back `cause`. A failed rollback is logged and its staging area kept.
fn abandon(mut staged: StagedRewrite, cause: ExError) -> ExError {
    if let Err(e) = staged.rollback() {
        tracing::error!(
            error = %e,
            cause = %cause,
            "Working tree rollback failed, backups kept in staging"
        );
        return cause;
    }
    if let Err(e) = staged.finish() {
        tracing::warn!(error = %e, "Could not remove staging area");
    }
    cause
}

impl Repository {
    /// Report whether `path` holds no repository, an empty one, or one with
    /// history
    pub fn state(path: &Path) -> Result<RepositoryState> {
        if !ledger_path(path).is_file() {
            return Ok(RepositoryState::Uninitialized);
        }
        let repo = Self::open(path)?;
        if ledger::count(&repo.conn)? == 0 {
            Ok(RepositoryState::Empty)
        } else {
            Ok(RepositoryState::HasHistory)
        }
    }

    /// Create the repository metadata under `path` (creating `path` itself
    /// if needed) and open it. Initializing an existing repository is a no-op.
    ///
    /// # Errors
    ///
    /// `Init` when the directories or the ledger cannot be created.
    pub fn initialize(path: &Path) -> Result<Self> {
        let meta = path.join(META_DIR);
        for dir in [path.to_path_buf(), meta.join(CAS_DIR), meta.join(STAGING_DIR)] {
            fs::create_dir_all(&dir)
                .store_op("create_dir")
                .map_err(|e| init_failed(path, e))?;
        }

        let mut conn = db::open(ledger_path(path)).map_err(|e| init_failed(path, e))?;
        db::configure(&conn).map_err(|e| init_failed(path, e))?;
        apply_migrations(&mut conn).map_err(|e| init_failed(path, e))?;
        ledger::init_meta(&conn, "project_id", &dir_name(path))
            .map_err(|e| init_failed(path, e))?;
        ledger::init_meta(&conn, "created_at", &Utc::now().to_rfc3339())
            .map_err(|e| init_failed(path, e))?;
        drop(conn);

        tracing::debug!(path = %path.display(), "Initialized repository");
        Self::open(path)
    }

    /// Open an existing repository.
    ///
    /// # Errors
    ///
    /// `NotFound` when `path` has not been initialized.
    pub fn open(path: &Path) -> Result<Self> {
        let ledger_file = ledger_path(path);
        if !ledger_file.is_file() {
            return Err(ExError::from(VaultError::RepositoryNotInitialized {
                path: path.display().to_string(),
            })
            .with_op("open_repository"));
        }

        let mut conn = db::open(&ledger_file)?;
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;
        let project_id = ledger::get_meta(&conn, "project_id")?.unwrap_or_else(|| dir_name(path));

        let meta = path.join(META_DIR);
        Ok(Self {
            root: path.to_path_buf(),
            staging_root: meta.join(STAGING_DIR),
            cas: FsStore::new(meta.join(CAS_DIR)),
            conn,
            project_id,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Record the current working tree as a new revision on top of HEAD.
    ///
    /// The first commit always succeeds, even for an empty tree. Later
    /// commits whose tree equals HEAD's return
    /// [`CommitOutcome::NothingToCommit`] and leave the tree alone. Otherwise
    /// `diff.json` is rewritten from the request's diff, or removed when the
    /// request has none.
    ///
    /// # Errors
    ///
    /// - `Commit` when a working-tree file cannot be staged
    /// - `Concurrency` when HEAD moved while the commit was being prepared
    pub fn commit(&mut self, request: CommitRequest) -> Result<CommitOutcome> {
        if let Some(head) = ledger::head(&self.conn)? {
            if tree::current_manifest(&self.root)? == self.tree_of(&head)? {
                tracing::debug!(head = %head.hash, "Working tree matches HEAD");
                return Ok(CommitOutcome::NothingToCommit);
            }
        }
        self.rewrite_working_tree(None, &[], &request, RevisionKind::Commit, false)
    }

    fn record(
        &mut self,
        request: &CommitRequest,
        kind: RevisionKind,
        restored_from: Option<String>,
        source: TreeSource,
        force: bool,
    ) -> Result<CommitOutcome> {
        let tree = match source {
            TreeSource::WorkingTree => tree::stage(&self.cas, &self.root)?,
            TreeSource::Manifest(tree) => tree,
        };
        let tree_digest = self.cas.write(&tree.to_bytes()?, "json")?;
        let head = ledger::head(&self.conn)?;

        if let Some(head) = &head {
            if !force && head.tree_digest == tree_digest {
                tracing::debug!(head = %head.hash, "Working tree matches HEAD");
                return Ok(CommitOutcome::NothingToCommit);
            }
        }

        let diff_digest = match &request.diff {
            Some(diff) => {
                let bytes = serde_json::to_vec(diff).store_op("encode_diff")?;
                Some(self.cas.write(&bytes, "json")?)
            }
            None => None,
        };
        let track_changes = request
            .changes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .store_op("encode_track_changes")?;
        let persisted = message::encode(
            &request.message,
            &request.author_id,
            request.changes.as_ref(),
        )?;

        let created_at = Utc::now().timestamp_millis();
        let parent_hash = head.map(|h| h.hash);
        let hash = revision_hash(
            parent_hash.as_deref(),
            &tree_digest,
            request,
            &persisted,
            created_at,
            kind,
        )?;

        let row = RevisionRow {
            seq: 0,
            hash: hash.clone(),
            parent_hash,
            tree_digest,
            author: request.author.clone(),
            author_id: request.author_id.clone(),
            message: persisted,
            track_changes,
            diff_digest,
            kind: kind.as_str().to_string(),
            restored_from,
            created_at,
        };
        ledger::append(&mut self.conn, &row)?;

        Ok(CommitOutcome::Created { revision: hash })
    }

    /// Hash of HEAD, or `None` for a repository without revisions
    pub fn latest_revision_id(&self) -> Result<Option<String>> {
        Ok(ledger::head(&self.conn)?.map(|row| row.hash))
    }

    /// Every revision, latest first
    pub fn history(&self) -> Result<Vec<RevisionInfo>> {
        Ok(ledger::list(&self.conn)?
            .into_iter()
            .map(revision_info)
            .collect())
    }

    /// Look up one revision by full hash, unique prefix, or `HEAD`
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown revisions or an empty repository
    /// - `Validation` for a prefix matching more than one revision
    pub fn revision(&self, rev: &str) -> Result<RevisionInfo> {
        self.resolve(rev).map(revision_info)
    }

    fn resolve(&self, rev: &str) -> Result<RevisionRow> {
        let not_found = || {
            ExError::from(VaultError::RevisionNotFound {
                revision: rev.to_string(),
            })
            .with_op("resolve_revision")
            .with_project_id(self.project_id.clone())
        };

        if rev == "HEAD" {
            return ledger::head(&self.conn)?.ok_or_else(not_found);
        }

        let prefix = rev.to_ascii_lowercase();
        if prefix.len() < MIN_PREFIX_LEN || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(not_found());
        }

        let mut rows = ledger::find_by_prefix(&self.conn, &prefix)?;
        match rows.len() {
            0 => Err(not_found()),
            1 => Ok(rows.remove(0)),
            _ => Err(ExError::new(ExErrorKind::Validation)
                .with_op("resolve_revision")
                .with_revision(rev)
                .with_message(format!("Revision prefix {} is ambiguous", rev))),
        }
    }

    fn tree_of(&self, row: &RevisionRow) -> Result<TreeManifest> {
        TreeManifest::from_bytes(&self.cas.read(&row.tree_digest)?)
    }

    fn snapshot_in(&self, tree: &TreeManifest) -> Result<Option<Vec<u8>>> {
        tree.get(SNAPSHOT_FILE_NAME)
            .map(|digest| self.cas.read(digest))
            .transpose()
    }

    /// The project snapshot document stored in revision `rev`, if that
    /// revision has one
    pub fn snapshot_at(&self, rev: &str) -> Result<Option<Vec<u8>>> {
        let row = self.resolve(rev)?;
        self.snapshot_in(&self.tree_of(&row)?)
    }

    /// The project snapshot document currently in the working tree
    pub fn working_snapshot(&self) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(SNAPSHOT_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .store_op("read_working_snapshot")
    }

    /// The diff artifact recorded with revision `rev`
    ///
    /// # Errors
    ///
    /// `NotFound` when the revision is unknown or was recorded without a diff.
    pub fn diff_artifact(&self, rev: &str) -> Result<DiffResult> {
        let row = self.resolve(rev)?;
        let digest = row.diff_digest.as_deref().ok_or_else(|| {
            ExError::from(VaultError::DiffArtifactNotFound {
                revision: row.hash.clone(),
            })
            .with_op("diff_artifact")
        })?;
        serde_json::from_slice(&self.cas.read(digest)?)
            .store_op("decode_diff")
    }

    /// Zip the tree of revision `rev` into `<dest_dir>/<project>-<hash>.zip`
    pub fn export_archive(&self, rev: &str, dest_dir: &Path) -> Result<PathBuf> {
        let row = self.resolve(rev)?;
        let tree = self.tree_of(&row)?;
        let bytes = archive::build_zip(&self.cas, &tree)?;

        fs::create_dir_all(dest_dir).store_op("export_archive")?;
        let path = dest_dir.join(format!("{}-{}.zip", self.project_id, row.hash));
        atomic_write(&path, &bytes)?;
        tracing::debug!(path = %path.display(), files = tree.files.len(), "Wrote archive");
        Ok(path)
    }

    /// Bring the working tree back to revision `target` and record that as a
    /// new `revert` revision. Earlier revisions stay in history.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown target or an empty repository
    /// - `Conflict` when a path the restore must rewrite has uncommitted
    ///   edits; the working tree is left untouched
    pub fn restore(
        &mut self,
        target: &str,
        author_id: &str,
        message: &str,
    ) -> Result<RestoreOutcome> {
        let target_row = self.resolve(target)?;
        let head_row = ledger::head(&self.conn)?.ok_or_else(|| {
            ExError::from(VaultError::RevisionNotFound {
                revision: "HEAD".to_string(),
            })
            .with_op("restore")
        })?;
        let head_tree = self.tree_of(&head_row)?;
        let mut target_tree = self.tree_of(&target_row)?;

        let diff = self.restore_diff(&head_tree, &target_tree);
        let mut request = CommitRequest::new(author_id, author_id, message);
        if let Some(diff) = diff {
            request = request
                .with_changes(TrackChanges::from_diff(&diff))
                .with_diff(diff);
        }
        let diff_attached = request.diff.is_some();

        // The restored tree carries the revert's own sidecar, not the target's
        match sidecar_content(&request)? {
            Some(bytes) => {
                let digest = self.cas.write(&bytes, "bin")?;
                target_tree.files.insert(DIFF_SIDECAR_FILE.to_string(), digest);
            }
            None => {
                target_tree.files.remove(DIFF_SIDECAR_FILE);
            }
        }
        let affected = head_tree.changed_paths(&target_tree);

        for rel in &affected {
            let abs = tree::resolve_path(&self.root, rel)?;
            let current = if abs.is_file() {
                Some(tree::hash_file(&abs)?)
            } else {
                None
            };
            if current.as_deref() != head_tree.get(rel) {
                return Err(ExError::from(VaultError::RestoreConflict { path: rel.clone() })
                    .with_op("restore")
                    .with_revision(target_row.hash.clone()));
            }
        }

        let mut staged = StagedRewrite::begin(&self.staging_root, &self.root)?;
        let removed: Vec<String> = affected
            .iter()
            .filter(|rel| target_tree.get(rel).is_none())
            .cloned()
            .collect();
        for rel in &removed {
            staged.delete(rel);
        }
        for rel in &affected {
            if let Some(digest) = target_tree.get(rel) {
                staged.write_blob(rel, &self.cas, digest)?;
            }
        }
        staged.promote()?;
        prune_empty_dirs(&self.root, &removed);

        let outcome = self.record(
            &request,
            RevisionKind::Revert,
            Some(target_row.hash.clone()),
            TreeSource::Manifest(target_tree),
            true,
        );
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Revert commit failed, restoring working tree");
                return Err(abandon(staged, e));
            }
        };
        staged.finish()?;

        let revision = outcome.revision().map(str::to_string).ok_or_else(|| {
            ExError::new(ExErrorKind::Internal)
                .with_op("restore")
                .with_message("Forced revert commit recorded nothing")
        })?;
        Ok(RestoreOutcome {
            revision,
            restored_from: target_row.hash,
            paths_changed: affected,
            diff_attached,
        })
    }

    fn restore_diff(&self, head: &TreeManifest, target: &TreeManifest) -> Option<DiffResult> {
        let snapshots = self
            .snapshot_in(head)
            .and_then(|old| Ok((old, self.snapshot_in(target)?)));
        let (old, new) = match snapshots {
            Ok((Some(old), Some(new))) => (old, new),
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot unavailable, restoring without diff");
                return None;
            }
        };
        match compute_diff(&old, &new) {
            Ok(diff) => Some(diff),
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot diff failed, restoring without diff");
                None
            }
        }
    }

    /// Make the working tree an exact copy of `source_dir` plus
    /// `extra_files` (which win on path clashes), then record it as a
    /// `merge` revision. `diff.json` always follows the request's diff.
    ///
    /// # Errors
    ///
    /// Any failure before the revision is recorded leaves the working tree
    /// as it was.
    pub fn replace_working_tree(
        &mut self,
        source_dir: &Path,
        extra_files: &[(String, Vec<u8>)],
        request: CommitRequest,
    ) -> Result<CommitOutcome> {
        self.rewrite_working_tree(
            Some(source_dir),
            extra_files,
            &request,
            RevisionKind::Merge,
            true,
        )
    }

    /// Copy `source_dir` plus `extra_files` over the working tree, keeping
    /// files that are not overwritten, then record a `commit` revision.
    ///
    /// # Errors
    ///
    /// Same guarantees as [`Repository::replace_working_tree`].
    pub fn overlay_working_tree(
        &mut self,
        source_dir: &Path,
        extra_files: &[(String, Vec<u8>)],
        request: CommitRequest,
    ) -> Result<CommitOutcome> {
        self.rewrite_working_tree(
            Some(source_dir),
            extra_files,
            &request,
            RevisionKind::Commit,
            false,
        )
    }

    fn rewrite_working_tree(
        &mut self,
        source_dir: Option<&Path>,
        extra_files: &[(String, Vec<u8>)],
        request: &CommitRequest,
        kind: RevisionKind,
        replace: bool,
    ) -> Result<CommitOutcome> {
        enum Incoming<'a> {
            File(PathBuf),
            Bytes(&'a [u8]),
        }

        let sidecar = sidecar_content(request)?;
        let mut incoming: BTreeMap<String, Incoming<'_>> = BTreeMap::new();
        if let Some(dir) = source_dir {
            for entry in tree::scan(dir)? {
                incoming.insert(entry.rel_path, Incoming::File(entry.abs_path));
            }
        }
        for (rel, bytes) in extra_files {
            incoming.insert(rel.clone(), Incoming::Bytes(bytes.as_slice()));
        }
        match &sidecar {
            Some(bytes) => {
                incoming.insert(
                    DIFF_SIDECAR_FILE.to_string(),
                    Incoming::Bytes(bytes.as_slice()),
                );
            }
            None => {
                incoming.remove(DIFF_SIDECAR_FILE);
            }
        }

        let mut removed: Vec<String> = if replace {
            tree::scan(&self.root)?
                .into_iter()
                .map(|entry| entry.rel_path)
                .filter(|rel| !incoming.contains_key(rel))
                .collect()
        } else {
            Vec::new()
        };
        if !replace && sidecar.is_none() && self.root.join(DIFF_SIDECAR_FILE).is_file() {
            removed.push(DIFF_SIDECAR_FILE.to_string());
        }

        let mut staged = StagedRewrite::begin(&self.staging_root, &self.root)?;
        for rel in &removed {
            staged.delete(rel);
        }
        for (rel, content) in &incoming {
            match content {
                Incoming::File(path) => staged.write_file(rel, path)?,
                Incoming::Bytes(bytes) => staged.write(rel, bytes)?,
            }
        }
        staged.promote()?;
        prune_empty_dirs(&self.root, &removed);

        match self.record(request, kind, None, TreeSource::WorkingTree, false) {
            Ok(outcome) => {
                staged.finish()?;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = kind.as_str(),
                    "Commit failed, restoring working tree"
                );
                Err(abandon(staged, e))
            }
        }
    }
}

fn revision_info(row: RevisionRow) -> RevisionInfo {
    let changes = match row.track_changes.as_deref() {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| tracing::debug!(hash = %row.hash, error = %e, "Undecodable track changes"))
            .ok(),
        None => message::decode_changes(&row.message),
    };
    let kind = RevisionKind::parse(&row.kind).unwrap_or_else(|| {
        tracing::warn!(hash = %row.hash, kind = %row.kind, "Unknown revision kind");
        RevisionKind::Commit
    });

    RevisionInfo {
        timestamp: DateTime::<Utc>::from_timestamp_millis(row.created_at).unwrap_or_default(),
        has_diff_artifact: row.diff_digest.is_some(),
        hash: row.hash,
        parent: row.parent_hash,
        author: row.author,
        author_id: row.author_id,
        message: row.message,
        changes,
        kind,
        restored_from: row.restored_from,
    }
}
