//! StemVault Store - per-project revision history on disk
//!
//! Provides:
//! - Content-addressable storage (CAS) for file blobs, tree manifests and
//!   diff artifacts
//! - SQLite revision ledger with a migrations framework
//! - Working-tree scanning and staged, all-or-nothing tree rewrites
//! - The [`Repository`] handle: init, commit, history, restore, archive export

pub mod cas;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod migrations;
pub mod repo;
pub mod staging;
pub mod tree;

// Re-export key types
pub use errors::Result;
pub use repo::{
    CommitOutcome, CommitRequest, Repository, RepositoryState, RestoreOutcome, RevisionInfo,
    RevisionKind, DIFF_SIDECAR_FILE,
};
