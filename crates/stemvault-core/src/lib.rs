//! StemVault Core - snapshot model, semantic diff and summaries
//!
//! This crate provides the pure, filesystem-free half of StemVault:
//! - Canonical error facility (`ExError`) and domain error taxonomy
//! - Structured logging facility built on `tracing`
//! - Project snapshot model with validation and numeric coercion
//! - Track-level diff engine with an ordered comparator set
//! - Deterministic summary generator

pub mod diff;
pub mod errors;
pub mod logging_facility;
pub mod model;

pub use stemvault_core_types as core_types;

// Re-export commonly used types
pub use diff::{
    compute_diff, diff_snapshots, render_summary, ChangeRecord, DiffResult, TrackChanges,
};
pub use errors::{ExError, ExErrorKind, Result, VaultError};
pub use model::{ProjectSnapshot, Track, SNAPSHOT_FILE_NAME};
