//! Semantic track diff.
//!
//! Compares two project snapshots track by track and produces typed change
//! records plus a compact text summary.
//!
//! ## Entry point
//!
//! ```ignore
//! use stemvault_core::diff::compute_diff;
//!
//! let diff = compute_diff(old_bytes, new_bytes)?;
//! println!("{}", diff.text_summary);
//! ```
//!
//! ## Guarantees
//!
//! - **Determinism**: identical inputs produce byte-identical serialized output.
//! - **Identity by id**: tracks are matched by `id`, never by name or position.
//! - **Tolerant note matching**: notes within 0.1 beat and 0.1 beat duration of
//!   each other with equal pitch are the same note; anything else is an
//!   addition plus a removal.
//! - **Strict input**: a malformed snapshot aborts the diff with `ERR_VALIDATION`.

pub mod comparators;
pub mod engine;
pub mod model;
pub mod summary;

pub use comparators::TrackComparator;
pub use engine::{compute_diff, compute_diff_values, diff_snapshots, DiffEngine};
pub use model::{
    ChangeRecord, DiffCounters, DiffResult, TrackChanges, TrackDiff, TrackRef, TrackStatus,
};
pub use summary::{render_summary, DiffSummary};
