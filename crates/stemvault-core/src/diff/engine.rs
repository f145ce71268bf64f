//! Track diff computation engine.
//!
//! The core entry point is [`compute_diff`], which accepts raw snapshot
//! bytes for two revisions and produces a [`DiffResult`].

#![allow(clippy::result_large_err)]

use crate::diff::comparators::{default_comparators, TrackComparator};
use crate::diff::model::{ChangeRecord, DiffResult, TrackDiff, TrackStatus};
use crate::diff::summary::summarize;
use crate::errors::{ExError, ExErrorKind, Result};
use crate::model::{ProjectSnapshot, Track};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Runs a fixed, ordered list of comparators over tracks matched by id
pub struct DiffEngine {
    comparators: Vec<Box<dyn TrackComparator>>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::with_comparators(default_comparators())
    }
}

impl DiffEngine {
    pub fn with_comparators(comparators: Vec<Box<dyn TrackComparator>>) -> Self {
        Self { comparators }
    }

    /// Diff two validated snapshots.
    ///
    /// # Errors
    ///
    /// `DeterminismViolation` if the result does not survive a JSON round trip.
    pub fn diff(&self, old: &ProjectSnapshot, new: &ProjectSnapshot) -> Result<DiffResult> {
        let old_by_id: HashMap<&str, &Track> =
            old.tracks.iter().map(|t| (t.id.as_str(), t)).collect();
        let new_ids: HashSet<&str> = new.tracks.iter().map(|t| t.id.as_str()).collect();

        let mut per_track_changes = Vec::new();
        let mut added_tracks = Vec::new();
        let mut removed_tracks = Vec::new();
        let mut modified_track_names = Vec::new();

        for new_track in &new.tracks {
            match old_by_id.get(new_track.id.as_str()) {
                None => {
                    added_tracks.push(new_track.name.clone());
                    per_track_changes.push(TrackDiff {
                        track_id: new_track.id.clone(),
                        track_name: new_track.name.clone(),
                        track_type: new_track.kind.as_str().to_string(),
                        status: TrackStatus::Added,
                        changes: vec![ChangeRecord::TrackAdded {
                            track_id: new_track.id.clone(),
                            track_name: new_track.name.clone(),
                        }],
                    });
                }
                Some(old_track) => {
                    let changes: Vec<ChangeRecord> = self
                        .comparators
                        .iter()
                        .flat_map(|c| c.compare(old_track, new_track, &new_track.name))
                        .collect();
                    if !changes.is_empty() {
                        modified_track_names.push(new_track.name.clone());
                        per_track_changes.push(TrackDiff {
                            track_id: new_track.id.clone(),
                            track_name: new_track.name.clone(),
                            track_type: new_track.kind.as_str().to_string(),
                            status: TrackStatus::Modified,
                            changes,
                        });
                    }
                }
            }
        }

        for old_track in old
            .tracks
            .iter()
            .filter(|t| !new_ids.contains(t.id.as_str()))
        {
            removed_tracks.push(old_track.name.clone());
            per_track_changes.push(TrackDiff {
                track_id: old_track.id.clone(),
                track_name: old_track.name.clone(),
                track_type: old_track.kind.as_str().to_string(),
                status: TrackStatus::Removed,
                changes: vec![ChangeRecord::TrackRemoved {
                    track_id: old_track.id.clone(),
                    track_name: old_track.name.clone(),
                }],
            });
        }

        let summary = summarize(&per_track_changes);
        let diff = DiffResult {
            total_change_count: summary.counters.total,
            per_track_changes,
            added_tracks,
            removed_tracks,
            modified_track_names,
            text_summary: summary.text,
            counters: summary.counters,
        };

        ensure_round_trip(&diff)?;
        Ok(diff)
    }
}

/// Determinism guard: round-trip through JSON must produce an equal struct
fn ensure_round_trip(diff: &DiffResult) -> Result<()> {
    let serialized = serde_json::to_string(diff).map_err(|e| {
        ExError::new(ExErrorKind::DeterminismViolation)
            .with_op("compute_diff")
            .with_message(format!("failed to serialize diff: {}", e))
    })?;
    let reparsed: DiffResult = serde_json::from_str(&serialized).map_err(|e| {
        ExError::new(ExErrorKind::DeterminismViolation)
            .with_op("compute_diff")
            .with_message(format!("failed to re-parse diff: {}", e))
    })?;
    if &reparsed != diff {
        return Err(ExError::new(ExErrorKind::DeterminismViolation)
            .with_op("compute_diff")
            .with_message("diff is not deterministic: round-trip produced different struct"));
    }
    Ok(())
}

/// Diff two validated snapshots with the default comparator set.
///
/// # Errors
///
/// See [`DiffEngine::diff`].
pub fn diff_snapshots(old: &ProjectSnapshot, new: &ProjectSnapshot) -> Result<DiffResult> {
    DiffEngine::default().diff(old, new)
}

/// Compute a structured, deterministic diff between two snapshot documents.
///
/// # Errors
///
/// - `Validation`: either side is not UTF-8 JSON, lacks `tracks`, or has a
///   malformed track. The whole diff is aborted.
/// - `DeterminismViolation`: the computed diff fails its round-trip check
pub fn compute_diff(old_bytes: &[u8], new_bytes: &[u8]) -> Result<DiffResult> {
    let old = ProjectSnapshot::from_slice(old_bytes)?;
    let new = ProjectSnapshot::from_slice(new_bytes)?;
    diff_snapshots(&old, &new)
}

/// [`compute_diff`] over already-parsed JSON documents.
///
/// # Errors
///
/// Same as [`compute_diff`], minus JSON syntax errors.
pub fn compute_diff_values(old: &Value, new: &Value) -> Result<DiffResult> {
    let old = ProjectSnapshot::from_value(old)?;
    let new = ProjectSnapshot::from_value(new)?;
    diff_snapshots(&old, &new)
}
