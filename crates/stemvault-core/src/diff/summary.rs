//! Deterministic summary generator for track diffs.
//!
//! Repetitive note edits are folded into one sentence per kind; each track
//! is capped at [`MAX_LINES_PER_TRACK`] lines.

use crate::diff::model::{ChangeRecord, DiffCounters, DiffResult, TrackDiff, TrackStatus};
use serde::{Deserialize, Serialize};

/// More records than this of one aggregatable kind collapse into one line
pub const AGGREGATE_THRESHOLD: usize = 3;
pub const MAX_LINES_PER_TRACK: usize = 5;

pub const NO_CHANGES_TEXT: &str = "No changes detected.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffSummary {
    pub text: String,
    pub counters: DiffCounters,
}

/// Summarize an existing diff result.
pub fn render_summary(diff: &DiffResult) -> DiffSummary {
    summarize(&diff.per_track_changes)
}

pub fn summarize(tracks: &[TrackDiff]) -> DiffSummary {
    let counters = count(tracks);
    if counters.total == 0 {
        return DiffSummary {
            text: NO_CHANGES_TEXT.to_string(),
            counters,
        };
    }

    let mut out: Vec<String> = Vec::new();
    for track in tracks.iter().filter(|t| !t.changes.is_empty()) {
        out.push(format!("Track '{}':", track.track_name));
        let lines = track_lines(&track.changes);
        let shown = lines.len().min(MAX_LINES_PER_TRACK);
        for line in &lines[..shown] {
            out.push(format!("  - {}", line.text));
        }
        let hidden: usize = lines[shown..].iter().map(|l| l.weight).sum();
        if hidden > 0 {
            out.push(format!("  ...and {} more changes", hidden));
        }
    }

    DiffSummary {
        text: out.join("\n"),
        counters,
    }
}

struct Line {
    text: String,
    /// Number of records this line stands for
    weight: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Group {
    NotesAdded,
    NotesRemoved,
    Velocity,
}

fn group_of(record: &ChangeRecord) -> Option<Group> {
    match record {
        ChangeRecord::NoteAdded { .. } => Some(Group::NotesAdded),
        ChangeRecord::NoteRemoved { .. } => Some(Group::NotesRemoved),
        ChangeRecord::NoteVelocityChanged { .. } => Some(Group::Velocity),
        _ => None,
    }
}

fn track_lines(records: &[ChangeRecord]) -> Vec<Line> {
    let size = |g: Group| records.iter().filter(|r| group_of(r) == Some(g)).count();
    let mut emitted: Vec<Group> = Vec::new();
    let mut lines = Vec::new();

    for record in records {
        match group_of(record) {
            Some(group) if size(group) > AGGREGATE_THRESHOLD => {
                if emitted.contains(&group) {
                    continue;
                }
                emitted.push(group);
                let members: Vec<&ChangeRecord> = records
                    .iter()
                    .filter(|r| group_of(r) == Some(group))
                    .collect();
                lines.push(Line {
                    text: aggregate(group, &members),
                    weight: members.len(),
                });
            }
            _ => lines.push(Line {
                text: record.describe(),
                weight: 1,
            }),
        }
    }
    lines
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn aggregate(group: Group, members: &[&ChangeRecord]) -> String {
    let n = members.len();
    match group {
        Group::NotesAdded | Group::NotesRemoved => {
            let velocities: Vec<f64> = members
                .iter()
                .filter_map(|r| match r {
                    ChangeRecord::NoteAdded { velocity, .. }
                    | ChangeRecord::NoteRemoved { velocity, .. } => Some(*velocity),
                    _ => None,
                })
                .collect();
            let verb = if group == Group::NotesAdded {
                "Added"
            } else {
                "Removed"
            };
            format!(
                "{} {} notes (average velocity {:.3})",
                verb,
                n,
                mean(&velocities)
            )
        }
        Group::Velocity => {
            let deltas: Vec<f64> = members
                .iter()
                .filter_map(|r| match r {
                    ChangeRecord::NoteVelocityChanged { from, to, .. } => Some(to - from),
                    _ => None,
                })
                .collect();
            let ups = deltas.iter().filter(|d| **d > 0.0).count();
            let downs = deltas.iter().filter(|d| **d < 0.0).count();
            let magnitudes: Vec<f64> = deltas.iter().map(|d| d.abs()).collect();
            let avg = mean(&magnitudes);
            if ups == n {
                format!("Raised velocity of {} notes (average change {:.3})", n, avg)
            } else if downs == n {
                format!("Lowered velocity of {} notes (average change {:.3})", n, avg)
            } else {
                format!(
                    "Changed velocity of {} notes ({} up, {} down, average change {:.3})",
                    n, ups, downs, avg
                )
            }
        }
    }
}

fn count(tracks: &[TrackDiff]) -> DiffCounters {
    let mut c = DiffCounters::default();
    for track in tracks {
        if track.status == TrackStatus::Modified {
            c.tracks_modified += 1;
        }
        for record in &track.changes {
            c.total += 1;
            match record {
                ChangeRecord::TrackAdded { .. } => c.tracks_added += 1,
                ChangeRecord::TrackRemoved { .. } => c.tracks_removed += 1,
                ChangeRecord::NoteAdded { .. } => c.notes_added += 1,
                ChangeRecord::NoteRemoved { .. } => c.notes_removed += 1,
                ChangeRecord::NoteVelocityChanged { .. } => c.velocity_changes += 1,
                ChangeRecord::TrackParameterChanged { .. } => c.parameter_changes += 1,
                ChangeRecord::LoopPointsChanged { .. } | ChangeRecord::LoopToggled { .. } => {
                    c.loop_changes += 1
                }
                ChangeRecord::AudioSourceChanged { .. }
                | ChangeRecord::AudioClipChanged { .. } => c.audio_changes += 1,
            }
        }
    }
    c
}
