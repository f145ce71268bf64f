//! Snapshot diff output types.
//!
//! All types implement `Debug, Clone, Serialize, Deserialize, PartialEq`.
//! Ordering of every collection is fixed by the engine so that serialized
//! output is byte-identical for identical inputs.

use crate::model::{ProjectSnapshot, Track};
use serde::{Deserialize, Serialize};

/// One typed unit of difference between two snapshots.
///
/// Every variant carries the track identity so records stay meaningful when
/// flattened out of their [`TrackDiff`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum ChangeRecord {
    TrackAdded {
        track_id: String,
        track_name: String,
    },
    TrackRemoved {
        track_id: String,
        track_name: String,
    },
    NoteAdded {
        track_id: String,
        track_name: String,
        beat: f64,
        pitch: i64,
        duration: f64,
        velocity: f64,
    },
    NoteRemoved {
        track_id: String,
        track_name: String,
        beat: f64,
        pitch: i64,
        duration: f64,
        velocity: f64,
    },
    NoteVelocityChanged {
        track_id: String,
        track_name: String,
        beat: f64,
        pitch: i64,
        from: f64,
        to: f64,
    },
    TrackParameterChanged {
        track_id: String,
        track_name: String,
        parameter: String,
        from: Option<f64>,
        to: Option<f64>,
    },
    LoopPointsChanged {
        track_id: String,
        track_name: String,
        /// Start of the clip carrying the loop, in the new snapshot
        event_start: f64,
        from_start: f64,
        from_end: f64,
        to_start: f64,
        to_end: f64,
    },
    LoopToggled {
        track_id: String,
        track_name: String,
        event_start: f64,
        from: bool,
        to: bool,
    },
    AudioSourceChanged {
        track_id: String,
        track_name: String,
        from: Option<String>,
        to: Option<String>,
    },
    AudioClipChanged {
        track_id: String,
        track_name: String,
        event_start: f64,
        from: Option<String>,
        to: Option<String>,
    },
}

impl ChangeRecord {
    pub fn track_id(&self) -> &str {
        match self {
            ChangeRecord::TrackAdded { track_id, .. }
            | ChangeRecord::TrackRemoved { track_id, .. }
            | ChangeRecord::NoteAdded { track_id, .. }
            | ChangeRecord::NoteRemoved { track_id, .. }
            | ChangeRecord::NoteVelocityChanged { track_id, .. }
            | ChangeRecord::TrackParameterChanged { track_id, .. }
            | ChangeRecord::LoopPointsChanged { track_id, .. }
            | ChangeRecord::LoopToggled { track_id, .. }
            | ChangeRecord::AudioSourceChanged { track_id, .. }
            | ChangeRecord::AudioClipChanged { track_id, .. } => track_id,
        }
    }

    pub fn track_name(&self) -> &str {
        match self {
            ChangeRecord::TrackAdded { track_name, .. }
            | ChangeRecord::TrackRemoved { track_name, .. }
            | ChangeRecord::NoteAdded { track_name, .. }
            | ChangeRecord::NoteRemoved { track_name, .. }
            | ChangeRecord::NoteVelocityChanged { track_name, .. }
            | ChangeRecord::TrackParameterChanged { track_name, .. }
            | ChangeRecord::LoopPointsChanged { track_name, .. }
            | ChangeRecord::LoopToggled { track_name, .. }
            | ChangeRecord::AudioSourceChanged { track_name, .. }
            | ChangeRecord::AudioClipChanged { track_name, .. } => track_name,
        }
    }

    /// Stable variant tag, identical to the serialized `kind`
    pub fn kind_name(&self) -> &'static str {
        match self {
            ChangeRecord::TrackAdded { .. } => "TrackAdded",
            ChangeRecord::TrackRemoved { .. } => "TrackRemoved",
            ChangeRecord::NoteAdded { .. } => "NoteAdded",
            ChangeRecord::NoteRemoved { .. } => "NoteRemoved",
            ChangeRecord::NoteVelocityChanged { .. } => "NoteVelocityChanged",
            ChangeRecord::TrackParameterChanged { .. } => "TrackParameterChanged",
            ChangeRecord::LoopPointsChanged { .. } => "LoopPointsChanged",
            ChangeRecord::LoopToggled { .. } => "LoopToggled",
            ChangeRecord::AudioSourceChanged { .. } => "AudioSourceChanged",
            ChangeRecord::AudioClipChanged { .. } => "AudioClipChanged",
        }
    }

    /// One-line English description. Numeric values use three decimals.
    pub fn describe(&self) -> String {
        match self {
            ChangeRecord::TrackAdded { track_name, .. } => {
                format!("Added track '{}'", track_name)
            }
            ChangeRecord::TrackRemoved { track_name, .. } => {
                format!("Removed track '{}'", track_name)
            }
            ChangeRecord::NoteAdded {
                beat,
                pitch,
                duration,
                velocity,
                ..
            } => format!(
                "Added note {} at beat {:.3} (duration {:.3}, velocity {:.3})",
                pitch, beat, duration, velocity
            ),
            ChangeRecord::NoteRemoved {
                beat,
                pitch,
                duration,
                velocity,
                ..
            } => format!(
                "Removed note {} at beat {:.3} (duration {:.3}, velocity {:.3})",
                pitch, beat, duration, velocity
            ),
            ChangeRecord::NoteVelocityChanged {
                beat,
                pitch,
                from,
                to,
                ..
            } => format!(
                "Changed velocity of note {} at beat {:.3} from {:.3} to {:.3}",
                pitch, beat, from, to
            ),
            ChangeRecord::TrackParameterChanged {
                parameter, from, to, ..
            } => format!(
                "Changed {} from {} to {}",
                parameter,
                fmt_number(*from),
                fmt_number(*to)
            ),
            ChangeRecord::LoopPointsChanged {
                event_start,
                from_start,
                from_end,
                to_start,
                to_end,
                ..
            } => format!(
                "Changed loop of clip at beat {:.3} from {:.3}-{:.3} to {:.3}-{:.3}",
                event_start, from_start, from_end, to_start, to_end
            ),
            ChangeRecord::LoopToggled {
                event_start, to, ..
            } => format!(
                "Turned loop {} for clip at beat {:.3}",
                if *to { "on" } else { "off" },
                event_start
            ),
            ChangeRecord::AudioSourceChanged { from, to, .. } => format!(
                "Changed audio source from {} to {}",
                fmt_text(from.as_deref()),
                fmt_text(to.as_deref())
            ),
            ChangeRecord::AudioClipChanged {
                event_start,
                from,
                to,
                ..
            } => format!(
                "Changed audio clip at beat {:.3} from {} to {}",
                event_start,
                fmt_text(from.as_deref()),
                fmt_text(to.as_deref())
            ),
        }
    }
}

fn fmt_number(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "unset".to_string(),
    }
}

fn fmt_text(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{}'", v),
        None => "none".to_string(),
    }
}

/// How a track participates in the diff
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Added,
    Removed,
    Modified,
}

/// All change records for one track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackDiff {
    pub track_id: String,
    pub track_name: String,
    pub track_type: String,
    pub status: TrackStatus,
    pub changes: Vec<ChangeRecord>,
}

/// Per-category tallies over every record in a diff
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffCounters {
    pub tracks_added: usize,
    pub tracks_removed: usize,
    pub tracks_modified: usize,
    pub notes_added: usize,
    pub notes_removed: usize,
    pub velocity_changes: usize,
    pub parameter_changes: usize,
    pub loop_changes: usize,
    pub audio_changes: usize,
    pub total: usize,
}

/// The structured diff between two project snapshots.
///
/// `per_track_changes` lists tracks of the new snapshot in their order
/// (added or modified), followed by removed tracks in old-snapshot order.
/// Unchanged tracks do not appear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffResult {
    pub per_track_changes: Vec<TrackDiff>,
    /// Names of tracks present only in the new snapshot
    pub added_tracks: Vec<String>,
    /// Names of tracks present only in the old snapshot
    pub removed_tracks: Vec<String>,
    /// Names of common tracks with at least one change
    pub modified_track_names: Vec<String>,
    /// Every record, including track additions and removals
    pub total_change_count: usize,
    pub text_summary: String,
    pub counters: DiffCounters,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.total_change_count == 0
    }

    /// All records flattened in `per_track_changes` order
    pub fn records(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.per_track_changes.iter().flat_map(|t| t.changes.iter())
    }
}

/// Identity of a track inside a [`TrackChanges`] summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub track_type: String,
}

impl From<&Track> for TrackRef {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            track_type: track.kind.as_str().to_string(),
        }
    }
}

/// Track-level change summary attached to a commit
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackChanges {
    #[serde(default)]
    pub added: Vec<TrackRef>,
    #[serde(default)]
    pub modified: Vec<TrackRef>,
    #[serde(default)]
    pub removed: Vec<TrackRef>,
}

impl TrackChanges {
    pub fn from_diff(diff: &DiffResult) -> Self {
        let mut out = Self::default();
        for track in &diff.per_track_changes {
            let track_ref = TrackRef {
                id: track.track_id.clone(),
                name: track.track_name.clone(),
                track_type: track.track_type.clone(),
            };
            match track.status {
                TrackStatus::Added => out.added.push(track_ref),
                TrackStatus::Removed => out.removed.push(track_ref),
                TrackStatus::Modified => out.modified.push(track_ref),
            }
        }
        out
    }

    /// Summary for a first snapshot: every track counts as added
    pub fn all_added(snapshot: &ProjectSnapshot) -> Self {
        Self {
            added: snapshot.tracks.iter().map(TrackRef::from).collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}
