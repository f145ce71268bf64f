//! Track comparators.
//!
//! Each comparator inspects one aspect of a pair of tracks sharing an id and
//! returns its change records. The engine runs them in a fixed order; adding
//! a comparator means adding an implementation to that list.

use crate::diff::model::ChangeRecord;
use crate::model::{Event, Track};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Two notes are the same note when their global beats differ by less than this
pub const NOTE_BEAT_TOLERANCE: f64 = 0.1;
/// ... and their durations differ by less than this
pub const NOTE_DURATION_TOLERANCE: f64 = 0.1;
/// Events whose starts differ by less than one beat are the same clip
pub const EVENT_START_TOLERANCE: f64 = 1.0;

pub trait TrackComparator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compare two versions of the same track (matched by id)
    fn compare(&self, old: &Track, new: &Track, track_name: &str) -> Vec<ChangeRecord>;
}

/// An enabled occurrence placed on the track timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatNote {
    /// `event.start + occurrence.start`
    pub beat: f64,
    pub pitch: i64,
    pub duration: f64,
    pub velocity: f64,
}

impl FlatNote {
    fn total_cmp(&self, other: &Self) -> Ordering {
        self.beat
            .total_cmp(&other.beat)
            .then(self.pitch.cmp(&other.pitch))
            .then(self.duration.total_cmp(&other.duration))
            .then(self.velocity.total_cmp(&other.velocity))
    }

    fn matches(&self, other: &Self) -> bool {
        self.pitch == other.pitch
            && (self.beat - other.beat).abs() < NOTE_BEAT_TOLERANCE
            && (self.duration - other.duration).abs() < NOTE_DURATION_TOLERANCE
    }
}

/// Flatten every enabled occurrence of a track, sorted by
/// (beat, pitch, duration, velocity). Disabled occurrences are absent.
pub fn flatten_notes(track: &Track) -> Vec<FlatNote> {
    let mut notes: Vec<FlatNote> = track
        .events
        .iter()
        .flat_map(|event| {
            event.notes.iter().flat_map(move |note| {
                note.occurrences
                    .iter()
                    .filter(|occ| occ.enabled)
                    .map(move |occ| FlatNote {
                        beat: event.start + occ.start,
                        pitch: note.pitch,
                        duration: occ.duration,
                        velocity: occ.velocity,
                    })
            })
        })
        .collect();
    notes.sort_by(FlatNote::total_cmp);
    notes
}

/// Result of pairing old notes with new notes under the tolerance policy
#[derive(Debug, Default)]
pub struct NoteMatching {
    pub pairs: Vec<(FlatNote, FlatNote)>,
    pub removed: Vec<FlatNote>,
    pub added: Vec<FlatNote>,
}

/// Pair notes as an unordered tolerance-based set difference.
///
/// Old notes are visited in sorted order; each takes the closest unclaimed
/// new note of equal pitch within tolerance (smallest beat delta, then
/// smallest duration delta, then lowest index). A moved or resized note
/// beyond tolerance is one removal plus one addition.
pub fn match_notes(old: &Track, new: &Track) -> NoteMatching {
    let old_notes = flatten_notes(old);
    let new_notes = flatten_notes(new);

    let mut by_pitch: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, note) in new_notes.iter().enumerate() {
        by_pitch.entry(note.pitch).or_default().push(idx);
    }

    let mut claimed = vec![false; new_notes.len()];
    let mut out = NoteMatching::default();

    for old_note in &old_notes {
        let best = by_pitch
            .get(&old_note.pitch)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&idx| !claimed[idx] && old_note.matches(&new_notes[idx]))
            .min_by(|&a, &b| {
                let (na, nb) = (&new_notes[a], &new_notes[b]);
                (na.beat - old_note.beat)
                    .abs()
                    .total_cmp(&(nb.beat - old_note.beat).abs())
                    .then(
                        (na.duration - old_note.duration)
                            .abs()
                            .total_cmp(&(nb.duration - old_note.duration).abs()),
                    )
                    .then(a.cmp(&b))
            });

        match best {
            Some(idx) => {
                claimed[idx] = true;
                out.pairs.push((*old_note, new_notes[idx]));
            }
            None => out.removed.push(*old_note),
        }
    }

    out.added = new_notes
        .iter()
        .zip(claimed.iter())
        .filter(|(_, taken)| !**taken)
        .map(|(note, _)| *note)
        .collect();
    out
}

/// Pair events whose starts are within [`EVENT_START_TOLERANCE`], nearest first.
/// Returns `(old_index, new_index)` in old-event order.
pub fn match_events(old: &[Event], new: &[Event]) -> Vec<(usize, usize)> {
    let mut claimed = vec![false; new.len()];
    let mut pairs = Vec::new();
    for (oi, old_event) in old.iter().enumerate() {
        let best = new
            .iter()
            .enumerate()
            .filter(|(ni, ev)| {
                !claimed[*ni] && (ev.start - old_event.start).abs() < EVENT_START_TOLERANCE
            })
            .min_by(|(a_idx, a), (b_idx, b)| {
                (a.start - old_event.start)
                    .abs()
                    .total_cmp(&(b.start - old_event.start).abs())
                    .then(a_idx.cmp(b_idx))
            })
            .map(|(ni, _)| ni);
        if let Some(ni) = best {
            claimed[ni] = true;
            pairs.push((oi, ni));
        }
    }
    pairs
}

/// Notes present on only one side
pub struct NoteComparator;

impl TrackComparator for NoteComparator {
    fn name(&self) -> &'static str {
        "note"
    }

    fn compare(&self, old: &Track, new: &Track, track_name: &str) -> Vec<ChangeRecord> {
        let matching = match_notes(old, new);
        let removed = matching.removed.iter().map(|n| ChangeRecord::NoteRemoved {
            track_id: new.id.clone(),
            track_name: track_name.to_string(),
            beat: n.beat,
            pitch: n.pitch,
            duration: n.duration,
            velocity: n.velocity,
        });
        let added = matching.added.iter().map(|n| ChangeRecord::NoteAdded {
            track_id: new.id.clone(),
            track_name: track_name.to_string(),
            beat: n.beat,
            pitch: n.pitch,
            duration: n.duration,
            velocity: n.velocity,
        });
        removed.chain(added).collect()
    }
}

/// Velocity differences between matched notes
pub struct VelocityComparator;

impl TrackComparator for VelocityComparator {
    fn name(&self) -> &'static str {
        "velocity"
    }

    fn compare(&self, old: &Track, new: &Track, track_name: &str) -> Vec<ChangeRecord> {
        match_notes(old, new)
            .pairs
            .iter()
            .filter(|(a, b)| a.velocity != b.velocity)
            .map(|(a, b)| ChangeRecord::NoteVelocityChanged {
                track_id: new.id.clone(),
                track_name: track_name.to_string(),
                beat: b.beat,
                pitch: b.pitch,
                from: a.velocity,
                to: b.velocity,
            })
            .collect()
    }
}

/// Mixer parameters: volume, volumeMin, volumeMax
pub struct ParameterComparator;

impl TrackComparator for ParameterComparator {
    fn name(&self) -> &'static str {
        "parameter"
    }

    fn compare(&self, old: &Track, new: &Track, track_name: &str) -> Vec<ChangeRecord> {
        [
            ("volume", old.volume, new.volume),
            ("volumeMin", old.volume_min, new.volume_min),
            ("volumeMax", old.volume_max, new.volume_max),
        ]
        .into_iter()
        .filter(|(_, from, to)| from != to)
        .map(|(parameter, from, to)| ChangeRecord::TrackParameterChanged {
            track_id: new.id.clone(),
            track_name: track_name.to_string(),
            parameter: parameter.to_string(),
            from,
            to,
        })
        .collect()
    }
}

/// Loop region points and switch on matched events
pub struct LoopComparator;

impl TrackComparator for LoopComparator {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn compare(&self, old: &Track, new: &Track, track_name: &str) -> Vec<ChangeRecord> {
        let mut records = Vec::new();
        for (oi, ni) in match_events(&old.events, &new.events) {
            let new_event = &new.events[ni];
            let old_loop = old.events[oi].loop_region;
            let new_loop = new_event.loop_region;
            if let (Some(a), Some(b)) = (old_loop, new_loop) {
                if a.start != b.start || a.end != b.end {
                    records.push(ChangeRecord::LoopPointsChanged {
                        track_id: new.id.clone(),
                        track_name: track_name.to_string(),
                        event_start: new_event.start,
                        from_start: a.start,
                        from_end: a.end,
                        to_start: b.start,
                        to_end: b.end,
                    });
                }
            }
            // A clip without a loop region plays as if its loop were off.
            let from = old_loop.is_some_and(|l| l.on);
            let to = new_loop.is_some_and(|l| l.on);
            if from != to {
                records.push(ChangeRecord::LoopToggled {
                    track_id: new.id.clone(),
                    track_name: track_name.to_string(),
                    event_start: new_event.start,
                    from,
                    to,
                });
            }
        }
        records
    }
}

/// Track audio source and per-clip sample references (audio tracks only)
pub struct AudioComparator;

impl TrackComparator for AudioComparator {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn compare(&self, old: &Track, new: &Track, track_name: &str) -> Vec<ChangeRecord> {
        if !new.is_audio() {
            return Vec::new();
        }
        let mut records = Vec::new();
        if old.audio_file != new.audio_file {
            records.push(ChangeRecord::AudioSourceChanged {
                track_id: new.id.clone(),
                track_name: track_name.to_string(),
                from: old.audio_file.clone(),
                to: new.audio_file.clone(),
            });
        }
        for (oi, ni) in match_events(&old.events, &new.events) {
            let (a, b) = (&old.events[oi], &new.events[ni]);
            if a.audio_name != b.audio_name {
                records.push(ChangeRecord::AudioClipChanged {
                    track_id: new.id.clone(),
                    track_name: track_name.to_string(),
                    event_start: b.start,
                    from: a.audio_name.clone(),
                    to: b.audio_name.clone(),
                });
            }
        }
        records
    }
}

/// The fixed comparator order used by the default engine
pub fn default_comparators() -> Vec<Box<dyn TrackComparator>> {
    vec![
        Box::new(NoteComparator),
        Box::new(VelocityComparator),
        Box::new(ParameterComparator),
        Box::new(LoopComparator),
        Box::new(AudioComparator),
    ]
}
