//! Canonical project snapshot
//!
//! Parsing goes through a generic JSON [`Value`] rather than straight serde
//! deserialization so that every rejection names the offending track and
//! field, and so producer quirks (string-encoded numbers, alias keys) are
//! normalized in one place.

#![allow(clippy::result_large_err)]

use crate::errors::{ExError, ExErrorKind, Result, VaultError};
use crate::model::coerce;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// File name of the canonical snapshot at the root of a working tree
pub const SNAPSHOT_FILE_NAME: &str = "ableton_project.json";

const OP: &str = "parse_snapshot";

/// Parsed, validated snapshot of a project's tracks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSnapshot {
    /// Every top-level key other than `tracks`, carried verbatim
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
    pub tracks: Vec<Track>,
}

/// Track flavour as reported by the producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackKind {
    Midi,
    Audio,
    Other(String),
}

impl TrackKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "MidiTrack" => TrackKind::Midi,
            "AudioTrack" => TrackKind::Audio,
            other => TrackKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrackKind::Midi => "MidiTrack",
            TrackKind::Audio => "AudioTrack",
            TrackKind::Other(raw) => raw,
        }
    }
}

impl Serialize for TrackKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(rename = "volumeMin", skip_serializing_if = "Option::is_none")]
    pub volume_min: Option<f64>,
    #[serde(rename = "volumeMax", skip_serializing_if = "Option::is_none")]
    pub volume_max: Option<f64>,
    pub events: Vec<Event>,
    /// Track-level audio source (`audio_file`, or the legacy `wav_file`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
}

impl Track {
    pub fn is_audio(&self) -> bool {
        self.kind == TrackKind::Audio
    }
}

/// A timeline region (clip) on a track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub start: f64,
    pub end: f64,
    pub notes: Vec<Note>,
    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_region: Option<LoopRegion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub pitch: i64,
    pub occurrences: Vec<Occurrence>,
}

/// One sounding instance of a note, relative to its event's start
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Occurrence {
    pub start: f64,
    pub duration: f64,
    pub velocity: f64,
    pub enabled: bool,
}

impl ProjectSnapshot {
    /// Snapshot with no tracks and no metadata
    pub fn empty() -> Self {
        Self {
            metadata: BTreeMap::new(),
            tracks: Vec::new(),
        }
    }

    /// Parse snapshot bytes (UTF-8 JSON).
    ///
    /// # Errors
    ///
    /// `Validation` when the bytes are not UTF-8 JSON, the root is not an
    /// object, `tracks` is missing, or any track fails validation.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            malformed(format!("snapshot is not valid UTF-8: {}", e))
        })?;
        let raw: Value = serde_json::from_str(text)
            .map_err(|e| malformed(format!("snapshot is not valid JSON: {}", e)))?;
        Self::from_value(&raw)
    }

    /// Validate an already-parsed JSON document.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ProjectSnapshot::from_slice`], minus JSON syntax.
    pub fn from_value(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| malformed("snapshot root must be an object"))?;

        let tracks_raw = match obj.get("tracks") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(malformed(format!(
                    "`tracks` must be an array, got {}",
                    coerce::render(other)
                )))
            }
            None => return Err(malformed("required field `tracks` is absent")),
        };

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut tracks = Vec::with_capacity(tracks_raw.len());
        for (index, item) in tracks_raw.iter().enumerate() {
            let track = parse_track(index, item)?;
            if !seen.insert(track.id.clone()) {
                return Err(ExError::from(VaultError::DuplicateTrackId {
                    track_id: track.id,
                })
                .with_op(OP));
            }
            tracks.push(track);
        }

        let metadata = obj
            .iter()
            .filter(|(key, _)| key.as_str() != "tracks")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self { metadata, tracks })
    }
}

fn malformed(reason: impl Into<String>) -> ExError {
    ExError::from(VaultError::MalformedSnapshot {
        reason: reason.into(),
    })
    .with_op(OP)
}

fn invalid(track_id: &str, field: impl Into<String>, value: &Value) -> ExError {
    ExError::from(VaultError::InvalidFieldValue {
        track_id: track_id.to_string(),
        field: field.into(),
        value: coerce::render(value),
    })
    .with_op(OP)
}

fn missing(track_id: &str, field: impl Into<String>) -> ExError {
    invalid(track_id, field, &Value::String("<missing>".to_string()))
}

/// First non-null value among alias keys
fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn required_track_text(index: usize, obj: &Map<String, Value>, field: &str) -> Result<String> {
    let value = lookup(obj, &[field]).ok_or_else(|| {
        ExError::from(VaultError::MissingTrackField {
            track_index: index,
            field: field.to_string(),
        })
        .with_op(OP)
    })?;
    coerce::as_text(value).ok_or_else(|| invalid(&format!("tracks[{}]", index), field, value))
}

fn optional_number(track_id: &str, obj: &Map<String, Value>, field: &str) -> Result<Option<f64>> {
    match lookup(obj, &[field]) {
        None => Ok(None),
        Some(value) => coerce::as_f64(value)
            .map(Some)
            .ok_or_else(|| invalid(track_id, field, value)),
    }
}

fn required_number(
    track_id: &str,
    obj: &Map<String, Value>,
    keys: &[&str],
    path: &str,
) -> Result<f64> {
    let value = lookup(obj, keys).ok_or_else(|| missing(track_id, path))?;
    coerce::as_f64(value).ok_or_else(|| invalid(track_id, path, value))
}

fn optional_text(
    track_id: &str,
    obj: &Map<String, Value>,
    keys: &[&str],
    path: &str,
) -> Result<Option<String>> {
    match lookup(obj, keys) {
        None => Ok(None),
        Some(value) => coerce::as_text(value)
            .map(Some)
            .ok_or_else(|| invalid(track_id, path, value)),
    }
}

fn optional_array<'a>(
    track_id: &str,
    obj: &'a Map<String, Value>,
    keys: &[&str],
    path: &str,
) -> Result<&'a [Value]> {
    match lookup(obj, keys) {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(invalid(track_id, path, other)),
    }
}

fn as_object<'a>(track_id: &str, value: &'a Value, path: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| invalid(track_id, path, value))
}

fn parse_track(index: usize, raw: &Value) -> Result<Track> {
    let obj = raw.as_object().ok_or_else(|| {
        ExError::new(ExErrorKind::Validation)
            .with_op(OP)
            .with_entity_id(format!("tracks[{}]", index))
            .with_message(format!("track at index {} is not an object", index))
    })?;

    let id = required_track_text(index, obj, "id")?;
    let name = required_track_text(index, obj, "name")?;
    let kind = TrackKind::parse(&required_track_text(index, obj, "type")?);

    let volume = optional_number(&id, obj, "volume")?;
    let volume_min = optional_number(&id, obj, "volumeMin")?;
    let volume_max = optional_number(&id, obj, "volumeMax")?;
    let audio_file = optional_text(&id, obj, &["audio_file", "wav_file"], "audio_file")?;

    let events = optional_array(&id, obj, &["events"], "events")?
        .iter()
        .enumerate()
        .map(|(i, ev)| parse_event(&id, &format!("events[{}]", i), ev))
        .collect::<Result<Vec<_>>>()?;

    Ok(Track {
        id,
        name,
        kind,
        volume,
        volume_min,
        volume_max,
        events,
        audio_file,
    })
}

fn parse_event(track_id: &str, path: &str, raw: &Value) -> Result<Event> {
    let obj = as_object(track_id, raw, path)?;

    let start = required_number(track_id, obj, &["start"], &format!("{}.start", path))?;
    let end = required_number(track_id, obj, &["end"], &format!("{}.end", path))?;

    let loop_region = match lookup(obj, &["loop"]) {
        None => None,
        Some(value) => Some(parse_loop(track_id, &format!("{}.loop", path), value)?),
    };

    let notes = optional_array(track_id, obj, &["notes"], &format!("{}.notes", path))?
        .iter()
        .enumerate()
        .map(|(i, n)| parse_note(track_id, &format!("{}.notes[{}]", path, i), n))
        .collect::<Result<Vec<_>>>()?;

    // Occurrence starts are relative to the event; their timeline beat must
    // stay representable.
    for (ni, note) in notes.iter().enumerate() {
        for (oi, occ) in note.occurrences.iter().enumerate() {
            if !(start + occ.start).is_finite() {
                let field = format!("{}.notes[{}].occurrences[{}].start", path, ni, oi);
                return Err(invalid(track_id, field, &Value::from(occ.start)));
            }
        }
    }

    Ok(Event {
        start,
        end,
        notes,
        loop_region,
        audio_name: optional_text(
            track_id,
            obj,
            &["audio_name"],
            &format!("{}.audio_name", path),
        )?,
        audio_file: optional_text(
            track_id,
            obj,
            &["audio_file"],
            &format!("{}.audio_file", path),
        )?,
    })
}

fn parse_loop(track_id: &str, path: &str, raw: &Value) -> Result<LoopRegion> {
    let obj = as_object(track_id, raw, path)?;
    let start = required_number(track_id, obj, &["start"], &format!("{}.start", path))?;
    let end = required_number(track_id, obj, &["end"], &format!("{}.end", path))?;
    // An unrecorded switch is read as off.
    let on = match lookup(obj, &["on"]) {
        None => false,
        Some(value) => {
            coerce::as_bool(value).ok_or_else(|| invalid(track_id, format!("{}.on", path), value))?
        }
    };
    Ok(LoopRegion { start, end, on })
}

fn parse_note(track_id: &str, path: &str, raw: &Value) -> Result<Note> {
    let obj = as_object(track_id, raw, path)?;
    let pitch_path = format!("{}.pitch", path);
    let pitch_raw = lookup(obj, &["pitch", "key"]).ok_or_else(|| missing(track_id, &pitch_path))?;
    let pitch = coerce::as_i64(pitch_raw).ok_or_else(|| invalid(track_id, &pitch_path, pitch_raw))?;

    let occ_path = format!("{}.occurrences", path);
    let occurrences = optional_array(track_id, obj, &["occurrences", "occurences"], &occ_path)?
        .iter()
        .enumerate()
        .map(|(i, o)| parse_occurrence(track_id, &format!("{}[{}]", occ_path, i), o))
        .collect::<Result<Vec<_>>>()?;

    Ok(Note { pitch, occurrences })
}

fn parse_occurrence(track_id: &str, path: &str, raw: &Value) -> Result<Occurrence> {
    let obj = as_object(track_id, raw, path)?;
    let enabled = match lookup(obj, &["enabled"]) {
        None => true,
        Some(value) => coerce::as_bool(value)
            .ok_or_else(|| invalid(track_id, format!("{}.enabled", path), value))?,
    };
    Ok(Occurrence {
        start: required_number(track_id, obj, &["start"], &format!("{}.start", path))?,
        duration: required_number(track_id, obj, &["duration"], &format!("{}.duration", path))?,
        velocity: required_number(track_id, obj, &["velocity"], &format!("{}.velocity", path))?,
        enabled,
    })
}
