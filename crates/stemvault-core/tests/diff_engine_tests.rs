//! Track diff scenarios. All tests operate on snapshot bytes or values (no I/O).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::{json, Value};
use stemvault_core::diff::{compute_diff, compute_diff_values, ChangeRecord, TrackChanges};
use stemvault_core::errors::ExErrorKind;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn midi_track(id: &str, name: &str, notes: Value) -> Value {
    json!({
        "type": "MidiTrack",
        "id": id,
        "name": name,
        "volume": "0.8",
        "volumeMin": "0.0003",
        "volumeMax": "1.99",
        "events": [{
            "start": "0",
            "end": "16",
            "loop": {"start": "0", "end": "16", "on": "true"},
            "notes": notes
        }]
    })
}

fn note(pitch: i64, start: f64, duration: f64, velocity: f64) -> Value {
    json!({
        "key": pitch,
        "occurences": [
            {"start": start, "duration": duration, "velocity": velocity, "enabled": "true"}
        ]
    })
}

fn project(tracks: Vec<Value>) -> Value {
    json!({"project": "demo", "tempo": "120", "tracks": tracks})
}

fn bytes(v: &Value) -> Vec<u8> {
    serde_json::to_vec(v).unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_moved_note_is_removal_plus_addition() {
    let old = project(vec![midi_track("t1", "Lead", json!([note(60, 0.0, 1.0, 100.0)]))]);
    let new = project(vec![midi_track("t1", "Lead", json!([note(60, 0.5, 1.0, 100.0)]))]);

    let diff = compute_diff(&bytes(&old), &bytes(&new)).unwrap();
    let records: Vec<&ChangeRecord> = diff.records().collect();
    assert_eq!(records.len(), 2);
    assert!(matches!(
        records[0],
        ChangeRecord::NoteRemoved { track_id, beat, pitch: 60, .. } if track_id == "t1" && *beat == 0.0
    ));
    assert!(matches!(
        records[1],
        ChangeRecord::NoteAdded { track_id, beat, pitch: 60, .. } if track_id == "t1" && *beat == 0.5
    ));
    assert_eq!(diff.modified_track_names, vec!["Lead".to_string()]);
}

#[test]
fn test_added_track_only() {
    let t1 = midi_track("t1", "Lead", json!([note(60, 0.0, 1.0, 100.0)]));
    let old = project(vec![t1.clone()]);
    let new = project(vec![t1, midi_track("t2", "Pad", json!([]))]);

    let diff = compute_diff(&bytes(&old), &bytes(&new)).unwrap();
    assert_eq!(diff.added_tracks, vec!["Pad".to_string()]);
    assert!(diff.removed_tracks.is_empty());
    assert!(diff.modified_track_names.is_empty());
    assert_eq!(diff.total_change_count, 1);
}

#[test]
fn test_volume_change_reports_one_parameter_record() {
    let old = project(vec![midi_track("t1", "Lead", json!([]))]);
    let mut changed = midi_track("t1", "Lead", json!([]));
    changed["volume"] = json!("0.5");
    let new = project(vec![changed]);

    let diff = compute_diff(&bytes(&old), &bytes(&new)).unwrap();
    let records: Vec<&ChangeRecord> = diff.records().collect();
    assert_eq!(records.len(), 1);
    match records[0] {
        ChangeRecord::TrackParameterChanged {
            track_id,
            parameter,
            from,
            to,
            ..
        } => {
            assert_eq!(track_id, "t1");
            assert_eq!(parameter, "volume");
            assert_eq!(*from, Some(0.8));
            assert_eq!(*to, Some(0.5));
        }
        other => panic!("unexpected record {:?}", other),
    }
    let text = records[0].describe();
    assert!(text.contains("0.800"));
    assert!(text.contains("0.500"));
}

#[test]
fn test_self_diff_is_empty() {
    let snap = project(vec![
        midi_track("t1", "Lead", json!([note(60, 0.0, 1.0, 100.0), note(64, 1.0, 0.5, 90.0)])),
        json!({"type": "AudioTrack", "id": "a1", "name": "Vox", "audio_file": "vox.wav"}),
    ]);
    let diff = compute_diff(&bytes(&snap), &bytes(&snap)).unwrap();
    assert!(diff.is_empty());
    assert!(diff.added_tracks.is_empty());
    assert!(diff.removed_tracks.is_empty());
    assert!(diff.modified_track_names.is_empty());
    assert_eq!(diff.text_summary, "No changes detected.");
}

#[test]
fn test_tracks_match_by_id_not_name_or_position() {
    let a = midi_track("t1", "Lead", json!([]));
    let b = midi_track("t2", "Bass", json!([]));
    let old = project(vec![a.clone(), b.clone()]);
    let new = project(vec![b, a]);
    let diff = compute_diff(&bytes(&old), &bytes(&new)).unwrap();
    assert!(diff.is_empty());
}

#[test]
fn test_add_remove_symmetry() {
    let old = project(vec![midi_track("t1", "Lead", json!([]))]);
    let new = project(vec![midi_track("t2", "Pad", json!([]))]);
    let forward = compute_diff(&bytes(&old), &bytes(&new)).unwrap();
    let backward = compute_diff(&bytes(&new), &bytes(&old)).unwrap();
    assert_eq!(forward.added_tracks, backward.removed_tracks);
    assert_eq!(forward.removed_tracks, backward.added_tracks);
}

#[test]
fn test_repeated_diff_is_byte_identical() {
    let old = project(vec![midi_track(
        "t1",
        "Lead",
        json!([note(60, 0.0, 1.0, 100.0), note(62, 2.0, 1.0, 80.0)]),
    )]);
    let new = project(vec![midi_track(
        "t1",
        "Lead",
        json!([note(60, 0.0, 1.0, 60.0), note(67, 3.0, 1.0, 80.0)]),
    )]);
    let a = serde_json::to_vec(&compute_diff(&bytes(&old), &bytes(&new)).unwrap()).unwrap();
    let b = serde_json::to_vec(&compute_diff(&bytes(&old), &bytes(&new)).unwrap()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_disabled_occurrences_are_absent() {
    let old = project(vec![midi_track("t1", "Lead", json!([]))]);
    let new = project(vec![midi_track(
        "t1",
        "Lead",
        json!([{
            "pitch": 60,
            "occurrences": [{"start": 0, "duration": 1, "velocity": 100, "enabled": "false"}]
        }]),
    )]);
    let diff = compute_diff(&bytes(&old), &bytes(&new)).unwrap();
    assert!(diff.is_empty());
}

#[test]
fn test_clip_gaining_active_loop_is_reported() {
    // Given: The same clip, first without a loop region, then looping
    let mut old = project(vec![midi_track("t1", "Lead", json!([]))]);
    old["tracks"][0]["events"][0]
        .as_object_mut()
        .unwrap()
        .remove("loop");
    let mut new = old.clone();
    new["tracks"][0]["events"][0]["loop"] = json!({"start": 0, "end": 4, "on": true});

    // When
    let forward = compute_diff(&bytes(&old), &bytes(&new)).unwrap();
    let backward = compute_diff(&bytes(&new), &bytes(&old)).unwrap();

    // Then: Each direction is one toggle
    let records: Vec<&ChangeRecord> = forward.records().collect();
    assert_eq!(records.len(), 1);
    assert!(matches!(
        records[0],
        ChangeRecord::LoopToggled { from: false, to: true, .. }
    ));
    assert_eq!(forward.modified_track_names, vec!["Lead".to_string()]);

    let records: Vec<&ChangeRecord> = backward.records().collect();
    assert_eq!(records.len(), 1);
    assert!(matches!(
        records[0],
        ChangeRecord::LoopToggled { from: true, to: false, .. }
    ));
}

#[test]
fn test_velocity_change_on_matched_note() {
    let old = project(vec![midi_track("t1", "Lead", json!([note(60, 0.0, 1.0, 100.0)]))]);
    let new = project(vec![midi_track("t1", "Lead", json!([note(60, 0.05, 1.0, 70.0)]))]);
    let diff = compute_diff(&bytes(&old), &bytes(&new)).unwrap();
    let records: Vec<&ChangeRecord> = diff.records().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind_name(), "NoteVelocityChanged");
    assert_eq!(diff.counters.velocity_changes, 1);
}

#[test]
fn test_string_and_number_encodings_compare_equal() {
    let old = project(vec![midi_track("t1", "Lead", json!([note(60, 0.0, 1.0, 100.0)]))]);
    let mut new = old.clone();
    new["tracks"][0]["volume"] = json!(0.8);
    new["tracks"][0]["events"][0]["start"] = json!(0);
    let diff = compute_diff_values(&old, &new).unwrap();
    assert!(diff.is_empty());
}

#[test]
fn test_audio_source_change() {
    let old = project(vec![
        json!({"type": "AudioTrack", "id": "a1", "name": "Vox", "wav_file": "take1.wav"}),
    ]);
    let new = project(vec![
        json!({"type": "AudioTrack", "id": "a1", "name": "Vox", "audio_file": "take2.wav"}),
    ]);
    let diff = compute_diff_values(&old, &new).unwrap();
    assert_eq!(diff.counters.audio_changes, 1);
    assert!(diff.text_summary.contains("'take2.wav'"));
}

#[test]
fn test_malformed_input_aborts_diff() {
    let good = bytes(&project(vec![midi_track("t1", "Lead", json!([]))]));
    let err = compute_diff(&good, b"not json").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);

    let missing_id = bytes(&project(vec![json!({"name": "x", "type": "MidiTrack"})]));
    let err = compute_diff(&missing_id, &good).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(err.code(), "ERR_VALIDATION");
}

#[test]
fn test_track_changes_from_diff() {
    let old = project(vec![
        midi_track("t1", "Lead", json!([])),
        midi_track("t3", "Drums", json!([])),
    ]);
    let mut lead = midi_track("t1", "Lead", json!([]));
    lead["volume"] = json!(1.0);
    let new = project(vec![lead, midi_track("t2", "Pad", json!([]))]);

    let diff = compute_diff_values(&old, &new).unwrap();
    let changes = TrackChanges::from_diff(&diff);
    assert_eq!(changes.added.len(), 1);
    assert_eq!(changes.added[0].id, "t2");
    assert_eq!(changes.modified[0].name, "Lead");
    assert_eq!(changes.removed[0].track_type, "MidiTrack");
}
