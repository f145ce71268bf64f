//! Repository handle: init, commit, history, restore and archive export
//! against real temp directories.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use stemvault_core::diff::{compute_diff, DiffResult, TrackChanges, TrackRef};
use stemvault_core::errors::ExErrorKind;
use stemvault_store::tree::scan;
use stemvault_store::{
    CommitOutcome, CommitRequest, Repository, RepositoryState, RevisionKind, DIFF_SIDECAR_FILE,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn snapshot(volume: &str, with_pad: bool) -> Vec<u8> {
    let mut tracks = vec![json!({
        "type": "MidiTrack", "id": "t1", "name": "Lead", "volume": volume,
        "events": [{"start": "0", "end": "8", "notes": [
            {"key": 60, "occurences": [{"start": 0, "duration": 1, "velocity": 100, "enabled": true}]}
        ]}]
    })];
    if with_pad {
        tracks.push(json!({"type": "MidiTrack", "id": "t2", "name": "Pad", "events": []}));
    }
    serde_json::to_vec(&json!({"project": "demo", "tracks": tracks})).unwrap()
}

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn commit(repo: &mut Repository, message: &str) -> String {
    repo.commit(CommitRequest::new("Ana", "u-1", message))
        .unwrap()
        .revision()
        .expect("commit should create a revision")
        .to_string()
}

/// Every working-tree file and its bytes
fn tree_contents(root: &Path) -> BTreeMap<String, Vec<u8>> {
    scan(root)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.rel_path, fs::read(entry.abs_path).unwrap()))
        .collect()
}

fn read_sidecar(root: &Path) -> DiffResult {
    serde_json::from_slice(&fs::read(root.join(DIFF_SIDECAR_FILE)).unwrap()).unwrap()
}

/// Hold the ledger's write lock from another connection so that recording a
/// revision fails once the busy timeout runs out
fn lock_ledger(root: &Path) -> rusqlite::Connection {
    let conn = rusqlite::Connection::open(root.join(".stemvault").join("ledger.db")).unwrap();
    conn.execute_batch("BEGIN IMMEDIATE").unwrap();
    conn
}

fn init() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("song");
    let repo = Repository::initialize(&root).unwrap();
    (dir, repo)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_state_transitions() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("song");
    assert_eq!(Repository::state(&root).unwrap(), RepositoryState::Uninitialized);

    let mut repo = Repository::initialize(&root).unwrap();
    assert_eq!(Repository::state(&root).unwrap(), RepositoryState::Empty);

    commit(&mut repo, "first");
    assert_eq!(Repository::state(&root).unwrap(), RepositoryState::HasHistory);
}

#[test]
fn test_initialize_is_idempotent() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    let first = commit(&mut repo, "first");
    drop(repo);

    let repo = Repository::initialize(&root).unwrap();
    assert_eq!(repo.latest_revision_id().unwrap(), Some(first));
    assert_eq!(repo.project_id(), "song");
}

#[test]
fn test_open_uninitialized_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = Repository::open(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_latest_revision_on_fresh_repository_is_none() {
    let (_dir, repo) = init();
    assert_eq!(repo.latest_revision_id().unwrap(), None);
    assert!(repo.history().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Commit and history
// ---------------------------------------------------------------------------

#[test]
fn test_first_commit_on_empty_tree_with_empty_changes() {
    // Given: A fresh repository with nothing in the working tree
    let (_dir, mut repo) = init();

    // When: We commit an empty change summary
    let outcome = repo
        .commit(
            CommitRequest::new("Ana", "u-1", "Initial import")
                .with_changes(TrackChanges::default()),
        )
        .unwrap();

    // Then: The revision exists and is HEAD
    let revision = outcome.revision().unwrap().to_string();
    let history = repo.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].hash, revision);
    assert_eq!(history[0].parent, None);
    assert_eq!(history[0].changes, Some(TrackChanges::default()));
    assert_eq!(history[0].subject(), "Initial import");
}

#[test]
fn test_commit_without_changes_is_nothing_to_commit() {
    let (dir, mut repo) = init();
    write(&dir.path().join("song"), "ableton_project.json", &snapshot("0.8", false));
    commit(&mut repo, "first");

    let outcome = repo.commit(CommitRequest::new("Ana", "u-1", "again")).unwrap();
    assert_eq!(outcome, CommitOutcome::NothingToCommit);
    assert_eq!(repo.history().unwrap().len(), 1);
}

#[test]
fn test_history_is_latest_first_with_decoded_changes() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    let first = commit(&mut repo, "first");

    write(&root, "ableton_project.json", &snapshot("0.8", true));
    let changes = TrackChanges {
        added: vec![TrackRef {
            id: "t2".into(),
            name: "Pad".into(),
            track_type: "MidiTrack".into(),
        }],
        ..TrackChanges::default()
    };
    let second = repo
        .commit(CommitRequest::new("Ben", "u-2", "Add pad").with_changes(changes.clone()))
        .unwrap()
        .revision()
        .unwrap()
        .to_string();

    let history = repo.history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].hash, second);
    assert_eq!(history[0].parent.as_deref(), Some(first.as_str()));
    assert_eq!(history[0].author, "Ben");
    assert_eq!(history[0].changes, Some(changes));
    assert!(history[0].message.contains("User-ID: u-2"));
    assert_eq!(history[1].hash, first);
    assert_eq!(history[1].changes, None);
}

#[test]
fn test_revision_lookup_by_prefix_and_head() {
    let (dir, mut repo) = init();
    write(&dir.path().join("song"), "a.txt", b"a");
    let first = commit(&mut repo, "first");

    assert_eq!(repo.revision(&first[..8]).unwrap().hash, first);
    assert_eq!(repo.revision("HEAD").unwrap().hash, first);
    assert_eq!(
        repo.revision("abc").unwrap_err().kind(),
        ExErrorKind::NotFound
    );
    assert_eq!(
        repo.revision("not-a-hash").unwrap_err().kind(),
        ExErrorKind::NotFound
    );
}

#[test]
fn test_diff_artifact_round_trip_and_not_found() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    let first = commit(&mut repo, "first");

    write(&root, "ableton_project.json", &snapshot("0.5", false));
    let diff = compute_diff(&snapshot("0.8", false), &snapshot("0.5", false)).unwrap();
    let second = repo
        .commit(CommitRequest::new("Ana", "u-1", "quieter").with_diff(diff.clone()))
        .unwrap()
        .revision()
        .unwrap()
        .to_string();

    assert_eq!(repo.diff_artifact(&second).unwrap(), diff);
    let err = repo.diff_artifact(&first).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_diff_sidecar_mirrors_head_artifact() {
    // Given: A first commit recorded without a diff
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    commit(&mut repo, "first");
    assert!(!root.join(DIFF_SIDECAR_FILE).exists());

    // When: A commit carries a diff
    write(&root, "ableton_project.json", &snapshot("0.5", false));
    let diff = compute_diff(&snapshot("0.8", false), &snapshot("0.5", false)).unwrap();
    let second = repo
        .commit(CommitRequest::new("Ana", "u-1", "quieter").with_diff(diff))
        .unwrap();

    // Then: The tree holds that revision's artifact
    let second = second.revision().unwrap();
    assert_eq!(read_sidecar(&root), repo.diff_artifact(second).unwrap());

    // When: Nothing changed since, the sidecar stays
    let outcome = repo.commit(CommitRequest::new("Ana", "u-1", "again")).unwrap();
    assert_eq!(outcome, CommitOutcome::NothingToCommit);
    assert!(root.join(DIFF_SIDECAR_FILE).exists());

    // When: A later commit has no diff, the inherited sidecar is dropped
    write(&root, "Samples/kick.wav", b"kick");
    let third = commit(&mut repo, "add kick");
    assert!(!root.join(DIFF_SIDECAR_FILE).exists());
    assert!(repo.diff_artifact(&third).is_err());
}

#[test]
fn test_overlay_without_diff_drops_stale_sidecar() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    commit(&mut repo, "first");
    write(&root, "ableton_project.json", &snapshot("0.5", false));
    let diff = compute_diff(&snapshot("0.8", false), &snapshot("0.5", false)).unwrap();
    repo.commit(CommitRequest::new("Ana", "u-1", "quieter").with_diff(diff))
        .unwrap();

    let upload = dir.path().join("upload");
    write(&upload, "song.als", b"native");
    repo.overlay_working_tree(&upload, &[], CommitRequest::new("Ana", "u-1", "Upload"))
        .unwrap();

    assert!(!root.join(DIFF_SIDECAR_FILE).exists());
    assert_eq!(fs::read(root.join("song.als")).unwrap(), b"native");
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

#[test]
fn test_restore_unknown_revision_leaves_everything_unchanged() {
    // Given: A repository with one revision
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    let head = commit(&mut repo, "first");

    // When: We restore a hash that does not exist
    let err = repo.restore(&"f".repeat(64), "u-1", "go back").unwrap_err();

    // Then: NotFound, HEAD and working tree untouched
    assert_eq!(err.kind(), ExErrorKind::NotFound);
    assert_eq!(repo.latest_revision_id().unwrap(), Some(head));
    assert_eq!(
        fs::read(root.join("ableton_project.json")).unwrap(),
        snapshot("0.8", false)
    );
}

#[test]
fn test_restore_appends_one_revert_revision() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    write(&root, "Samples/kick.wav", b"kick-v1");
    let first = commit(&mut repo, "first");

    write(&root, "ableton_project.json", &snapshot("0.5", true));
    write(&root, "Samples/snare.wav", b"snare");
    let second = commit(&mut repo, "second");

    let outcome = repo.restore(&first, "u-9", "Back to the start").unwrap();

    // The working tree matches the first revision again
    assert_eq!(
        fs::read(root.join("ableton_project.json")).unwrap(),
        snapshot("0.8", false)
    );
    assert!(!root.join("Samples/snare.wav").exists());
    assert_eq!(fs::read(root.join("Samples/kick.wav")).unwrap(), b"kick-v1");

    // History grows by exactly one; earlier revisions stay
    let history = repo.history().unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].hash, outcome.revision);
    assert_eq!(history[0].kind, RevisionKind::Revert);
    assert_eq!(history[0].restored_from.as_deref(), Some(first.as_str()));
    assert_eq!(history[1].hash, second);
    assert_eq!(history[2].hash, first);

    // The revert carries the diff from the old HEAD to the target
    assert!(outcome.diff_attached);
    let diff = repo.diff_artifact(&outcome.revision).unwrap();
    assert_eq!(diff.removed_tracks, vec!["Pad".to_string()]);
    assert_eq!(
        history[0].changes.as_ref().map(|c| c.removed.len()),
        Some(1)
    );
}

#[test]
fn test_restore_writes_its_own_diff_sidecar() {
    // Given: The target revision carries a sidecar of its own
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    commit(&mut repo, "first");
    write(&root, "ableton_project.json", &snapshot("0.5", false));
    let diff = compute_diff(&snapshot("0.8", false), &snapshot("0.5", false)).unwrap();
    let target = repo
        .commit(CommitRequest::new("Ana", "u-1", "quieter").with_diff(diff))
        .unwrap()
        .revision()
        .unwrap()
        .to_string();
    write(&root, "ableton_project.json", &snapshot("0.5", true));
    commit(&mut repo, "add pad");

    // When
    let outcome = repo.restore(&target, "u-1", "drop the pad").unwrap();

    // Then: diff.json is the revert's artifact, not the target's
    let sidecar = read_sidecar(&root);
    assert_eq!(sidecar, repo.diff_artifact(&outcome.revision).unwrap());
    assert_eq!(sidecar.removed_tracks, vec!["Pad".to_string()]);
    assert_eq!(
        fs::read(root.join("ableton_project.json")).unwrap(),
        snapshot("0.5", false)
    );
}

#[test]
fn test_restore_conflict_leaves_tree_unchanged() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    let first = commit(&mut repo, "first");
    write(&root, "ableton_project.json", &snapshot("0.5", false));
    commit(&mut repo, "second");

    // Uncommitted edit on a path the restore must rewrite
    let dirty = snapshot("0.1", false);
    write(&root, "ableton_project.json", &dirty);

    let err = repo.restore(&first, "u-1", "undo").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Conflict);
    assert_eq!(fs::read(root.join("ableton_project.json")).unwrap(), dirty);
    assert_eq!(repo.history().unwrap().len(), 2);
}

#[test]
fn test_restore_keeps_unrelated_uncommitted_files() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    let first = commit(&mut repo, "first");
    write(&root, "ableton_project.json", &snapshot("0.5", false));
    commit(&mut repo, "second");

    write(&root, "notes.txt", b"scratch");
    repo.restore(&first, "u-1", "undo").unwrap();

    assert_eq!(fs::read(root.join("notes.txt")).unwrap(), b"scratch");
}

// ---------------------------------------------------------------------------
// Archive export
// ---------------------------------------------------------------------------

#[test]
fn test_export_archive_contains_revision_tree() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    write(&root, "Samples/kick.wav", b"kick");
    let first = commit(&mut repo, "first");

    // Later edits must not leak into the archive of the first revision
    write(&root, "Samples/kick.wav", b"kick-v2");
    commit(&mut repo, "second");

    let out = dir.path().join("exports");
    let path = repo.export_archive(&first, &out).unwrap();
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        format!("song-{}.zip", first)
    );

    let mut archive = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["Samples/kick.wav", "ableton_project.json"]);

    let mut kick = String::new();
    archive
        .by_name("Samples/kick.wav")
        .unwrap()
        .read_to_string(&mut kick)
        .unwrap();
    assert_eq!(kick, "kick");
}

// ---------------------------------------------------------------------------
// Working tree replacement
// ---------------------------------------------------------------------------

#[test]
fn test_replace_working_tree_records_merge() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    write(&root, "Samples/old.wav", b"old");
    commit(&mut repo, "first");

    let incoming = dir.path().join("incoming");
    write(&incoming, "Samples/new.wav", b"new");
    let merged: Value = serde_json::from_slice(&snapshot("0.5", true)).unwrap();
    let extra = vec![(
        "ableton_project.json".to_string(),
        serde_json::to_vec(&merged).unwrap(),
    )];

    let outcome = repo
        .replace_working_tree(&incoming, &extra, CommitRequest::new("Ana", "u-1", "Merge"))
        .unwrap();

    assert!(outcome.revision().is_some());
    assert!(!root.join("Samples/old.wav").exists());
    assert_eq!(fs::read(root.join("Samples/new.wav")).unwrap(), b"new");
    assert_eq!(repo.history().unwrap()[0].kind, RevisionKind::Merge);
    assert_eq!(
        repo.working_snapshot().unwrap(),
        Some(serde_json::to_vec(&merged).unwrap())
    );
}

#[test]
fn test_snapshot_at_reads_committed_document() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    let first = commit(&mut repo, "first");
    write(&root, "ableton_project.json", &snapshot("0.5", false));

    assert_eq!(
        repo.snapshot_at(&first).unwrap(),
        Some(snapshot("0.8", false))
    );
}

// ---------------------------------------------------------------------------
// Failure after promotion
// ---------------------------------------------------------------------------

#[test]
fn test_failed_merge_record_restores_tree_byte_for_byte() {
    // Given: A committed tree plus an untracked file, and a ledger another
    // connection is writing to
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    write(&root, "Samples/kick.wav", b"kick-v1");
    let head = commit(&mut repo, "first");
    write(&root, "notes.txt", b"scratch");
    let before = tree_contents(&root);

    let incoming = dir.path().join("incoming");
    write(&incoming, "ableton_project.json", &snapshot("0.5", true));
    write(&incoming, "Samples/kick.wav", b"kick-v2");
    write(&incoming, "Samples/snare.wav", b"snare");
    let blocker = lock_ledger(&root);

    // When: The merge is promoted but cannot be recorded
    let err = repo
        .replace_working_tree(&incoming, &[], CommitRequest::new("Ben", "u-2", "alt mix"))
        .unwrap_err();
    blocker.execute_batch("ROLLBACK").unwrap();

    // Then: The ledger error comes back and nothing else changed
    assert_eq!(err.kind(), ExErrorKind::Persistence);
    assert_eq!(tree_contents(&root), before);
    assert!(!root.join("Samples/snare.wav").exists());
    assert_eq!(repo.latest_revision_id().unwrap(), Some(head));
    assert_eq!(repo.history().unwrap().len(), 1);
    let staging = root.join(".stemvault").join("staging");
    assert_eq!(fs::read_dir(staging).unwrap().count(), 0);
}

#[test]
fn test_failed_restore_record_restores_tree_byte_for_byte() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    let first = commit(&mut repo, "first");
    write(&root, "ableton_project.json", &snapshot("0.5", true));
    write(&root, "Samples/snare.wav", b"snare");
    let second = commit(&mut repo, "second");
    let before = tree_contents(&root);

    let blocker = lock_ledger(&root);
    let err = repo.restore(&first, "u-1", "undo").unwrap_err();
    blocker.execute_batch("ROLLBACK").unwrap();

    assert_eq!(err.kind(), ExErrorKind::Persistence);
    assert_eq!(tree_contents(&root), before);
    assert_eq!(repo.latest_revision_id().unwrap(), Some(second));
    assert_eq!(repo.history().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_second_handle_keeps_history_linear() {
    // Two handles on the same project, the second commits in between
    let (dir, mut repo_a) = init();
    let root = dir.path().join("song");
    write(&root, "a.txt", b"1");
    commit(&mut repo_a, "first");

    let mut repo_b = Repository::open(&root).unwrap();
    write(&root, "a.txt", b"2");
    commit(&mut repo_b, "from b");

    write(&root, "a.txt", b"3");
    let outcome = repo_a.commit(CommitRequest::new("Ana", "u-1", "from a")).unwrap();

    // HEAD is re-read on each commit, so the chain stays linear
    let history = repo_a.history().unwrap();
    assert!(outcome.revision().is_some());
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].parent.as_deref(), Some(history[1].hash.as_str()));
}

#[test]
fn test_overlay_working_tree_keeps_other_files() {
    let (dir, mut repo) = init();
    let root = dir.path().join("song");
    write(&root, "ableton_project.json", &snapshot("0.8", false));
    write(&root, "Samples/kick.wav", b"kick");
    commit(&mut repo, "first");

    let upload = dir.path().join("upload");
    write(&upload, "song.als", b"native");
    let extra = vec![("ableton_project.json".to_string(), snapshot("0.5", false))];
    let outcome = repo
        .overlay_working_tree(&upload, &extra, CommitRequest::new("Ana", "u-1", "Upload"))
        .unwrap();

    assert!(outcome.revision().is_some());
    assert_eq!(fs::read(root.join("Samples/kick.wav")).unwrap(), b"kick");
    assert_eq!(fs::read(root.join("song.als")).unwrap(), b"native");
    assert_eq!(repo.history().unwrap()[0].kind, RevisionKind::Commit);
}
