// Integration tests for the async project service

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::fs;
use std::path::Path;
use stemvault_core::errors::ExErrorKind;
use stemvault_engine::commands::{MergeOutcome, ProposalDecision, UploadMeta};
use stemvault_engine::config::{ArchiveConfig, ParserConfig};
use stemvault_engine::{EngineConfig, ProjectService};
use stemvault_store::{CommitRequest, RepositoryState};
use tempfile::TempDir;

fn service(tmp: &TempDir) -> ProjectService {
    let parser_script = tmp.path().join("parser.sh");
    fs::write(
        &parser_script,
        "cat \"$1/song.als\" > \"$2/ableton_project.json\"\n",
    )
    .unwrap();
    ProjectService::new(EngineConfig {
        repositories_root: tmp.path().join("repos"),
        collaboration_root: tmp.path().join("collab"),
        parser: ParserConfig {
            command: "sh".into(),
            args: vec![parser_script.to_string_lossy().into_owned()],
            timeout_secs: 10,
        },
        archive: ArchiveConfig {
            timeout_secs: 30,
            output_dir: tmp.path().join("archives"),
        },
        log_profile: "test".into(),
    })
}

fn snapshot(tracks: serde_json::Value) -> String {
    json!({"project": "demo", "tracks": tracks}).to_string()
}

fn upload(dir: &Path, snapshot: &str, sample: &[u8]) {
    fs::create_dir_all(dir.join("Samples")).unwrap();
    fs::write(dir.join("song.als"), snapshot).unwrap();
    fs::write(dir.join("Samples/kick.wav"), sample).unwrap();
}

fn meta(message: &str) -> UploadMeta {
    UploadMeta {
        author: "Ana".into(),
        author_id: "u-1".into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// History operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_init_commit_and_latest() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);

    assert_eq!(svc.init("song").await.unwrap(), RepositoryState::Empty);
    assert_eq!(svc.latest_revision("song").await.unwrap(), None);

    let root = svc.project_path("song").unwrap();
    fs::write(root.join("notes.txt"), "hello").unwrap();
    let outcome = svc
        .commit("song", CommitRequest::new("Ana", "u-1", "first"))
        .await
        .unwrap();

    assert_eq!(
        svc.latest_revision("song").await.unwrap().as_deref(),
        outcome.revision()
    );
    assert_eq!(svc.history("song").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_project_id_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);

    for id in ["", "../escape", ".hidden", "a/b"] {
        let err = svc.init(id).await.unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Validation, "id {:?}", id);
    }
    assert!(!tmp.path().join("escape").exists());
}

#[tokio::test]
async fn test_errors_carry_project_context() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);

    let err = svc.history("missing").await.unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
    assert_eq!(err.project_id(), Some("missing"));
    assert!(err.request_id().is_some());
}

// ---------------------------------------------------------------------------
// Upload ingestion
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn test_ingest_upload_first_and_second() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let lead = json!({"id": "t1", "name": "Lead", "type": "MidiTrack", "volume": 0.8});
    let pad = json!({"id": "t2", "name": "Pad", "type": "MidiTrack"});

    // Given: A first upload with one track
    let first_dir = tmp.path().join("upload-1");
    upload(&first_dir, &snapshot(json!([lead.clone()])), b"kick-1");
    let first = svc
        .ingest_upload("song", &first_dir, meta("first upload"))
        .await
        .unwrap();

    // Then: Every track counts as added and no diff is attached
    assert!(!first.diff_attached);
    assert_eq!(first.changes.added.len(), 1);

    // When: A second upload adds a track
    let second_dir = tmp.path().join("upload-2");
    upload(&second_dir, &snapshot(json!([lead, pad])), b"kick-2");
    let second = svc
        .ingest_upload("song", &second_dir, meta("added pad"))
        .await
        .unwrap();

    // Then: The diff against HEAD is attached and files are committed
    assert!(second.diff_attached);
    assert_eq!(second.changes.added[0].name, "Pad");
    let root = svc.project_path("song").unwrap();
    assert_eq!(fs::read(root.join("Samples/kick.wav")).unwrap(), b"kick-2");
    assert!(root.join("ableton_project.json").is_file());

    let head = second.commit.revision().unwrap().to_string();
    let artifact = svc.diff_artifact("song", &head).await.unwrap();
    assert_eq!(artifact.added_tracks, vec!["Pad".to_string()]);
    assert_eq!(svc.history("song").await.unwrap().len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_ingest_with_failing_parser_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let upload_dir = tmp.path().join("upload");
    fs::create_dir_all(&upload_dir).unwrap();
    fs::write(upload_dir.join("song.als"), "not json at all").unwrap();

    let err = svc
        .ingest_upload("song", &upload_dir, meta("broken"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::ParserFailure);
    assert!(!svc.project_path("song").unwrap().exists());
}

// ---------------------------------------------------------------------------
// Previews, archives and proposals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_preview_diff_before_first_commit() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let candidate = snapshot(json!([{"id": "t1", "name": "Lead", "type": "MidiTrack"}]));

    let preview = svc
        .preview_diff("song", candidate.into_bytes())
        .await
        .unwrap();
    assert!(preview.first_commit);
    assert_eq!(preview.diff.added_tracks, vec!["Lead".to_string()]);
}

#[tokio::test]
async fn test_export_archive_uses_configured_dir() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    svc.init("song").await.unwrap();
    let root = svc.project_path("song").unwrap();
    fs::write(root.join("notes.txt"), "hello").unwrap();
    let outcome = svc
        .commit("song", CommitRequest::new("Ana", "u-1", "first"))
        .await
        .unwrap();

    let path = svc.export_archive("song", "HEAD", None).await.unwrap();
    assert_eq!(path.parent().unwrap(), tmp.path().join("archives"));
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        format!("song-{}.zip", outcome.revision().unwrap())
    );
}

#[tokio::test]
async fn test_decide_proposal_from_collaboration_root() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let proposal_dir = tmp.path().join("collab").join("p-1");
    fs::create_dir_all(&proposal_dir).unwrap();
    fs::write(
        proposal_dir.join("ableton_project.json"),
        snapshot(json!([{"id": "t1", "name": "Lead", "type": "MidiTrack"}])),
    )
    .unwrap();

    let rejected = svc
        .decide_proposal("song", "p-1", ProposalDecision::Rejected, "Ben", "u-2", "alt")
        .await
        .unwrap();
    assert_eq!(rejected, MergeOutcome::Rejected);
    assert!(!svc.project_path("song").unwrap().exists());

    let accepted = svc
        .decide_proposal("song", "p-1", ProposalDecision::Accepted, "Ben", "u-2", "alt")
        .await
        .unwrap();
    assert!(matches!(accepted, MergeOutcome::Merged { revision: Some(_), .. }));
    assert_eq!(svc.history("song").await.unwrap()[0].author, "Ben");
}
