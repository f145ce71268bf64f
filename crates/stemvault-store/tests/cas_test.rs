// Integration tests for the blob store

#![allow(clippy::unwrap_used, clippy::expect_used)]

use stemvault_store::cas::{digest_of, FsStore};
use tempfile::TempDir;

fn setup_test_cas() -> TempDir {
    TempDir::new().expect("Failed to create temp CAS directory")
}

#[test]
fn test_cas_write_read_roundtrip() {
    // Given: A CAS store
    let cas_dir = setup_test_cas();
    let cas = FsStore::new(cas_dir.path());

    // When: We write a sample's bytes
    let content = b"RIFF....WAVEfmt ";
    let digest = cas.write(content, "bin").unwrap();

    // Then: We can read them back under the SHA256 digest
    assert_eq!(cas.read(&digest).unwrap(), content.to_vec());
    assert_eq!(digest, digest_of(content));
    assert_eq!(digest.len(), 64);
}

#[test]
fn test_cas_write_idempotent() {
    let cas_dir = setup_test_cas();
    let cas = FsStore::new(cas_dir.path());

    let first = cas.write(b"same bytes", "bin").unwrap();
    let second = cas.write(b"same bytes", "bin").unwrap();

    assert_eq!(first, second);
    assert!(cas.contains(&first));
}

#[test]
fn test_cas_read_missing_is_not_found() {
    let cas_dir = setup_test_cas();
    let cas = FsStore::new(cas_dir.path());

    let err = cas.read(&"0".repeat(64)).unwrap_err();
    assert_eq!(err.code(), "ERR_NOT_FOUND");
}

#[test]
fn test_cas_copy_to_creates_parent_dirs() {
    // Given: A stored blob
    let cas_dir = setup_test_cas();
    let cas = FsStore::new(cas_dir.path().join("cas"));
    let digest = cas.write(b"kick", "bin").unwrap();

    // When: We copy it to a nested destination
    let dest = cas_dir.path().join("out").join("Samples").join("kick.wav");
    cas.copy_to(&digest, &dest).unwrap();

    // Then: The file exists with the blob's content
    assert_eq!(std::fs::read(&dest).unwrap(), b"kick");
}

#[test]
fn test_cas_leaves_no_temp_files() {
    let cas_dir = setup_test_cas();
    let cas = FsStore::new(cas_dir.path());
    for i in 0..5 {
        cas.write(format!("blob {}", i).as_bytes(), "json").unwrap();
    }

    let leftovers = walkdir::WalkDir::new(cas_dir.path())
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(leftovers, 0);
}
