//! Signature verification, tamper detection, and idempotent recommits.

mod common;

use std::fs;

use sealpack::{Archive, Compression, Error, ManifestEntry};

const ENTRIES: &[(&str, &[u8])] = &[
    ("README", b"read me first\n"),
    ("src/lib.txt", b"library body, library body, library body\n"),
];

#[test]
fn test_valid_after_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::archive_path(dir.path(), "fresh");
    let archive = common::commit_archive(&path, Compression::None, ENTRIES).unwrap();
    assert!(Archive::is_valid(&path).unwrap());

    let reopened = Archive::open(&path).unwrap();
    assert_eq!(reopened.signature(), archive.signature());
}

#[test]
fn test_any_flipped_byte_after_stub_invalidates() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = common::archive_path(dir.path(), "flip");
    let archive = common::commit_archive(&path, Compression::None, ENTRIES).unwrap();
    let stub_len = archive.bootstrap().len();
    let original = fs::read(&path).unwrap();

    for offset in stub_len..original.len() {
        let mut tampered = original.clone();
        tampered[offset] ^= 0x01;
        fs::write(&path, &tampered).unwrap();
        assert!(
            !Archive::is_valid(&path).unwrap(),
            "flip at offset {} went unnoticed",
            offset
        );
    }

    fs::write(&path, &original).unwrap();
    assert!(Archive::is_valid(&path).unwrap());
}

#[test]
fn test_open_reports_integrity_error_for_content_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::archive_path(dir.path(), "content");
    common::commit_archive(&path, Compression::None, ENTRIES).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let needle = b"library body";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    bytes[at] = b'L';
    fs::write(&path, &bytes).unwrap();

    let err = Archive::open(&path).unwrap_err();
    assert!(err.is_integrity_error(), "unexpected error: {}", err);
    assert!(err.to_string().contains(&path.display().to_string()));
}

#[test]
fn test_open_reports_format_errors() {
    let dir = tempfile::tempdir().unwrap();

    let tiny = dir.path().join("tiny.sealpack");
    fs::write(&tiny, b"nope").unwrap();
    assert!(Archive::open(&tiny).unwrap_err().is_format_error());
    assert!(!Archive::is_valid(&tiny).unwrap());

    let path = common::archive_path(dir.path(), "magic");
    common::commit_archive(&path, Compression::None, ENTRIES).unwrap();
    let mut bytes = fs::read(&path).unwrap();
    let len = bytes.len();
    bytes[len - 1] = b'?';
    fs::write(&path, &bytes).unwrap();
    assert!(matches!(Archive::open(&path), Err(Error::Format(_))));
    assert!(!Archive::is_valid(&path).unwrap());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.sealpack");
    assert!(Archive::open(&missing).unwrap_err().is_io_error());
    assert!(Archive::is_valid(&missing).unwrap_err().is_io_error());
}

#[test]
fn test_recommit_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    for compression in Compression::ALL.into_iter().filter(|c| c.is_available()) {
        let path = common::archive_path(dir.path(), compression.name());
        common::commit_archive(&path, compression, ENTRIES).unwrap();
        let before = fs::read(&path).unwrap();

        let mut archive = Archive::open(&path).unwrap();
        archive.commit().unwrap();
        assert_eq!(fs::read(&path).unwrap(), before, "{} output changed", compression);

        let mut archive = Archive::open(&path).unwrap();
        archive.set_compression(Compression::None);
        archive.commit().unwrap();
        assert_eq!(fs::read(&path).unwrap(), before);
    }
}

#[test]
fn test_custom_stub_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::archive_path(dir.path(), "stub");
    let mut archive = Archive::create(&path).unwrap();
    archive.set_bootstrap(b"#!/usr/bin/env custom-runtime\n".to_vec());
    archive.commit().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"#!/usr/bin/env custom-runtime\n__SEALPACK_HALT__\n"));

    let reopened = Archive::open(&path).unwrap();
    assert!(reopened.has_custom_bootstrap());
    assert_eq!(reopened.bootstrap().as_bytes(), archive.bootstrap().as_bytes());
}

#[cfg(unix)]
#[test]
fn test_new_archives_are_executable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = common::archive_path(dir.path(), "mode");
    common::commit_archive(&path, Compression::None, ENTRIES).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o755);

    fs::set_permissions(&path, fs::Permissions::from_mode(0o700)).unwrap();
    Archive::open(&path).unwrap().commit().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o700);
}

#[test]
fn test_commit_errors_name_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("not-created");
    let mut archive = Archive::create(missing.join("out.sealpack")).unwrap();
    archive.set_path("a.txt", ManifestEntry::file("alpha")).unwrap();

    match archive.commit().unwrap_err() {
        Error::FileIo { path, .. } => assert_eq!(path, missing),
        other => panic!("expected a path-bearing I/O error, got {other:?}"),
    }
    assert!(!missing.exists());
}
