//! Commit-and-reopen round trips across every compression mode.

mod common;

use proptest::prelude::*;
use sealpack::{Archive, Compression, EntryKind, ManifestEntry};

fn available() -> Vec<Compression> {
    Compression::ALL
        .iter()
        .copied()
        .filter(|c| c.is_available())
        .collect()
}

#[test]
fn test_metadata_survives_roundtrip() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();

    for compression in available() {
        let path = common::archive_path(dir.path(), compression.name());
        let mut archive = Archive::create(&path).unwrap();
        archive.set_compression(compression);
        archive
            .set_path(
                "bin/tool",
                ManifestEntry::file("#!/bin/sh\necho hi\n")
                    .with_permissions(0o750)
                    .with_modified(1_600_000_000),
            )
            .unwrap();
        archive
            .set_path("share", ManifestEntry::directory().with_modified(1_500_000_000))
            .unwrap();
        archive.set_path("empty", ManifestEntry::file("")).unwrap();
        archive.commit().unwrap();

        let reopened = Archive::open(&path).unwrap();
        assert_eq!(reopened.count(), 3);
        assert_eq!(common::manifest_paths(&reopened), vec!["bin/tool", "empty", "share"]);

        let tool = reopened.get_path("bin/tool").unwrap();
        assert_eq!(tool.kind(), EntryKind::File);
        assert_eq!(tool.permissions(), 0o750);
        assert_eq!(tool.modified(), 1_600_000_000);
        assert_eq!(tool.compression(), compression);
        assert_eq!(tool.contents().unwrap(), b"#!/bin/sh\necho hi\n");

        let share = reopened.get_path("share").unwrap();
        assert!(share.is_dir());
        assert_eq!(share.permissions(), 0o755);
        assert_eq!(share.modified(), 1_500_000_000);
        assert!(share.content().is_none());

        assert_eq!(reopened.get_path("empty").unwrap().contents().unwrap(), b"");
    }
}

#[test]
fn test_empty_archive_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::archive_path(dir.path(), "empty");
    let mut archive = Archive::create(&path).unwrap();
    archive.commit().unwrap();
    assert!(!archive.is_dirty());
    assert!(archive.signature().is_some());

    let reopened = Archive::open(&path).unwrap();
    assert_eq!(reopened.count(), 0);
    assert!(!reopened.has_primary());
}

#[test]
fn test_file_backed_content_read_at_commit() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("data.txt");
    std::fs::write(&source, "first").unwrap();

    let path = common::archive_path(dir.path(), "lazy");
    let mut archive = Archive::create(&path).unwrap();
    archive
        .set_path("data.txt", ManifestEntry::from_source(sealpack::ContentSource::file(&source)).unwrap())
        .unwrap();
    std::fs::write(&source, "second").unwrap();
    archive.commit().unwrap();

    assert_eq!(common::entry_text(&Archive::open(&path).unwrap(), "data.txt"), "second");
}

#[test]
fn test_recompress_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::archive_path(dir.path(), "switch");
    common::commit_archive(&path, Compression::None, &[("a.txt", b"aaaa aaaa aaaa aaaa")]).unwrap();

    for compression in available() {
        let mut archive = Archive::open(&path).unwrap();
        let entry = archive.get_path_mut("a.txt").unwrap();
        entry.set_compression(compression);
        archive.commit().unwrap();

        let reopened = Archive::open(&path).unwrap();
        let entry = reopened.get_path("a.txt").unwrap();
        assert_eq!(entry.compression(), compression);
        assert_eq!(entry.contents().unwrap(), b"aaaa aaaa aaaa aaaa");
    }
}

#[test]
fn test_committed_entries_read_from_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::archive_path(dir.path(), "rebind");
    let archive =
        common::commit_archive(&path, Compression::None, &[("x", b"payload")]).unwrap();

    let content = archive.get_path("x").unwrap().content().unwrap();
    let stored = content.stored().expect("entry should be archive-backed after commit");
    assert_eq!(stored.archive(), path.as_path());
    assert_eq!(archive.get_path("x").unwrap().contents().unwrap(), b"payload");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn roundtrip_arbitrary_contents(
        files in proptest::collection::btree_map(
            "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
            proptest::collection::vec(any::<u8>(), 0..2048),
            1..6,
        ),
        mode in 0usize..3,
    ) {
        let compressions = available();
        let compression = compressions[mode % compressions.len()];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.sealpack");

        let entries: Vec<(&str, &[u8])> =
            files.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
        common::commit_archive(&path, compression, &entries).unwrap();

        prop_assert!(Archive::is_valid(&path).unwrap());
        let reopened = Archive::open(&path).unwrap();
        prop_assert_eq!(reopened.count(), files.len());
        for (name, data) in &files {
            let entry = reopened.get_path(name).unwrap();
            prop_assert_eq!(entry.compression(), compression);
            prop_assert_eq!(&entry.contents().unwrap(), data);
        }
    }
}
