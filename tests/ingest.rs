//! Directory ingestion into archives.

mod common;

use sealpack::{Archive, TreeIngester};

fn tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    common::write_tree(dir.path(), &[("a/b.txt", "bee"), ("a/c/d.txt", "dee")]);
    dir
}

#[test]
fn test_rerooted_tree_lands_in_archive() {
    common::init_logging();
    let dir = tree();
    let root = dir.path().join("a");
    let path = common::archive_path(dir.path(), "tree");

    let mut archive = Archive::create(&path).unwrap();
    let added = archive
        .set_paths_using_iterator(TreeIngester::new(&root, &root).reroot("x").unwrap())
        .unwrap();
    assert_eq!(added, 3);
    archive.commit().unwrap();

    let reopened = Archive::open(&path).unwrap();
    assert_eq!(common::manifest_paths(&reopened), vec!["x/b.txt", "x/c", "x/c/d.txt"]);
    assert!(reopened.get_path("x/c").unwrap().is_dir());
    assert_eq!(common::entry_text(&reopened, "x/c/d.txt"), "dee");
}

#[test]
fn test_base_relative_names() {
    let dir = tree();
    let names: Vec<String> = TreeIngester::new(dir.path().join("a").join("c"), dir.path())
        .map(|item| item.unwrap().0.to_string())
        .collect();
    assert_eq!(names, vec!["a/c/d.txt"]);
}

#[cfg(unix)]
#[test]
fn test_ingested_files_keep_disk_metadata() {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let dir = tree();
    let script = dir.path().join("a").join("b.txt");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o751)).unwrap();
    filetime::set_file_mtime(&script, filetime::FileTime::from_unix_time(1_650_000_000, 0))
        .unwrap();

    let root = dir.path().join("a");
    let mut archive = Archive::create(common::archive_path(dir.path(), "meta")).unwrap();
    archive
        .set_paths_using_iterator(TreeIngester::new(&root, &root))
        .unwrap();

    let entry = archive.get_path("b.txt").unwrap();
    assert_eq!(entry.permissions(), 0o751);
    assert_eq!(entry.modified(), 1_650_000_000);
}
