//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use sealpack::{Archive, Compression, ManifestEntry};

/// Installs a test logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes `files` (relative path, contents) under `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
    }
}

/// Commits an archive holding `entries` (path, contents) with `compression`.
pub fn commit_archive(
    path: &Path,
    compression: Compression,
    entries: &[(&str, &[u8])],
) -> sealpack::Result<Archive> {
    let mut archive = Archive::create(path)?;
    archive.set_compression(compression);
    for (name, data) in entries {
        archive.set_path(*name, ManifestEntry::file(data.to_vec()).with_modified(1_700_000_000))?;
    }
    archive.commit()?;
    Ok(archive)
}

/// Returns the sorted list of manifest paths.
pub fn manifest_paths(archive: &Archive) -> Vec<String> {
    archive.paths().map(|(path, _)| path.to_string()).collect()
}

/// Reads the contents of a file entry as UTF-8.
pub fn entry_text(archive: &Archive, path: &str) -> String {
    let entry = archive
        .get_path(path)
        .unwrap_or_else(|| panic!("missing entry '{}'", path));
    String::from_utf8(entry.contents().unwrap()).unwrap()
}

/// Returns `true` if a usable `git` executable is on the PATH.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Runs `git` in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap().trim().to_string()
}

/// Creates a repository in `dir` with one commit of the current tree.
pub fn init_repository(dir: &Path) -> String {
    git(dir, &["init", "-q"]);
    git(dir, &["add", "-A"]);
    git(dir, &["-c", "commit.gpgsign=false", "commit", "-q", "-m", "initial"]);
    git(dir, &["rev-parse", "HEAD"])
}

/// Path of a scratch archive inside `dir`.
pub fn archive_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.sealpack", name))
}
