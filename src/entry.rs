//! Manifest entry metadata.

use std::io::{self, Read};

use crate::codec::Compression;
use crate::content::ContentSource;
use crate::Result;

/// Default permission bits for file entries.
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

/// Default permission bits for directory entries.
pub const DEFAULT_DIR_PERMISSIONS: u32 = 0o755;

/// The type of a manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    /// A regular file with content.
    File = 0,
    /// A directory; carries no content.
    Directory = 1,
}

impl EntryKind {
    /// Returns the manifest id of this kind.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Looks up a kind by manifest id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(EntryKind::File),
            1 => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

/// Metadata and content pointer for one manifest path.
///
/// The entry does not know its own path; the [`Archive`](crate::Archive)
/// manifest maps paths to entries.
///
/// # Example
///
/// ```rust
/// use sealpack::{Compression, ManifestEntry};
///
/// let entry = ManifestEntry::file("echo hi\n")
///     .with_permissions(0o755)
///     .with_compression(Compression::Gzip);
/// assert!(entry.is_file());
/// assert_eq!(entry.permissions(), 0o755);
/// assert_eq!(entry.contents().unwrap(), b"echo hi\n");
/// ```
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    kind: EntryKind,
    permissions: u32,
    modified: i64,
    compression: Option<Compression>,
    content: Option<ContentSource>,
}

impl ManifestEntry {
    /// Creates a file entry with default permissions and the current time.
    pub fn file(content: impl Into<ContentSource>) -> Self {
        Self {
            kind: EntryKind::File,
            permissions: DEFAULT_FILE_PERMISSIONS,
            modified: now(),
            compression: None,
            content: Some(content.into()),
        }
    }

    /// Creates a directory entry with default permissions and the current time.
    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            permissions: DEFAULT_DIR_PERMISSIONS,
            modified: now(),
            compression: None,
            content: None,
        }
    }

    /// Creates an entry from a content source, inferring its kind.
    ///
    /// File-backed sources are inspected on disk: a directory path yields a
    /// directory entry, and the file's permission bits and modification time
    /// replace the defaults. Other sources become file entries.
    pub fn from_source(source: ContentSource) -> Result<Self> {
        let Some(meta) = source.probe()? else {
            return Ok(Self::file(source));
        };

        let mut entry = if meta.is_dir {
            Self::directory()
        } else {
            Self::file(source)
        };
        if let Some(mode) = meta.permissions {
            entry.permissions = mode;
        }
        entry.modified = meta.modified;
        Ok(entry)
    }

    pub(crate) fn from_parts(
        kind: EntryKind,
        permissions: u32,
        modified: i64,
        compression: Compression,
        content: Option<ContentSource>,
    ) -> Self {
        Self {
            kind,
            permissions,
            modified,
            compression: Some(compression),
            content,
        }
    }

    /// Sets the permission bits.
    pub fn with_permissions(mut self, mode: u32) -> Self {
        self.permissions = mode;
        self
    }

    /// Sets the modification time (epoch seconds).
    pub fn with_modified(mut self, epoch_secs: i64) -> Self {
        self.modified = epoch_secs;
        self
    }

    /// Pins the compression mode for this entry.
    ///
    /// Entries without a pinned mode take the archive's default when set.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Returns the entry kind.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns `true` for file entries.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Returns `true` for directory entries.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns the permission bits.
    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    /// Overrides the permission bits.
    pub fn set_permissions(&mut self, mode: u32) {
        self.permissions = mode;
    }

    /// Returns the modification time in epoch seconds.
    pub fn modified(&self) -> i64 {
        self.modified
    }

    /// Overrides the modification time.
    pub fn set_modified(&mut self, epoch_secs: i64) {
        self.modified = epoch_secs;
    }

    /// Returns the compression mode, or [`Compression::None`] if unpinned.
    pub fn compression(&self) -> Compression {
        self.compression.unwrap_or_default()
    }

    /// Returns `true` if a compression mode has been pinned.
    pub fn has_compression(&self) -> bool {
        self.compression.is_some()
    }

    /// Pins the compression mode.
    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = Some(compression);
    }

    pub(crate) fn compression_or(&mut self, default: Compression) {
        self.compression.get_or_insert(default);
    }

    /// Returns the content source (always `None` for directories).
    pub fn content(&self) -> Option<&ContentSource> {
        self.content.as_ref()
    }

    /// Replaces the content of a file entry.
    ///
    /// Ignored for directories.
    pub fn set_content(&mut self, content: impl Into<ContentSource>) {
        if self.is_file() {
            self.content = Some(content.into());
        }
    }

    /// Reads the entry's original bytes.
    ///
    /// Directories yield an empty vector. Archived content is checked
    /// against its recorded length and CRC-32.
    pub fn contents(&self) -> Result<Vec<u8>> {
        match &self.content {
            Some(source) => source.read_to_vec(),
            None => Ok(Vec::new()),
        }
    }

    /// Opens a streaming reader over the entry's original bytes.
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match &self.content {
            Some(source) => source.open(),
            None => Ok(Box::new(io::empty())),
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let file = ManifestEntry::file("x");
        assert_eq!(file.kind(), EntryKind::File);
        assert_eq!(file.permissions(), 0o644);
        assert!(file.modified() > 0);
        assert!(!file.has_compression());

        let dir = ManifestEntry::directory();
        assert!(dir.is_dir());
        assert_eq!(dir.permissions(), 0o755);
        assert!(dir.content().is_none());
        assert!(dir.contents().unwrap().is_empty());
    }

    #[test]
    fn test_set_content_ignored_for_directory() {
        let mut dir = ManifestEntry::directory();
        dir.set_content("nope");
        assert!(dir.content().is_none());

        let mut file = ManifestEntry::file("old");
        file.set_content("new");
        assert_eq!(file.contents().unwrap(), b"new");
    }

    #[test]
    fn test_compression_or_keeps_pinned() {
        let mut pinned = ManifestEntry::file("a").with_compression(Compression::Bzip2);
        pinned.compression_or(Compression::Gzip);
        assert_eq!(pinned.compression(), Compression::Bzip2);

        let mut loose = ManifestEntry::file("a");
        loose.compression_or(Compression::Gzip);
        assert_eq!(loose.compression(), Compression::Gzip);
    }

    #[test]
    fn test_from_source_directory() {
        let dir = tempfile::tempdir().unwrap();
        let entry = ManifestEntry::from_source(ContentSource::file(dir.path())).unwrap();
        assert!(entry.is_dir());
        assert!(entry.content().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_from_source_reads_permissions_and_mtime() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.sh");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o750)).unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_600_000_000, 0))
            .unwrap();

        let entry = ManifestEntry::from_source(ContentSource::file(&path)).unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.permissions(), 0o750);
        assert_eq!(entry.modified(), 1_600_000_000);
    }

    #[test]
    fn test_kind_ids() {
        assert_eq!(EntryKind::from_id(1), Some(EntryKind::Directory));
        assert_eq!(EntryKind::from_id(9), None);
    }
}
