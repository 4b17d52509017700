//! The archive container.
//!
//! [`Archive`] owns an in-memory manifest (path to [`ManifestEntry`]), the
//! bootstrap stub, and the default compression mode. Manifest operations
//! are synchronous and in-memory; nothing touches the target file until
//! [`Archive::commit`] writes the whole container atomically.
//!
//! # Example
//!
//! ```rust,no_run
//! use sealpack::{Archive, Compression, ManifestEntry};
//!
//! let mut archive = Archive::create("app.sealpack")?;
//! archive.set_compression(Compression::Gzip);
//! archive.set_path("README.md", ManifestEntry::file("hello\n"))?;
//! archive.commit()?;
//!
//! assert!(Archive::is_valid("app.sealpack")?);
//! let reopened = Archive::open("app.sealpack")?;
//! assert_eq!(reopened.get_path("README.md").unwrap().contents()?, b"hello\n");
//! # Ok::<(), sealpack::Error>(())
//! ```

mod read;
mod write;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use crate::archive_path::IntoArchivePath;
use crate::codec::Compression;
use crate::content::ContentSource;
use crate::event::{BeforeSetPath, EventBus};
use crate::format::trailer::Signature;
use crate::stub::{PRIMARY, Stub};
use crate::{ArchivePath, Error, ManifestEntry, Result};

/// A signed, self-contained archive.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    entries: BTreeMap<ArchivePath, ManifestEntry>,
    bootstrap: Option<Stub>,
    shebang: Option<String>,
    compression: Compression,
    dirty: bool,
    signature: Option<Signature>,
    events: EventBus,
}

impl Archive {
    /// Begins a new, empty archive at `path`.
    ///
    /// Any existing file at `path` is removed immediately. Nothing is
    /// written until [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if an existing file cannot be removed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match fs::remove_file(&path) {
            Ok(()) => log::debug!("removed existing '{}'", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::file_io(&path, e)),
        }
        Ok(Self {
            path,
            entries: BTreeMap::new(),
            bootstrap: None,
            shebang: None,
            compression: Compression::None,
            dirty: true,
            signature: None,
            events: EventBus::new(),
        })
    }

    /// Returns the target file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if `path` is in the manifest.
    pub fn has_path(&self, path: impl AsRef<str>) -> bool {
        lookup_key(path).is_some_and(|key| self.entries.contains_key(&key))
    }

    /// Returns the entry stored at `path`.
    pub fn get_path(&self, path: impl AsRef<str>) -> Option<&ManifestEntry> {
        lookup_key(path).and_then(|key| self.entries.get(&key))
    }

    /// Returns a mutable reference to the entry stored at `path`.
    pub fn get_path_mut(&mut self, path: impl AsRef<str>) -> Option<&mut ManifestEntry> {
        let key = lookup_key(path)?;
        let entry = self.entries.get_mut(&key)?;
        self.dirty = true;
        Some(entry)
    }

    /// Iterates over all entries in manifest (path) order.
    pub fn paths(&self) -> impl Iterator<Item = (&ArchivePath, &ManifestEntry)> {
        self.entries.iter()
    }

    /// Removes `path` from the manifest. Absent paths are ignored.
    pub fn remove_path(&mut self, path: impl AsRef<str>) -> Option<ManifestEntry> {
        let removed = lookup_key(path).and_then(|key| self.entries.remove(&key));
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Sets `path` to `entry`, replacing any existing entry.
    ///
    /// Entries without a pinned compression mode take the archive default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchivePath`] if `path` fails normalization.
    pub fn set_path(&mut self, path: impl IntoArchivePath, mut entry: ManifestEntry) -> Result<()> {
        let path = path.into_archive_path()?;
        entry.compression_or(self.compression);
        log::debug!("set '{}' ({:?})", path, entry.kind());
        self.entries.insert(path, entry);
        self.dirty = true;
        Ok(())
    }

    /// Adds every `(path, source)` pair from `items`, in order.
    ///
    /// Each item becomes a [`ManifestEntry`] (kind and file metadata are
    /// inferred from the source), is announced as [`BeforeSetPath`] to the
    /// archive's event bus, and is then set unless a subscriber skipped it.
    ///
    /// Returns the number of entries set. On error, processing stops; items
    /// applied before the failing one remain in the manifest.
    pub fn set_paths_using_iterator<I>(&mut self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<(ArchivePath, ContentSource)>>,
    {
        let mut bus = mem::take(&mut self.events);
        let result = self.set_paths_with(&mut bus, items);
        self.events = bus;
        result
    }

    fn set_paths_with<I>(&mut self, bus: &mut EventBus, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<(ArchivePath, ContentSource)>>,
    {
        let mut added = 0;
        for item in items {
            let (path, source) = item?;
            let mut entry = ManifestEntry::from_source(source)?;
            entry.compression_or(self.compression);

            let mut event = BeforeSetPath::new(self, path, entry);
            bus.dispatch(&mut event)?;
            let (path, entry, skipped) = event.into_parts();
            if skipped {
                continue;
            }
            self.set_path(path, entry)?;
            added += 1;
        }
        Ok(added)
    }

    /// Sets a custom bootstrap stub.
    ///
    /// The terminator marker is appended if the bytes lack it.
    pub fn set_bootstrap(&mut self, bytes: impl Into<Vec<u8>>) {
        self.bootstrap = Some(Stub::new(bytes));
        self.dirty = true;
    }

    /// Drops any custom stub so the default is generated.
    pub fn clear_bootstrap(&mut self) {
        if self.bootstrap.take().is_some() {
            self.dirty = true;
        }
    }

    /// Sets the interpreter line used by the generated stub.
    pub fn set_shebang(&mut self, shebang: Option<&str>) {
        self.shebang = shebang.map(str::to_string);
        self.dirty = true;
    }

    /// Returns the interpreter line used by the generated stub.
    pub fn shebang(&self) -> Option<&str> {
        self.shebang.as_deref()
    }

    /// Returns `true` if a custom stub is set.
    pub fn has_custom_bootstrap(&self) -> bool {
        self.bootstrap.is_some()
    }

    /// Returns the stub that the next commit will write.
    ///
    /// This is the custom stub if one is set, otherwise a stub generated
    /// from the shebang and the presence of a primary entry.
    pub fn bootstrap(&self) -> Stub {
        match &self.bootstrap {
            Some(stub) => stub.clone(),
            None => Stub::generate(self.shebang.as_deref(), self.has_primary()),
        }
    }

    /// Returns `true` if the primary entry is present.
    pub fn has_primary(&self) -> bool {
        self.has_path(PRIMARY)
    }

    /// Sets the compression mode for entries added from now on.
    ///
    /// Entries already in the manifest keep their mode.
    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    /// Returns the default compression mode.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Number of manifest entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are changes not yet committed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the signature of the last commit or of the opened file.
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Returns the event bus used by bulk additions.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mutable access to the event bus.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Replaces the event bus, returning the previous one.
    pub fn set_events(&mut self, events: EventBus) -> EventBus {
        mem::replace(&mut self.events, events)
    }

    /// Takes the event bus, leaving an empty one in its place.
    pub fn take_events(&mut self) -> EventBus {
        mem::take(&mut self.events)
    }
}

fn lookup_key(path: impl AsRef<str>) -> Option<ArchivePath> {
    ArchivePath::new(path.as_ref()).ok()
}
