//! Lazy content providers for manifest entries.
//!
//! A [`ContentSource`] describes where an entry's bytes come from without
//! loading them. Bytes are only pulled when the entry is serialized by
//! [`Archive::commit`](crate::Archive::commit) or read back by a consumer,
//! which keeps peak memory during a build at roughly one entry.
//!
//! Three variants exist:
//!
//! - [`ContentSource::File`]: a path on the local filesystem, opened when read.
//! - [`ContentSource::Memory`]: immutable bytes, used for generated content
//!   and for bytes rewritten by plugins.
//! - [`ContentSource::Archived`]: an entry inside a committed archive file.
//!   Reads decompress on the fly and verify length and CRC-32 at the end of
//!   the stream.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::checksum::{Checksum, Crc32};
use crate::codec::{self, Compression};
use crate::{Error, Result};

/// Where an entry's bytes live.
#[derive(Clone)]
pub enum ContentSource {
    /// Read lazily from a filesystem path.
    File(PathBuf),
    /// Immutable in-memory bytes.
    Memory(Arc<[u8]>),
    /// Stored inside a committed archive.
    Archived(StoredContent),
}

impl ContentSource {
    /// Creates a file-backed source.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ContentSource::File(path.into())
    }

    /// Creates a memory-backed source.
    pub fn memory(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        ContentSource::Memory(Arc::from(bytes))
    }

    /// Returns the length of the original (uncompressed) bytes.
    pub fn len(&self) -> Result<u64> {
        match self {
            ContentSource::File(path) => fs::metadata(path)
                .map(|m| m.len())
                .map_err(|e| Error::file_io(path, e)),
            ContentSource::Memory(bytes) => Ok(bytes.len() as u64),
            ContentSource::Archived(stored) => Ok(stored.original_len),
        }
    }

    /// Returns `true` if the source holds no bytes.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Opens a reader over the original bytes.
    ///
    /// Archived content is verified as it is read; a mismatch surfaces as an
    /// I/O error of kind [`io::ErrorKind::InvalidData`] carrying an
    /// [`Error::Integrity`].
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            ContentSource::File(path) => {
                let file = File::open(path).map_err(|e| Error::file_io(path, e))?;
                Ok(Box::new(file))
            }
            ContentSource::Memory(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            ContentSource::Archived(stored) => stored.open(),
        }
    }

    /// Reads all original bytes into memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if a backing file cannot be read and
    /// [`Error::Integrity`] if archived content fails verification.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        match self {
            ContentSource::File(path) => fs::read(path).map_err(|e| Error::file_io(path, e)),
            ContentSource::Memory(bytes) => Ok(bytes.to_vec()),
            ContentSource::Archived(stored) => {
                let mut reader = stored.open()?;
                let mut out = Vec::with_capacity(stored.original_len.min(1 << 26) as usize);
                reader.read_to_end(&mut out).map_err(unwrap_io)?;
                Ok(out)
            }
        }
    }

    /// Returns the backing filesystem path of a file-backed source.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ContentSource::File(path) => Some(path),
            _ => None,
        }
    }

    /// Returns the stored-content descriptor of an archived source.
    pub fn stored(&self) -> Option<&StoredContent> {
        match self {
            ContentSource::Archived(stored) => Some(stored),
            _ => None,
        }
    }

    /// Inspects the filesystem for a file-backed source.
    ///
    /// Returns `Ok(None)` for memory and archived sources.
    pub fn probe(&self) -> Result<Option<SourceMetadata>> {
        let Some(path) = self.path() else {
            return Ok(None);
        };
        let meta = fs::metadata(path).map_err(|e| Error::file_io(path, e))?;
        Ok(Some(SourceMetadata::from_fs(&meta)))
    }
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ContentSource::Memory(bytes) => f
                .debug_struct("Memory")
                .field("len", &bytes.len())
                .finish(),
            ContentSource::Archived(stored) => f.debug_tuple("Archived").field(stored).finish(),
        }
    }
}

impl From<Vec<u8>> for ContentSource {
    fn from(bytes: Vec<u8>) -> Self {
        ContentSource::memory(bytes)
    }
}

impl From<&[u8]> for ContentSource {
    fn from(bytes: &[u8]) -> Self {
        ContentSource::Memory(Arc::from(bytes))
    }
}

impl From<&str> for ContentSource {
    fn from(text: &str) -> Self {
        ContentSource::from(text.as_bytes())
    }
}

/// Filesystem facts gathered from a file-backed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Whether the path is a directory.
    pub is_dir: bool,
    /// Permission bits (`& 0o777`), when the platform exposes them.
    pub permissions: Option<u32>,
    /// Modification time in epoch seconds.
    pub modified: i64,
}

impl SourceMetadata {
    fn from_fs(meta: &fs::Metadata) -> Self {
        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(meta.permissions().mode() & 0o777)
        };
        #[cfg(not(unix))]
        let permissions = None;

        Self {
            is_dir: meta.is_dir(),
            permissions,
            modified: filetime::FileTime::from_last_modification_time(meta).unix_seconds(),
        }
    }
}

/// Location and shape of one entry inside a committed archive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub(crate) archive: Arc<Path>,
    pub(crate) name: String,
    pub(crate) offset: u64,
    pub(crate) stored_len: u64,
    pub(crate) original_len: u64,
    pub(crate) compression: Compression,
    pub(crate) crc: u32,
}

impl StoredContent {
    /// Returns the archive file holding this content.
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Returns the absolute byte offset of the stored bytes in the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the length of the stored (compressed) bytes.
    pub fn stored_len(&self) -> u64 {
        self.stored_len
    }

    /// Returns the length of the original bytes.
    pub fn original_len(&self) -> u64 {
        self.original_len
    }

    /// Returns the compression the bytes are stored under.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Returns the CRC-32 of the original bytes.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Opens a reader over the raw stored bytes, without decoding.
    pub(crate) fn open_raw(&self) -> Result<io::Take<File>> {
        let mut file = File::open(&self.archive).map_err(|e| Error::file_io(&self.archive, e))?;
        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| Error::file_io(&self.archive, e))?;
        Ok(file.take(self.stored_len))
    }

    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let raw = self.open_raw()?;
        let decoder = codec::build_decoder(raw, self.compression, self.original_len)?;
        Ok(Box::new(VerifyingReader {
            inner: decoder,
            name: self.name.clone(),
            expected_len: self.original_len,
            expected_crc: self.crc,
            crc: Crc32::new(),
            seen: 0,
            verified: false,
        }))
    }
}

/// Checks length and CRC-32 once the wrapped stream reaches its end.
struct VerifyingReader<R> {
    inner: R,
    name: String,
    expected_len: u64,
    expected_crc: u32,
    crc: Crc32,
    seen: u64,
    verified: bool,
}

impl<R> VerifyingReader<R> {
    fn fail(&self, reason: String) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            Error::Integrity {
                path: self.name.clone(),
                reason,
            },
        )
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match self.inner.read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
            Err(e) => return Err(self.fail(format!("content stream is corrupt: {}", e))),
        };
        self.crc.update(&buf[..n]);
        self.seen += n as u64;

        if self.seen > self.expected_len {
            return Err(self.fail(format!(
                "content longer than recorded length {}",
                self.expected_len
            )));
        }

        if n == 0 && !self.verified {
            if self.seen != self.expected_len {
                return Err(self.fail(format!(
                    "expected {} bytes, got {}",
                    self.expected_len, self.seen
                )));
            }
            let actual = self.crc.finalize();
            if actual != self.expected_crc {
                return Err(self.fail(format!(
                    "CRC mismatch (expected {:08x}, got {:08x})",
                    self.expected_crc, actual
                )));
            }
            self.verified = true;
            log::trace!("verified '{}' ({} bytes)", self.name, self.seen);
        }
        Ok(n)
    }
}

/// Recovers a crate error smuggled through an `io::Error`.
pub(crate) fn unwrap_io(e: io::Error) -> Error {
    if !e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        return Error::Io(e);
    }
    let kind = e.kind();
    match e.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(err)) => *err,
        _ => Error::Io(kind.into()),
    }
}
