//! Opening and verifying committed archives.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use super::Archive;
use crate::checksum::{Checksum, Sha256};
use crate::content::{ContentSource, StoredContent};
use crate::entry::EntryKind;
use crate::event::EventBus;
use crate::format::manifest::{EntryRecord, manifest_len, read_manifest};
use crate::format::trailer::Trailer;
use crate::format::TRAILER_SIZE;
use crate::stub::{Stub, TERMINATOR};
use crate::{Error, ManifestEntry, READ_BUFFER_SIZE, Result};

/// Structural view of an archive file.
struct Layout {
    file_len: u64,
    trailer: Trailer,
}

impl Layout {
    fn body_len(&self) -> u64 {
        self.file_len - TRAILER_SIZE
    }
}

impl Archive {
    /// Opens an existing archive.
    ///
    /// The trailer, stub terminator, and every manifest record are checked,
    /// then the signature is recomputed over the whole body. Entry content is
    /// not loaded; it is read lazily from the file on demand.
    ///
    /// # Errors
    ///
    /// - [`Error::FileIo`] if the file cannot be read.
    /// - [`Error::Format`] or [`Error::UnsupportedCompression`] if the
    ///   container structure is malformed.
    /// - [`Error::Integrity`] if the recomputed signature does not match.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| Error::file_io(path, e))?;
        let layout = read_layout(&mut file, path)?;
        let stub_len = layout.trailer.stub_len;

        let stub_bytes = read_range(&mut file, path, 0, stub_len)?;
        let stub = Stub::parse(stub_bytes)?;

        file.seek(SeekFrom::Start(stub_len))
            .map_err(|e| Error::file_io(path, e))?;
        let mut manifest_reader = BufReader::new((&file).take(layout.body_len() - stub_len));
        let records = read_manifest(&mut manifest_reader)?;
        drop(manifest_reader);

        let content_start = stub_len + manifest_len(&records);
        let content_len = layout
            .body_len()
            .checked_sub(content_start)
            .ok_or_else(|| Error::Format("manifest overruns the signature block".into()))?;
        for record in &records {
            let end = record.offset.checked_add(record.stored_len);
            if end.is_none_or(|end| end > content_len) {
                return Err(Error::Format(format!(
                    "content of '{}' lies outside the content block",
                    record.path
                )));
            }
        }

        let digest = compute_digest(&mut file, path, &layout)?;
        if digest != *layout.trailer.signature.digest() {
            return Err(Error::Integrity {
                path: path.display().to_string(),
                reason: "archive signature does not match its contents".into(),
            });
        }

        let archive_path: Arc<Path> = Arc::from(path);
        let mut entries = BTreeMap::new();
        for record in records {
            let entry = entry_from_record(&record, &archive_path, content_start);
            entries.insert(record.path, entry);
        }

        let (bootstrap, shebang) = if stub.is_generated() {
            let shebang = stub.shebang().map(str::to_string);
            (None, shebang)
        } else {
            (Some(stub), None)
        };

        log::debug!(
            "opened '{}': {} entries, stub {} bytes",
            path.display(),
            entries.len(),
            stub_len
        );

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            bootstrap,
            shebang,
            compression: Default::default(),
            dirty: false,
            signature: Some(layout.trailer.signature),
            events: EventBus::new(),
        })
    }

    /// Checks an archive's signature without building a manifest.
    ///
    /// Returns `Ok(false)` if the trailer is malformed or the recomputed
    /// digest differs from the recorded one.
    ///
    /// # Errors
    ///
    /// Only I/O failures opening or reading the file are errors.
    pub fn is_valid(path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| Error::file_io(path, e))?;
        let layout = match read_layout(&mut file, path) {
            Ok(layout) => layout,
            Err(e) if e.is_io_error() => return Err(e),
            Err(e) => {
                log::debug!("'{}' is not valid: {}", path.display(), e);
                return Ok(false);
            }
        };
        let digest = compute_digest(&mut file, path, &layout)?;
        Ok(digest == *layout.trailer.signature.digest())
    }
}

/// Reads and sanity-checks the trailer.
fn read_layout(file: &mut File, path: &Path) -> Result<Layout> {
    let file_len = file
        .metadata()
        .map_err(|e| Error::file_io(path, e))?
        .len();
    if file_len < TRAILER_SIZE + TERMINATOR.len() as u64 {
        return Err(Error::Format(format!(
            "'{}' is too small to be an archive ({} bytes)",
            path.display(),
            file_len
        )));
    }

    let raw = read_range(file, path, file_len - TRAILER_SIZE, TRAILER_SIZE)?;
    let mut bytes = [0u8; TRAILER_SIZE as usize];
    bytes.copy_from_slice(&raw);
    let trailer = Trailer::parse(&bytes)?;

    let layout = Layout { file_len, trailer };
    if trailer.stub_len < TERMINATOR.len() as u64 || trailer.stub_len > layout.body_len() {
        return Err(Error::Format(format!(
            "recorded stub length {} is out of range",
            trailer.stub_len
        )));
    }
    Ok(layout)
}

fn read_range(file: &mut File, path: &Path, offset: u64, len: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::file_io(path, e))?;
    let mut buf = Vec::with_capacity(len.min(1 << 20) as usize);
    file.take(len)
        .read_to_end(&mut buf)
        .map_err(|e| Error::file_io(path, e))?;
    if buf.len() as u64 != len {
        return Err(Error::file_io(
            path,
            io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while reading"),
        ));
    }
    Ok(buf)
}

/// Hashes the body plus the little-endian stub length.
fn compute_digest(file: &mut File, path: &Path, layout: &Layout) -> Result<[u8; 32]> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| Error::file_io(path, e))?;
    let mut hasher = Sha256::new();
    let mut body = file.take(layout.body_len());
    let mut buffer = vec![0u8; READ_BUFFER_SIZE * 8];
    loop {
        let n = body.read(&mut buffer).map_err(|e| Error::file_io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    hasher.update(&layout.trailer.stub_len.to_le_bytes());
    Ok(hasher.finalize())
}

fn entry_from_record(record: &EntryRecord, archive: &Arc<Path>, content_start: u64) -> ManifestEntry {
    let content = match record.kind {
        EntryKind::Directory => None,
        EntryKind::File => Some(ContentSource::Archived(StoredContent {
            archive: Arc::clone(archive),
            name: record.path.to_string(),
            offset: content_start + record.offset,
            stored_len: record.stored_len,
            original_len: record.original_len,
            compression: record.compression,
            crc: record.crc,
        })),
    };
    ManifestEntry::from_parts(
        record.kind,
        record.permissions,
        record.modified,
        record.compression,
        content,
    )
}
