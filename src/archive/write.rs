//! Atomic commit.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;

use super::Archive;
use crate::checksum::{Checksum, Crc32, HashingReader, HashingWriter, Sha256};
use crate::codec;
use crate::content::{ContentSource, StoredContent, unwrap_io};
use crate::entry::EntryKind;
use crate::format::manifest::{EntryRecord, manifest_len, write_manifest};
use crate::format::trailer::{Signature, Trailer};
use crate::{ArchivePath, Error, ManifestEntry, Result};

impl Archive {
    /// Writes the archive to its target path.
    ///
    /// Entry content is streamed one entry at a time into a spool file,
    /// then stub, manifest, content, and signature are written to a
    /// temporary file beside the target, synced, and renamed over it. If
    /// anything fails the target is left as it was.
    ///
    /// Archived entries whose compression is unchanged are copied without
    /// re-encoding, so committing an unmodified archive reproduces it byte
    /// for byte.
    ///
    /// After a successful commit every file entry reads from the new file
    /// and the dirty flag is cleared.
    pub fn commit(&mut self) -> Result<()> {
        let target = self.path.clone();
        let stub = self.bootstrap();

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };

        let mut spool = tempfile::tempfile_in(&dir).map_err(|e| Error::file_io(&dir, e))?;
        let mut records = Vec::with_capacity(self.entries.len());
        for (path, entry) in &self.entries {
            let record = spool_entry(&mut spool, path, entry).map_err(|e| located(&dir, e))?;
            records.push(record);
        }

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Error::file_io(&dir, e))?;
        let signature = write_container(tmp.as_file_mut(), &mut spool, stub.as_bytes(), &records)
            .map_err(|e| located(&target, e))?;

        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::file_io(tmp.path(), e))?;
        apply_permissions(tmp.as_file(), &target);
        tmp.persist(&target)
            .map_err(|e| Error::file_io(&target, e.error))?;

        let archive: Arc<Path> = Arc::from(target.as_path());
        let content_start = stub.len() as u64 + manifest_len(&records);
        for (record, entry) in records.iter().zip(self.entries.values_mut()) {
            if record.kind == EntryKind::File {
                entry.set_content(ContentSource::Archived(StoredContent {
                    archive: Arc::clone(&archive),
                    name: record.path.to_string(),
                    offset: content_start + record.offset,
                    stored_len: record.stored_len,
                    original_len: record.original_len,
                    compression: record.compression,
                    crc: record.crc,
                }));
            }
        }

        log::info!(
            "committed {} entries to '{}' ({})",
            records.len(),
            target.display(),
            signature
        );
        self.signature = Some(signature);
        self.dirty = false;
        Ok(())
    }
}

/// Appends one entry's stored bytes to the spool and describes them.
fn spool_entry(spool: &mut File, path: &ArchivePath, entry: &ManifestEntry) -> Result<EntryRecord> {
    let offset = spool.stream_position()?;
    let compression = entry.compression();
    let mut record = EntryRecord {
        path: path.clone(),
        kind: entry.kind(),
        permissions: entry.permissions(),
        modified: entry.modified(),
        compression,
        stored_len: 0,
        original_len: 0,
        crc: 0,
        offset,
    };

    let Some(source) = entry.content().filter(|_| entry.is_file()) else {
        return Ok(record);
    };

    match source {
        ContentSource::Archived(stored) if stored.compression() == compression => {
            let copied = io::copy(&mut stored.open_raw()?, &mut *spool)?;
            if copied != stored.stored_len() {
                return Err(Error::Integrity {
                    path: path.to_string(),
                    reason: format!(
                        "expected {} stored bytes, found {}",
                        stored.stored_len(),
                        copied
                    ),
                });
            }
            record.stored_len = stored.stored_len();
            record.original_len = stored.original_len();
            record.crc = stored.crc();
        }
        _ => {
            let mut reader: HashingReader<_, Crc32> = HashingReader::new(source.open()?);
            let mut encoder = codec::build_encoder(&mut *spool, compression)?;
            io::copy(&mut reader, &mut encoder).map_err(|e| match source.path() {
                Some(file) if !is_smuggled(&e) => Error::file_io(file, e),
                _ => unwrap_io(e),
            })?;
            encoder.finish()?;
            record.stored_len = spool.stream_position()? - offset;
            record.original_len = reader.bytes_read();
            record.crc = reader.checksum();
        }
    }

    log::debug!(
        "spooled '{}': {} -> {} bytes ({})",
        path,
        record.original_len,
        record.stored_len,
        compression
    );
    Ok(record)
}

/// Writes stub, manifest, spooled content, and trailer, returning the signature.
fn write_container(
    file: &mut File,
    spool: &mut File,
    stub: &[u8],
    records: &[EntryRecord],
) -> Result<Signature> {
    let mut out: HashingWriter<_, Sha256> = HashingWriter::new(BufWriter::new(file));
    out.write_all(stub)?;
    write_manifest(&mut out, records)?;
    spool.seek(SeekFrom::Start(0))?;
    io::copy(spool, &mut out)?;

    let stub_len = stub.len() as u64;
    let (mut writer, mut hasher) = out.into_parts();
    hasher.update(&stub_len.to_le_bytes());
    let signature = Signature::sha256(hasher.finalize());
    let trailer = Trailer {
        signature,
        stub_len,
    };
    writer.write_all(&trailer.to_bytes())?;
    writer.flush()?;
    Ok(signature)
}

/// Attaches `path` to I/O errors that do not already name one.
fn located(path: &Path, err: Error) -> Error {
    match err {
        Error::Io(e) => Error::file_io(path, e),
        other => other,
    }
}

fn is_smuggled(e: &io::Error) -> bool {
    e.get_ref().is_some_and(|inner| inner.is::<Error>())
}

/// Keeps the mode of a replaced archive; new archives are made executable.
#[cfg(unix)]
fn apply_permissions(file: &File, target: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(target)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0o755);
    if let Err(e) = file.set_permissions(std::fs::Permissions::from_mode(mode)) {
        log::warn!("failed to set permissions on '{}': {}", target.display(), e);
    }
}

#[cfg(not(unix))]
fn apply_permissions(_file: &File, _target: &Path) {}
