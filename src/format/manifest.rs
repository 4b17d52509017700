//! Manifest block encoding and parsing.

use std::collections::HashSet;
use std::io::{self, Read, Write};

use super::reader::{
    read_bytes, read_i64_le, read_u8, read_u16_le, read_u32_le, read_u64_le, write_i64_le,
    write_u16_le, write_u32_le, write_u64_le,
};
use super::{LAYOUT_VERSION, MANIFEST_HEADER_SIZE, MANIFEST_MAGIC, RECORD_FIXED_SIZE};
use crate::codec::Compression;
use crate::entry::EntryKind;
use crate::{ArchivePath, Error, Result};

/// One serialized manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// Manifest key.
    pub path: ArchivePath,
    /// File or directory.
    pub kind: EntryKind,
    /// Permission bits.
    pub permissions: u32,
    /// Modification time, epoch seconds.
    pub modified: i64,
    /// Codec applied to the stored bytes.
    pub compression: Compression,
    /// Length of the stored bytes.
    pub stored_len: u64,
    /// Length of the original bytes.
    pub original_len: u64,
    /// CRC-32 of the original bytes.
    pub crc: u32,
    /// Offset of the stored bytes, relative to the content block.
    pub offset: u64,
}

impl EntryRecord {
    /// Returns the encoded size of this record.
    pub fn encoded_len(&self) -> u64 {
        RECORD_FIXED_SIZE + self.path.as_str().len() as u64
    }

    /// Writes this record.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let path = self.path.as_str().as_bytes();
        // ArchivePath caps paths at u16::MAX bytes.
        write_u16_le(w, path.len() as u16)?;
        w.write_all(path)?;
        w.write_all(&[self.kind.id()])?;
        write_u32_le(w, self.permissions)?;
        write_i64_le(w, self.modified)?;
        w.write_all(&[self.compression.id()])?;
        write_u64_le(w, self.stored_len)?;
        write_u64_le(w, self.original_len)?;
        write_u32_le(w, self.crc)?;
        write_u64_le(w, self.offset)
    }

    /// Reads one record.
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let path_len = read_u16_le(r).map_err(truncated)? as usize;
        let raw = read_bytes(r, path_len).map_err(truncated)?;
        let text = String::from_utf8(raw)
            .map_err(|_| Error::Format("manifest path is not valid UTF-8".into()))?;
        let path = ArchivePath::new(&text)
            .map_err(|e| Error::Format(format!("manifest path '{}' rejected: {}", text, e)))?;
        if path.as_str() != text {
            return Err(Error::Format(format!(
                "manifest path '{}' is not normalized",
                text
            )));
        }

        let kind_id = read_u8(r).map_err(truncated)?;
        let kind = EntryKind::from_id(kind_id).ok_or_else(|| {
            Error::Format(format!("unknown entry kind {} for '{}'", kind_id, path))
        })?;
        let permissions = read_u32_le(r).map_err(truncated)?;
        let modified = read_i64_le(r).map_err(truncated)?;
        let compression = Compression::from_id(read_u8(r).map_err(truncated)?)?;
        let stored_len = read_u64_le(r).map_err(truncated)?;
        let original_len = read_u64_le(r).map_err(truncated)?;
        let crc = read_u32_le(r).map_err(truncated)?;
        let offset = read_u64_le(r).map_err(truncated)?;

        if kind == EntryKind::Directory && (stored_len != 0 || original_len != 0) {
            return Err(Error::Format(format!(
                "directory '{}' records content",
                path
            )));
        }

        Ok(Self {
            path,
            kind,
            permissions,
            modified,
            compression,
            stored_len,
            original_len,
            crc,
            offset,
        })
    }
}

/// Returns the encoded size of a manifest holding `records`.
pub fn manifest_len(records: &[EntryRecord]) -> u64 {
    MANIFEST_HEADER_SIZE + records.iter().map(EntryRecord::encoded_len).sum::<u64>()
}

/// Writes the manifest header and every record.
pub fn write_manifest<W: Write>(w: &mut W, records: &[EntryRecord]) -> Result<()> {
    let count = u32::try_from(records.len())
        .map_err(|_| Error::Format(format!("too many entries ({})", records.len())))?;
    w.write_all(MANIFEST_MAGIC)?;
    write_u16_le(w, LAYOUT_VERSION)?;
    write_u32_le(w, count)?;
    for record in records {
        record.write(w)?;
    }
    Ok(())
}

/// Parses the manifest block.
///
/// Records must be unique; their order is preserved as written.
pub fn read_manifest<R: Read>(r: &mut R) -> Result<Vec<EntryRecord>> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(truncated)?;
    if &magic != MANIFEST_MAGIC {
        return Err(Error::Format("manifest magic not found".into()));
    }
    let version = read_u16_le(r).map_err(truncated)?;
    if version != LAYOUT_VERSION {
        return Err(Error::Format(format!(
            "unsupported layout version {}",
            version
        )));
    }
    let count = read_u32_le(r).map_err(truncated)?;

    // Capacity is bounded so a corrupt count cannot force a huge allocation.
    let mut records = Vec::with_capacity((count as usize).min(4096));
    let mut seen = HashSet::new();
    for _ in 0..count {
        let record = EntryRecord::read(r)?;
        if !seen.insert(record.path.clone()) {
            return Err(Error::Format(format!(
                "duplicate manifest path '{}'",
                record.path
            )));
        }
        records.push(record);
    }
    Ok(records)
}

fn truncated(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Format("manifest block is truncated".into())
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(path: &str, kind: EntryKind) -> EntryRecord {
        EntryRecord {
            path: ArchivePath::new(path).unwrap(),
            kind,
            permissions: 0o644,
            modified: 1_700_000_000,
            compression: Compression::None,
            stored_len: if kind == EntryKind::File { 5 } else { 0 },
            original_len: if kind == EntryKind::File { 5 } else { 0 },
            crc: 0xdeadbeef,
            offset: 0,
        }
    }

    #[test]
    fn test_manifest_len_matches_encoding() {
        let records = vec![record("a", EntryKind::Directory), record("a/b.txt", EntryKind::File)];
        let mut buf = Vec::new();
        write_manifest(&mut buf, &records).unwrap();
        assert_eq!(buf.len() as u64, manifest_len(&records));
        assert_eq!(read_manifest(&mut Cursor::new(buf)).unwrap(), records);
    }

    #[test]
    fn test_bad_magic() {
        let err = read_manifest(&mut Cursor::new(b"NOPE\x01\x00\x00\x00\x00\x00".to_vec()))
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_truncated_record_is_format_error() {
        let mut buf = Vec::new();
        write_manifest(&mut buf, &[record("file.txt", EntryKind::File)]).unwrap();
        buf.truncate(buf.len() - 3);
        let err = read_manifest(&mut Cursor::new(buf)).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_unknown_compression_rejected() {
        let mut rec = Vec::new();
        record("x", EntryKind::File).write(&mut rec).unwrap();
        // compression byte sits after path_len(2) + path(1) + kind(1) + perms(4) + mtime(8)
        rec[16] = 9;
        let mut buf = Vec::new();
        buf.extend_from_slice(MANIFEST_MAGIC);
        buf.extend_from_slice(&LAYOUT_VERSION.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&rec);
        let err = read_manifest(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompression { id: 9 }));
    }

    #[test]
    fn test_unnormalized_path_rejected() {
        let mut rec = record("ab", EntryKind::Directory);
        rec.path = ArchivePath::new("a/b").unwrap();
        let mut bytes = Vec::new();
        rec.write(&mut bytes).unwrap();
        // same length, leading separator
        bytes[2..5].copy_from_slice(b"/ab");
        let err = EntryRecord::read(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("not normalized"));
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let records = vec![record("same", EntryKind::File), record("same", EntryKind::File)];
        let mut buf = Vec::new();
        write_manifest(&mut buf, &records).unwrap();
        let err = read_manifest(&mut Cursor::new(buf)).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
