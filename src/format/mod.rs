//! Container layout constants and low-level encoding.
//!
//! A sealpack archive is laid out as four consecutive blocks, with all
//! integers little-endian:
//!
//! ```text
//! +-------------------------+
//! | stub                    |  ends with "__SEALPACK_HALT__\n"
//! +-------------------------+
//! | manifest                |  "SPKM", version u16, count u32, records
//! +-------------------------+
//! | content                 |  stored entry bytes at recorded offsets
//! +-------------------------+
//! | signature (45 bytes)    |  algo u8, digest [32], stub_len u64, "SPK!"
//! +-------------------------+
//! ```
//!
//! The digest covers every byte before the signature block followed by the
//! little-endian stub length. Readers locate the stub boundary through the
//! stub length stored in the trailer, then parse forward.

pub mod manifest;
pub mod reader;
pub mod trailer;

/// Magic bytes opening the manifest block.
pub const MANIFEST_MAGIC: &[u8; 4] = b"SPKM";

/// Current layout version written to the manifest header.
pub const LAYOUT_VERSION: u16 = 1;

/// Magic bytes closing the signature block (and the file).
pub const END_MAGIC: &[u8; 4] = b"SPK!";

/// Size of the manifest header: magic, version, entry count.
pub const MANIFEST_HEADER_SIZE: u64 = 4 + 2 + 4;

/// Fixed size of one manifest record, excluding the path bytes.
///
/// path_len u16, kind u8, permissions u32, mtime i64, compression u8,
/// stored_len u64, original_len u64, crc32 u32, offset u64.
pub const RECORD_FIXED_SIZE: u64 = 2 + 1 + 4 + 8 + 1 + 8 + 8 + 4 + 8;

/// Length in bytes of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// Size of the signature block.
pub const TRAILER_SIZE: u64 = 1 + DIGEST_LEN as u64 + 8 + 4;

/// Signature algorithm ids.
pub mod algorithm {
    /// SHA-256 over the archive body.
    pub const SHA256: u8 = 1;
}
