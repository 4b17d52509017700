//! Checksum and digest computation.
//!
//! Two algorithms are used by the container:
//!
//! - **CRC-32** (IEEE polynomial) over each entry's original bytes, checked
//!   whenever entry content is read back.
//! - **SHA-256** over the whole archive prefix, stored in the signature
//!   block and checked by [`Archive::open`](crate::Archive::open) and
//!   [`Archive::is_valid`](crate::Archive::is_valid).
//!
//! # Example
//!
//! ```rust
//! use sealpack::checksum::{Checksum, Crc32, Sha256};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"Hello, ");
//! crc.update(b"World!");
//! assert_eq!(crc.finalize(), Crc32::compute(b"Hello, World!"));
//!
//! let digest = Sha256::compute(b"abc");
//! assert_eq!(digest[0], 0xba);
//! ```

use std::io::{self, Read, Write};

use sha2::Digest;

use crate::READ_BUFFER_SIZE;

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Returns the checksum of everything seen so far.
    fn finalize(&self) -> Self::Output;

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Computes the checksum by reading a reader to its end.
    fn compute_reader<R: Read>(reader: &mut R) -> io::Result<Self::Output> {
        let mut hasher = Self::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }
}

/// CRC-32 checksum calculator (IEEE 802.3 polynomial).
///
/// ```rust
/// use sealpack::checksum::{Checksum, Crc32};
///
/// assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
/// ```
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.hasher.clone().finalize())
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// SHA-256 digest calculator used for archive signatures.
#[derive(Clone, Default)]
pub struct Sha256 {
    hasher: sha2::Sha256,
}

impl std::fmt::Debug for Sha256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sha256").finish_non_exhaustive()
    }
}

impl Checksum for Sha256 {
    type Output = [u8; 32];

    fn new() -> Self {
        Self {
            hasher: sha2::Sha256::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> [u8; 32] {
        self.hasher.clone().finalize().into()
    }
}

/// A writer that feeds everything written through a checksum.
#[derive(Debug)]
pub struct HashingWriter<W, C: Checksum> {
    inner: W,
    hasher: C,
    written: u64,
}

impl<W: Write, C: Checksum> HashingWriter<W, C> {
    /// Wraps a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: C::new(),
            written: 0,
        }
    }

    /// Returns the checksum of all bytes written so far.
    pub fn checksum(&self) -> C::Output {
        self.hasher.finalize()
    }

    /// Returns the number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns a mutable reference to the wrapped writer.
    ///
    /// Bytes written directly to it bypass the checksum.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwraps the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Unwraps the writer together with its running checksum state.
    pub fn into_parts(self) -> (W, C) {
        (self.inner, self.hasher)
    }
}

impl<W: Write, C: Checksum> Write for HashingWriter<W, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A reader that feeds everything read through a checksum.
#[derive(Debug)]
pub struct HashingReader<R, C: Checksum> {
    inner: R,
    hasher: C,
    read: u64,
}

impl<R: Read, C: Checksum> HashingReader<R, C> {
    /// Wraps a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: C::new(),
            read: 0,
        }
    }

    /// Returns the checksum of all bytes read so far.
    pub fn checksum(&self) -> C::Output {
        self.hasher.finalize()
    }

    /// Returns the number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }
}

impl<R: Read, C: Checksum> Read for HashingReader<R, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

/// Formats a digest as lowercase hexadecimal.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
