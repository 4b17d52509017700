//! Copy codec (no compression).

use std::io::{self, Read, Write};

use super::{Compression, Decoder, Encoder};

/// A decoder that passes data through unchanged.
///
/// Reading stops after `size` bytes even if the source has more.
pub struct CopyDecoder<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read + Send> CopyDecoder<R> {
    /// Creates a new copy decoder that yields at most `size` bytes.
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }
}

impl<R: Read + Send> Read for CopyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }

        let max_read = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max_read])?;
        self.remaining = self.remaining.saturating_sub(n as u64);
        Ok(n)
    }
}

impl<R: Read + Send> Decoder for CopyDecoder<R> {
    fn compression(&self) -> Compression {
        Compression::None
    }
}

/// An encoder that writes data through unchanged.
pub struct CopyEncoder<W> {
    inner: W,
}

impl<W: Write + Send> CopyEncoder<W> {
    /// Creates a new copy encoder.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write + Send> Write for CopyEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder for CopyEncoder<W> {
    fn compression(&self) -> Compression {
        Compression::None
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.inner.flush()
    }
}
