//! Gzip codec implementation.

use std::io::{self, Read, Write};

use flate2::bufread::GzDecoder as FlateDecoder;
use flate2::write::GzEncoder as FlateEncoder;

use super::{Compression, Decoder, Encoder};

/// Gzip decoder.
pub struct GzipDecoder<R> {
    inner: FlateDecoder<R>,
}

impl<R> std::fmt::Debug for GzipDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipDecoder").finish_non_exhaustive()
    }
}

impl<R: io::BufRead + Send> GzipDecoder<R> {
    /// Creates a new Gzip decoder over a buffered source.
    pub fn new(input: R) -> Self {
        Self {
            inner: FlateDecoder::new(input),
        }
    }
}

impl<R: io::BufRead + Send> Read for GzipDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: io::BufRead + Send> Decoder for GzipDecoder<R> {
    fn compression(&self) -> Compression {
        Compression::Gzip
    }
}

/// Gzip encoder options.
#[derive(Debug, Clone)]
pub struct GzipEncoderOptions {
    /// Compression level (0-9, default 6).
    pub level: u32,
}

impl Default for GzipEncoderOptions {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipEncoderOptions {
    /// Creates options with the given compression level.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

/// Gzip encoder.
///
/// The gzip header is written with a zero modification time and no file
/// name, so identical input always produces identical output.
pub struct GzipEncoder<W: Write> {
    inner: FlateEncoder<W>,
}

impl<W: Write> std::fmt::Debug for GzipEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipEncoder").finish_non_exhaustive()
    }
}

impl<W: Write + Send> GzipEncoder<W> {
    /// Creates a new Gzip encoder.
    pub fn new(output: W, options: &GzipEncoderOptions) -> Self {
        Self {
            inner: FlateEncoder::new(output, flate2::Compression::new(options.level)),
        }
    }

    /// Finishes encoding and returns the underlying writer.
    pub fn try_finish(self) -> io::Result<W> {
        self.inner.finish()
    }
}

impl<W: Write + Send> Write for GzipEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder for GzipEncoder<W> {
    fn compression(&self) -> Compression {
        Compression::Gzip
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}
