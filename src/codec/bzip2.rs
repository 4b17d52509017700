//! BZip2 codec implementation.

use std::io::{self, Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;

use super::{Compression, Decoder, Encoder};

/// BZip2 decoder.
pub struct Bzip2Decoder<R> {
    inner: BzDecoder<R>,
}

impl<R> std::fmt::Debug for Bzip2Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bzip2Decoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> Bzip2Decoder<R> {
    /// Creates a new BZip2 decoder.
    pub fn new(input: R) -> Self {
        Self {
            inner: BzDecoder::new(input),
        }
    }
}

impl<R: Read + Send> Read for Bzip2Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for Bzip2Decoder<R> {
    fn compression(&self) -> Compression {
        Compression::Bzip2
    }
}

/// BZip2 encoder options.
#[derive(Debug, Clone)]
pub struct Bzip2EncoderOptions {
    /// Block size level (1-9, default 9).
    pub level: u32,
}

impl Default for Bzip2EncoderOptions {
    fn default() -> Self {
        Self { level: 9 }
    }
}

impl Bzip2EncoderOptions {
    /// Creates options with the given level.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.clamp(1, 9),
        }
    }
}

/// BZip2 encoder.
pub struct Bzip2Encoder<W: Write> {
    inner: BzEncoder<W>,
}

impl<W: Write> std::fmt::Debug for Bzip2Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bzip2Encoder").finish_non_exhaustive()
    }
}

impl<W: Write + Send> Bzip2Encoder<W> {
    /// Creates a new BZip2 encoder.
    pub fn new(output: W, options: &Bzip2EncoderOptions) -> Self {
        Self {
            inner: BzEncoder::new(output, bzip2::Compression::new(options.level)),
        }
    }

    /// Finishes encoding and returns the underlying writer.
    pub fn try_finish(self) -> io::Result<W> {
        self.inner.finish()
    }
}

impl<W: Write + Send> Write for Bzip2Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder for Bzip2Encoder<W> {
    fn compression(&self) -> Compression {
        Compression::Bzip2
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}
