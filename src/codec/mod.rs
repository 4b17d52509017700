//! Compression codecs for entry content.
//!
//! Every manifest entry is stored under one of a fixed set of
//! [`Compression`] modes. This module maps each mode to a streaming
//! [`Encoder`]/[`Decoder`] pair and offers one-shot helpers for callers
//! that already hold the bytes in memory.
//!
//! Codecs backed by optional crates are gated behind the `gzip` and
//! `bzip2` features. Asking for a mode whose feature is disabled yields
//! [`Error::UnsupportedCompression`] rather than silently storing or
//! returning raw bytes.
//!
//! # Example
//!
//! ```rust
//! use sealpack::codec::{self, Compression};
//!
//! let data = b"hello hello hello hello";
//! let stored = codec::compress(Compression::Gzip, data).unwrap();
//! let restored = codec::decompress(Compression::Gzip, &stored, data.len() as u64).unwrap();
//! assert_eq!(restored, data);
//! ```

#[cfg(feature = "gzip")]
pub mod gzip;

#[cfg(feature = "bzip2")]
pub mod bzip2;

mod copy;

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use copy::{CopyDecoder, CopyEncoder};

#[cfg(feature = "gzip")]
pub use gzip::{GzipDecoder, GzipEncoder, GzipEncoderOptions};

#[cfg(feature = "bzip2")]
pub use bzip2::{Bzip2Decoder, Bzip2Encoder, Bzip2EncoderOptions};

/// Compression mode applied to one entry's stored bytes.
///
/// The numeric value is the id written to the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Compression {
    /// Stored as-is.
    #[default]
    None = 0,
    /// Gzip (deflate with gzip framing).
    Gzip = 1,
    /// BZip2.
    Bzip2 = 2,
}

impl Compression {
    /// All known modes, in id order.
    pub const ALL: [Compression; 3] = [Compression::None, Compression::Gzip, Compression::Bzip2];

    /// Returns the manifest id of this mode.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Looks up a mode by its manifest id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCompression`] for unknown ids.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Bzip2),
            _ => Err(Error::UnsupportedCompression { id }),
        }
    }

    /// Returns the configuration name of this mode.
    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "NONE",
            Compression::Gzip => "GZIP",
            Compression::Bzip2 => "BZIP2",
        }
    }

    /// Returns `true` if this build can encode and decode the mode.
    pub fn is_available(self) -> bool {
        match self {
            Compression::None => true,
            Compression::Gzip => cfg!(feature = "gzip"),
            Compression::Bzip2 => cfg!(feature = "bzip2"),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Compression::None),
            "GZIP" => Ok(Compression::Gzip),
            "BZIP2" => Ok(Compression::Bzip2),
            other => Err(Error::configuration(
                "compression",
                format!("unknown compression mode '{}' (expected NONE, GZIP or BZIP2)", other),
            )),
        }
    }
}

/// A decoder that reads stored bytes and produces original bytes.
pub trait Decoder: Read + Send {
    /// Returns the mode this decoder handles.
    fn compression(&self) -> Compression;
}

/// An encoder that takes original bytes and writes stored bytes.
pub trait Encoder: Write + Send {
    /// Returns the mode this encoder produces.
    fn compression(&self) -> Compression;

    /// Finishes encoding and flushes any remaining data.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Builds a streaming decoder for the given mode.
///
/// `original_size` bounds the output of the pass-through decoder; the
/// compressed formats carry their own end markers.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCompression`] if the mode's codec is not
/// compiled in.
pub fn build_decoder<'a, R: Read + Send + 'a>(
    input: R,
    compression: Compression,
    original_size: u64,
) -> Result<Box<dyn Decoder + 'a>> {
    match compression {
        Compression::None => Ok(Box::new(CopyDecoder::new(input, original_size))),

        #[cfg(feature = "gzip")]
        Compression::Gzip => Ok(Box::new(GzipDecoder::new(io::BufReader::new(input)))),

        #[cfg(feature = "bzip2")]
        Compression::Bzip2 => Ok(Box::new(Bzip2Decoder::new(input))),

        #[allow(unreachable_patterns)]
        other => Err(Error::UnsupportedCompression { id: other.id() }),
    }
}

/// Builds a streaming encoder for the given mode.
///
/// Callers must invoke [`Encoder::finish`] once all input is written.
///
/// # Errors
///
/// Returns [`Error::UnsupportedCompression`] if the mode's codec is not
/// compiled in.
pub fn build_encoder<'a, W: Write + Send + 'a>(
    output: W,
    compression: Compression,
) -> Result<Box<dyn Encoder + 'a>> {
    match compression {
        Compression::None => Ok(Box::new(CopyEncoder::new(output))),

        #[cfg(feature = "gzip")]
        Compression::Gzip => Ok(Box::new(GzipEncoder::new(
            output,
            &GzipEncoderOptions::default(),
        ))),

        #[cfg(feature = "bzip2")]
        Compression::Bzip2 => Ok(Box::new(Bzip2Encoder::new(
            output,
            &Bzip2EncoderOptions::default(),
        ))),

        #[allow(unreachable_patterns)]
        other => Err(Error::UnsupportedCompression { id: other.id() }),
    }
}

/// Compresses `data` in one call.
pub fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    let mut stored = Vec::new();
    let mut encoder = build_encoder(&mut stored, compression)?;
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(stored)
}

/// Decompresses `data` in one call and checks the result length.
///
/// # Errors
///
/// Returns [`Error::Format`] if the stream is corrupt or does not expand
/// to exactly `original_len` bytes.
pub fn decompress(compression: Compression, data: &[u8], original_len: u64) -> Result<Vec<u8>> {
    let mut decoder = build_decoder(data, compression, original_len)?;
    let mut out = Vec::with_capacity(original_len.min(64 * 1024 * 1024) as usize);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Format(format!("{} stream is corrupt: {}", compression, e)))?;
    if out.len() as u64 != original_len {
        return Err(Error::Format(format!(
            "{} stream expanded to {} bytes, expected {}",
            compression,
            out.len(),
            original_len
        )));
    }
    Ok(out)
}
