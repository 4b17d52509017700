//! Signature block at the end of every archive.

use std::fmt;

use super::{DIGEST_LEN, END_MAGIC, TRAILER_SIZE, algorithm};
use crate::checksum::to_hex;
use crate::{Error, Result};

/// The digest recorded for a committed archive.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    algorithm: u8,
    digest: [u8; DIGEST_LEN],
}

impl Signature {
    /// Creates a SHA-256 signature from a digest.
    pub fn sha256(digest: [u8; DIGEST_LEN]) -> Self {
        Self {
            algorithm: algorithm::SHA256,
            digest,
        }
    }

    /// Returns the algorithm id.
    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    /// Returns the raw digest.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Returns the digest as lowercase hex.
    pub fn to_hex(&self) -> String {
        to_hex(&self.digest)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(sha256:{})", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

/// Parsed signature block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Recorded signature.
    pub signature: Signature,
    /// Length of the stub at the start of the file.
    pub stub_len: u64,
}

impl Trailer {
    /// Encodes the trailer.
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE as usize] {
        let mut out = [0u8; TRAILER_SIZE as usize];
        out[0] = self.signature.algorithm;
        out[1..33].copy_from_slice(&self.signature.digest);
        out[33..41].copy_from_slice(&self.stub_len.to_le_bytes());
        out[41..45].copy_from_slice(END_MAGIC);
        out
    }

    /// Decodes a trailer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] for a wrong end magic or an unknown
    /// signature algorithm.
    pub fn parse(bytes: &[u8; TRAILER_SIZE as usize]) -> Result<Self> {
        if &bytes[41..45] != END_MAGIC {
            return Err(Error::Format(
                "signature block not found (bad end magic)".into(),
            ));
        }
        if bytes[0] != algorithm::SHA256 {
            return Err(Error::Format(format!(
                "unknown signature algorithm {}",
                bytes[0]
            )));
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes[1..33]);
        let mut stub_len = [0u8; 8];
        stub_len.copy_from_slice(&bytes[33..41]);
        Ok(Self {
            signature: Signature::sha256(digest),
            stub_len: u64::from_le_bytes(stub_len),
        })
    }
}
