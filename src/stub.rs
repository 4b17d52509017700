//! Bootstrap stub handling.
//!
//! Every archive starts with a stub: opaque bytes a host runtime can act on
//! before the raw archive data begins. The engine never interprets the stub
//! beyond one rule: it must end with [`TERMINATOR`], which marks where the
//! manifest starts.
//!
//! When no custom stub is supplied, [`Stub::generate`] produces a small
//! POSIX shell script. Generated stubs carry [`GENERATED_MARKER`] so that an
//! archive reopened for editing regenerates its stub on the next commit,
//! keeping the primary-entry reference in sync.

use std::fmt;

use crate::{Error, Result};

/// Marker that must end every stub.
pub const TERMINATOR: &[u8] = b"__SEALPACK_HALT__\n";

/// Reserved manifest key for the primary (entry-point) script.
pub const PRIMARY: &str = ".sealpack/primary";

/// Comment line identifying a generated stub.
pub const GENERATED_MARKER: &str = "# sealpack:generated-bootstrap";

/// The bytes placed before the manifest.
#[derive(Clone, PartialEq, Eq)]
pub struct Stub {
    bytes: Vec<u8>,
}

impl Stub {
    /// Wraps custom stub bytes, appending the terminator if missing.
    ///
    /// ```rust
    /// use sealpack::stub::{Stub, TERMINATOR};
    ///
    /// let stub = Stub::new(b"#!/bin/sh\nexit 0".to_vec());
    /// assert!(stub.as_bytes().ends_with(TERMINATOR));
    /// assert_eq!(stub.shebang(), Some("#!/bin/sh"));
    /// ```
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        if !bytes.ends_with(TERMINATOR) {
            if !bytes.is_empty() && !bytes.ends_with(b"\n") {
                bytes.push(b'\n');
            }
            bytes.extend_from_slice(TERMINATOR);
        }
        Self { bytes }
    }

    /// Accepts stub bytes read from an archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the terminator is missing.
    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        if !bytes.ends_with(TERMINATOR) {
            return Err(Error::Format(
                "stub does not end with the terminator marker".into(),
            ));
        }
        Ok(Self { bytes })
    }

    /// Generates the default shell bootstrap.
    ///
    /// `shebang` becomes the first line (a missing `#!` prefix is added).
    /// With `has_primary` the script hands control to the
    /// [`PRIMARY`] entry; otherwise it explains that the archive only
    /// carries files.
    pub fn generate(shebang: Option<&str>, has_primary: bool) -> Self {
        let mut script = String::new();
        if let Some(line) = shebang.map(str::trim).filter(|s| !s.is_empty()) {
            if !line.starts_with("#!") {
                script.push_str("#!");
            }
            script.push_str(line);
            script.push('\n');
        }
        script.push_str(GENERATED_MARKER);
        script.push('\n');
        script.push_str("SEALPACK_ARCHIVE=\"$0\"\n");

        if has_primary {
            script.push_str(&format!("SEALPACK_PRIMARY=\"{}\"\n", PRIMARY));
            script.push_str(
                "exec \"${SEALPACK_RUNNER:-sealpack-run}\" \"$SEALPACK_ARCHIVE\" \"$SEALPACK_PRIMARY\" \"$@\"\n",
            );
        } else {
            script.push_str(
                "echo \"sealpack: $SEALPACK_ARCHIVE has no entry point\" >&2\n",
            );
            script.push_str("exit 1\n");
        }

        let mut bytes = script.into_bytes();
        bytes.extend_from_slice(TERMINATOR);
        Self { bytes }
    }

    /// Returns `true` if the stub was produced by [`Stub::generate`].
    pub fn is_generated(&self) -> bool {
        self.lines().any(|line| line == GENERATED_MARKER.as_bytes())
    }

    /// Returns the interpreter line, if the stub starts with one.
    pub fn shebang(&self) -> Option<&str> {
        let first = self.lines().next()?;
        if !first.starts_with(b"#!") {
            return None;
        }
        std::str::from_utf8(first).ok()
    }

    /// Returns `true` if the stub mentions the primary entry.
    pub fn references_primary(&self) -> bool {
        self.bytes
            .windows(PRIMARY.len())
            .any(|w| w == PRIMARY.as_bytes())
    }

    /// Returns the raw bytes including the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the stub length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the stub is empty (never the case once constructed).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consumes the stub and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes.split(|b| *b == b'\n')
    }
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("len", &self.bytes.len())
            .field("generated", &self.is_generated())
            .finish()
    }
}
