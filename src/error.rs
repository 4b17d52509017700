//! Error types for sealpack archive and build operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when reading, writing, or building archives, along with a
//! convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`:
//!
//! ```rust,no_run
//! use sealpack::{Archive, Error};
//!
//! fn inspect(path: &str) -> sealpack::Result<()> {
//!     match Archive::open(path) {
//!         Ok(archive) => println!("{} entries", archive.count()),
//!         Err(e) if e.is_integrity_error() => eprintln!("tampered archive: {}", e),
//!         Err(e @ Error::Format(_)) => eprintln!("not a sealpack archive: {}", e),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// The main error type for sealpack operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io], [`FileIo`][Self::FileIo] | File system operations |
/// | Format | [`Format`][Self::Format], [`UnsupportedCompression`][Self::UnsupportedCompression] | Corrupt or foreign container |
/// | Integrity | [`Integrity`][Self::Integrity] | Signature or checksum mismatch |
/// | Paths | [`InvalidArchivePath`][Self::InvalidArchivePath] | Rejected manifest keys |
/// | Plugins | [`Configuration`][Self::Configuration], [`PluginOrder`][Self::PluginOrder], [`PluginExecution`][Self::PluginExecution] | Build pipeline setup and execution |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error that is not tied to a specific filesystem path.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An I/O error while operating on a specific filesystem path.
    #[error("I/O error on '{}': {source}", path.display())]
    FileIo {
        /// The path that was being read, written, or removed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The container structure is corrupt or not a sealpack archive.
    ///
    /// Raised by [`Archive::open`](crate::Archive::open) when the trailer,
    /// terminator marker, or manifest block cannot be parsed.
    #[error("Invalid archive format: {0}")]
    Format(String),

    /// The archive references a compression id this build cannot decode.
    ///
    /// Readers never pass unknown data through silently.
    #[error("Unsupported compression id {id}")]
    UnsupportedCompression {
        /// The compression id found in the manifest.
        id: u8,
    },

    /// The archive signature or an entry checksum does not match.
    #[error("Integrity check failed for '{path}': {reason}")]
    Integrity {
        /// The archive file or entry path that failed verification.
        path: String,
        /// What did not match.
        reason: String,
    },

    /// A manifest path was rejected during normalization.
    #[error("Invalid archive path: {0}")]
    InvalidArchivePath(String),

    /// A plugin is missing settings or its settings are invalid.
    #[error("Configuration error in {plugin}: {reason}")]
    Configuration {
        /// The plugin (or configuration section) at fault.
        plugin: String,
        /// A description of the problem.
        reason: String,
    },

    /// A plugin was registered after a plugin it must precede.
    #[error("The {before} plugin must be registered after {plugin}")]
    PluginOrder {
        /// The plugin whose registration was refused.
        plugin: &'static str,
        /// The plugin that was already registered.
        before: &'static str,
    },

    /// An external tool invoked by a plugin failed or timed out.
    #[error("{plugin} plugin failed running `{command}`: {reason}")]
    PluginExecution {
        /// The plugin that ran the command.
        plugin: &'static str,
        /// The command line that was executed.
        command: String,
        /// Exit status, stderr, or timeout description.
        reason: String,
    },
}

impl Error {
    /// Wraps an I/O error with the path it occurred on.
    pub fn file_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::FileIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a configuration error for the named plugin.
    pub fn configuration(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the container structure could not be understood.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::Format(_) | Error::UnsupportedCompression { .. }
        )
    }

    /// Returns `true` if a signature or checksum did not match.
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Error::Integrity { .. })
    }

    /// Returns `true` if this error originates from plugin setup or execution.
    pub fn is_plugin_error(&self) -> bool {
        matches!(
            self,
            Error::Configuration { .. } | Error::PluginOrder { .. } | Error::PluginExecution { .. }
        )
    }

    /// Returns `true` if this is an I/O error.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Io(_) | Error::FileIo { .. })
    }
}

/// A specialized Result type for sealpack operations.
pub type Result<T> = std::result::Result<T, Error>;
