//! # sealpack
//!
//! Signed, self-contained archive containers and a plugin-driven pipeline
//! for building them.
//!
//! An archive is a single file: a bootstrap stub a host runtime can act
//! on, a manifest of entries, the (optionally compressed) entry contents,
//! and a SHA-256 signature over everything before it. Archives are edited
//! in memory and written atomically on commit.
//!
//! ## Quick Start
//!
//! ### Working with an Archive
//!
//! ```rust,no_run
//! use sealpack::{Archive, Compression, ManifestEntry, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::create("tools.sealpack")?;
//!     archive.set_compression(Compression::Bzip2);
//!     archive.set_path("bin/hello", ManifestEntry::file("echo hello\n").with_permissions(0o755))?;
//!     archive.set_path("share", ManifestEntry::directory())?;
//!     archive.commit()?;
//!
//!     let archive = Archive::open("tools.sealpack")?;
//!     for (path, entry) in archive.paths() {
//!         println!("{} {:o}", path, entry.permissions());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Building from a Directory
//!
//! ```rust,no_run
//! use sealpack::{BuildConfig, Builder, Plugin, Result};
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let config = BuildConfig::new("my-project")
//!         .output("dist/my-project.sealpack")
//!         .main("bin/start")
//!         .path("bin")
//!         .path("src")
//!         .plugin(Plugin::Filter)
//!         .plugin(Plugin::git())
//!         .plugin(Plugin::Replace)
//!         .setting("filter", json!({"exclude": {"pattern": ["/tests?/"]}}))
//!         .setting("git", json!({"commit-short": ["@build@"]}))
//!         .setting("replace", json!({"all": [{"pattern": "@build@", "replacement": "%s"}]}));
//!
//!     let archive = Builder::create(config)?.build()?;
//!     println!("signed {}", archive.signature().map(|s| s.to_hex()).unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`]. Structural problems are
//! [`Error::Format`], tampering is [`Error::Integrity`], and plugin
//! problems are [`Error::Configuration`], [`Error::PluginOrder`], or
//! [`Error::PluginExecution`]. [`Archive::is_valid`] reports a signature
//! mismatch as `Ok(false)` rather than an error.
//!
//! ## Features
//!
//! | Feature | Default | Adds |
//! |---------|---------|------|
//! | `gzip`  | yes     | [`Compression::Gzip`] via `flate2` |
//! | `bzip2` | yes     | [`Compression::Bzip2`] via `bzip2` |
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod archive;
pub mod archive_path;
pub mod builder;
pub mod checksum;
pub mod codec;
pub mod content;
pub mod entry;
pub mod error;
pub mod event;
pub mod format;
pub mod ingest;
pub mod plugin;
pub mod stub;

pub use archive::Archive;
pub use archive_path::ArchivePath;
pub use builder::{BuildConfig, Builder, Settings};
pub use codec::Compression;
pub use content::ContentSource;
pub use entry::{EntryKind, ManifestEntry};
pub use error::{Error, Result};
pub use format::trailer::Signature;
pub use ingest::TreeIngester;
pub use plugin::Plugin;
pub use stub::Stub;
