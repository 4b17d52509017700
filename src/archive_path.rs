//! Manifest key type with normalization and validation.

use crate::{Error, Result};
use std::fmt;

/// Maximum length for archive paths (in bytes).
///
/// The manifest stores path lengths as `u16`.
pub const MAX_PATH_LENGTH: usize = u16::MAX as usize;

/// A normalized, relative path used as a manifest key.
///
/// `ArchivePath` converts backslashes to forward slashes, collapses repeated
/// separators, and strips leading and trailing separators. After
/// normalization it rejects:
/// - NUL bytes
/// - empty paths
/// - `.` or `..` segments
///
/// # Examples
///
/// ```
/// use sealpack::ArchivePath;
///
/// let path = ArchivePath::new("/src\\lib//main.rs").unwrap();
/// assert_eq!(path.as_str(), "src/lib/main.rs");
///
/// assert!(ArchivePath::new("../secret").is_err());
/// assert!(ArchivePath::new("a/./b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Normalizes and validates a path string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchivePath`] if the normalized path is empty,
    /// too long, contains a NUL byte, or has `.`/`..` segments.
    pub fn new(s: &str) -> Result<Self> {
        let normalized = normalize(s);
        validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Returns the path as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Joins this path with another (possibly multi-segment) relative path.
    pub fn join(&self, other: &str) -> Result<Self> {
        Self::new(&format!("{}/{}", self.0, other))
    }

    /// Returns the parent directory of this path, if any.
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Returns the file name (last segment) of this path.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns an iterator over the path segments.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Returns true if this path starts with the given prefix, compared
    /// segment by segment.
    ///
    /// ```
    /// use sealpack::ArchivePath;
    ///
    /// let path = ArchivePath::new("dir/subdir/file.txt").unwrap();
    /// assert!(path.starts_with("dir/subdir"));
    /// assert!(!path.starts_with("di"));
    /// ```
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = normalize(prefix);
        if prefix.is_empty() {
            return true;
        }
        let mut own = self.components();
        prefix.split('/').all(|p| own.next() == Some(p))
    }
}

/// Rewrites separators and trims leading/trailing/repeated ones.
fn normalize(s: &str) -> String {
    s.split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn validate(s: &str) -> Result<()> {
    if s.contains('\0') {
        return Err(Error::InvalidArchivePath("contains NUL byte".into()));
    }

    if s.is_empty() {
        return Err(Error::InvalidArchivePath("empty path".into()));
    }

    if s.len() > MAX_PATH_LENGTH {
        return Err(Error::InvalidArchivePath(format!(
            "path exceeds maximum length of {} bytes",
            MAX_PATH_LENGTH
        )));
    }

    for segment in s.split('/') {
        if segment == "." {
            return Err(Error::InvalidArchivePath(format!(
                "'.' segment not allowed in '{}'",
                s
            )));
        }
        if segment == ".." {
            return Err(Error::InvalidArchivePath(format!(
                "'..' segment not allowed in '{}' (path traversal)",
                s
            )));
        }
    }

    Ok(())
}

/// Conversion into a validated [`ArchivePath`].
///
/// Implemented for string types (normalized and validated on conversion)
/// and for `ArchivePath` itself.
pub trait IntoArchivePath {
    /// Performs the conversion.
    fn into_archive_path(self) -> Result<ArchivePath>;
}

impl IntoArchivePath for ArchivePath {
    fn into_archive_path(self) -> Result<ArchivePath> {
        Ok(self)
    }
}

impl IntoArchivePath for &ArchivePath {
    fn into_archive_path(self) -> Result<ArchivePath> {
        Ok(self.clone())
    }
}

impl IntoArchivePath for &str {
    fn into_archive_path(self) -> Result<ArchivePath> {
        ArchivePath::new(self)
    }
}

impl IntoArchivePath for String {
    fn into_archive_path(self) -> Result<ArchivePath> {
        ArchivePath::new(&self)
    }
}

impl IntoArchivePath for &String {
    fn into_archive_path(self) -> Result<ArchivePath> {
        ArchivePath::new(self)
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ArchivePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArchivePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}
