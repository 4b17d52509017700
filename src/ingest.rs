//! Directory tree ingestion.
//!
//! [`TreeIngester`] walks a directory and yields one
//! `(ArchivePath, ContentSource)` pair per member, ready for
//! [`Archive::set_paths_using_iterator`](crate::Archive::set_paths_using_iterator).
//! Traversal is depth-first, directories come before their contents, and
//! siblings are visited in file-name order, so the sequence is stable for
//! a fixed snapshot of the tree. Nothing is read beyond directory listings;
//! file contents stay on disk until commit.
//!
//! ```rust,no_run
//! use sealpack::TreeIngester;
//!
//! // project/src/lib.rs becomes "lib/lib.rs"
//! let items = TreeIngester::new("project/src", "project/src").reroot("lib")?;
//! for item in items {
//!     let (path, _source) = item?;
//!     println!("{}", path);
//! }
//! # Ok::<(), sealpack::Error>(())
//! ```

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::archive_path::IntoArchivePath;
use crate::content::ContentSource;
use crate::{ArchivePath, Error, Result};

/// Lazy, ordered walk over a directory subtree.
pub struct TreeIngester {
    root: PathBuf,
    base: PathBuf,
    prefix: Option<ArchivePath>,
    walker: walkdir::IntoIter,
}

impl TreeIngester {
    /// Walks `dir`, naming members relative to `base`.
    ///
    /// `base` is usually `dir` itself or one of its ancestors. The root
    /// directory is not yielded.
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        let root = dir.into();
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self {
            root,
            base: base.into(),
            prefix: None,
            walker,
        }
    }

    /// Mounts every yielded path under `prefix`.
    pub fn reroot(mut self, prefix: impl IntoArchivePath) -> Result<Self> {
        self.prefix = Some(prefix.into_archive_path()?);
        Ok(self)
    }

    /// Returns the directory being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn archive_path(&self, member: &Path) -> Result<ArchivePath> {
        let relative = member.strip_prefix(&self.base).map_err(|_| {
            Error::InvalidArchivePath(format!(
                "'{}' is outside base directory '{}'",
                member.display(),
                self.base.display()
            ))
        })?;
        let relative = relative.to_str().ok_or_else(|| {
            Error::InvalidArchivePath(format!(
                "'{}' is not valid UTF-8",
                relative.to_string_lossy()
            ))
        })?;
        match &self.prefix {
            Some(prefix) => prefix.join(relative),
            None => ArchivePath::new(relative),
        }
    }
}

impl Iterator for TreeIngester {
    type Item = Result<(ArchivePath, ContentSource)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.walker.next()? {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone());
                return Some(Err(Error::file_io(path, e.into())));
            }
        };
        let member = entry.into_path();
        Some(
            self.archive_path(&member)
                .map(|path| (path, ContentSource::File(member))),
        )
    }
}

impl std::fmt::Debug for TreeIngester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeIngester")
            .field("root", &self.root)
            .field("base", &self.base)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
