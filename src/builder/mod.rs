//! Configuration-driven archive building.
//!
//! [`Builder`] turns a [`BuildConfig`] into a committed archive. The steps
//! can be run one by one or all at once with [`Builder::build`]:
//!
//! 1. [`register_plugins`](Builder::register_plugins): validate plugin
//!    order, let Git and Date fill Replace rules, then subscribe the
//!    entry-mutating plugins (and the reporter) to the archive's events.
//! 2. [`set_bootstrap`](Builder::set_bootstrap): custom stub, or a
//!    generated one using the configured shebang.
//! 3. [`set_main`](Builder::set_main): write or remove the primary entry.
//! 4. [`set_compression`](Builder::set_compression): default mode for the
//!    entries added next.
//! 5. [`set_paths`](Builder::set_paths): ingest every configured path
//!    through the event bus.
//! 6. [`commit`](Builder::commit).
//!
//! ```rust,no_run
//! use sealpack::{BuildConfig, Builder, Compression};
//!
//! let config = BuildConfig::new("project")
//!     .compression(Compression::Gzip)
//!     .main("bin/start")
//!     .path("bin")
//!     .path("src");
//! let archive = Builder::create(config)?.build()?;
//! println!("{} entries", archive.count());
//! # Ok::<(), sealpack::Error>(())
//! ```

mod config;

pub use config::{BuildConfig, DEFAULT_OUTPUT, PathSpec, Settings};

use std::fs;
use std::iter;
use std::mem;
use std::path::{Component, Path};

use crate::content::ContentSource;
use crate::event::{EventBus, REPORT_PRIORITY, ReportSubscriber};
use crate::ingest::TreeIngester;
use crate::plugin::{self, Plugin};
use crate::stub::PRIMARY;
use crate::{Archive, ArchivePath, Error, ManifestEntry, Result};

/// Drives one archive build.
#[derive(Debug)]
pub struct Builder {
    config: BuildConfig,
    archive: Archive,
}

impl Builder {
    /// Starts a fresh archive at the configured output path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if an existing output file cannot be
    /// removed.
    pub fn create(config: BuildConfig) -> Result<Self> {
        let output = config.output_path();
        log::info!("creating '{}'", output.display());
        let archive = Archive::create(&output)?;
        Ok(Self::new(config, archive))
    }

    /// Edits the existing archive at `path` in place.
    pub fn open(path: impl AsRef<Path>, config: BuildConfig) -> Result<Self> {
        let path = config.resolve_path(path);
        log::info!("opening '{}'", path.display());
        let archive = Archive::open(&path)?;
        Ok(Self::new(config, archive))
    }

    fn new(config: BuildConfig, mut archive: Archive) -> Self {
        archive.set_events(EventBus::new());
        Self { config, archive }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Returns the archive being built.
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Mutable access to the archive being built.
    pub fn archive_mut(&mut self) -> &mut Archive {
        &mut self.archive
    }

    /// Consumes the builder, returning the archive.
    pub fn into_archive(self) -> Archive {
        self.archive
    }

    /// Runs every step and commits.
    pub fn build(mut self) -> Result<Archive> {
        self.register_plugins()?
            .set_bootstrap()
            .set_main()?
            .set_compression()
            .set_paths()?
            .commit()?;
        Ok(self.archive)
    }

    /// Validates, resolves, and subscribes the configured plugins.
    ///
    /// # Errors
    ///
    /// - [`Error::PluginOrder`] if Git or Date follows Replace.
    /// - [`Error::Configuration`] if a plugin's settings are missing or
    ///   malformed.
    /// - [`Error::PluginExecution`] if a fact-producing plugin fails.
    pub fn register_plugins(&mut self) -> Result<&mut Self> {
        let mut plugins = mem::take(&mut self.config.plugins);
        let result = self.register(&mut plugins);
        self.config.plugins = plugins;
        result?;
        Ok(self)
    }

    fn register(&mut self, plugins: &mut [Plugin]) -> Result<()> {
        plugin::validate_order(plugins)?;

        for plugin in plugins.iter_mut() {
            plugin.resolve(&mut self.config)?;
        }

        let mut bus = self.archive.take_events();
        let subscribed = plugins
            .iter_mut()
            .try_for_each(|plugin| plugin.register_with(&mut bus, &self.config, &self.archive));
        if subscribed.is_ok() && self.config.report {
            bus.subscribe(ReportSubscriber::new(), REPORT_PRIORITY);
        }
        self.archive.set_events(bus);
        subscribed
    }

    /// Sets the custom stub, or regenerates the default one.
    pub fn set_bootstrap(&mut self) -> &mut Self {
        match &self.config.bootstrap {
            Some(bytes) => self.archive.set_bootstrap(bytes.clone()),
            None => {
                self.archive.clear_bootstrap();
                self.archive.set_shebang(self.config.shebang.as_deref());
            }
        }
        self
    }

    /// Writes the primary entry for the configured main script, or removes
    /// it when none is configured.
    pub fn set_main(&mut self) -> Result<&mut Self> {
        match &self.config.main {
            Some(main) => {
                let main = ArchivePath::new(main)?;
                let script = primary_script(&main);
                let entry = ManifestEntry::file(script.into_bytes()).with_permissions(0o755);
                self.archive.set_path(PRIMARY, entry)?;
            }
            None => {
                self.archive.remove_path(PRIMARY);
            }
        }
        Ok(self)
    }

    /// Applies the configured compression to entries added from now on.
    pub fn set_compression(&mut self) -> &mut Self {
        self.archive.set_compression(self.config.compression);
        self
    }

    /// Adds every configured path.
    ///
    /// Directories are walked; without an alternative name their members
    /// are named relative to the base directory, with one they are mounted
    /// under it. Files are named by the alternative or their relative path.
    /// A path outside the base directory is named from its parent instead,
    /// so a directory `../shared` contributes `shared/...` and a file
    /// `/etc/motd` becomes `motd`. Every entry passes through the archive's event bus.
    pub fn set_paths(&mut self) -> Result<&mut Self> {
        for spec in &self.config.paths {
            let source = self.config.resolve_path(&spec.source);
            let metadata = fs::metadata(&source).map_err(|e| Error::file_io(&source, e))?;
            let alternative = spec.alternative.as_deref().filter(|alt| !alt.is_empty());

            let added = if metadata.is_dir() {
                let ingester = match alternative {
                    Some(alt) => TreeIngester::new(&source, &source).reroot(alt)?,
                    None => {
                        TreeIngester::new(&source, naming_base(&self.config.directory, &source))
                    }
                };
                self.archive.set_paths_using_iterator(ingester)?
            } else {
                let name = match alternative {
                    Some(alt) => ArchivePath::new(alt)?,
                    None => relative_name(&self.config.directory, &source)?,
                };
                let item = Ok((name, ContentSource::File(source.clone())));
                self.archive.set_paths_using_iterator(iter::once(item))?
            };
            log::debug!("'{}' added {} entries", source.display(), added);
        }
        Ok(self)
    }

    /// Commits the archive.
    pub fn commit(&mut self) -> Result<&mut Self> {
        self.archive.commit()?;
        Ok(self)
    }
}

/// Shell script that runs `main` from the extraction root.
fn primary_script(main: &ArchivePath) -> String {
    let quoted = main.as_str().replace('\'', r"'\''");
    format!(
        "#!/bin/sh\ncd \"$(dirname \"$0\")/..\" && exec './{}' \"$@\"\n",
        quoted
    )
}

/// The directory archive names are taken relative to.
///
/// Sources under the build directory keep their path from it; anything
/// else is named from its parent, so `../shared` lands as `shared`.
fn naming_base<'a>(base: &'a Path, source: &'a Path) -> &'a Path {
    let inside = source
        .strip_prefix(base)
        .is_ok_and(|rel| !rel.components().any(|c| c == Component::ParentDir));
    if inside {
        base
    } else {
        source.parent().unwrap_or(source)
    }
}

fn relative_name(base: &Path, source: &Path) -> Result<ArchivePath> {
    let relative = source
        .strip_prefix(naming_base(base, source))
        .unwrap_or(source);
    let name = relative.to_str().ok_or_else(|| {
        Error::InvalidArchivePath(format!("'{}' is not valid UTF-8", relative.display()))
    })?;
    ArchivePath::new(name)
}
