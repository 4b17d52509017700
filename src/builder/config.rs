//! Resolved build configuration.
//!
//! Loading and layering configuration files happens outside this crate;
//! [`BuildConfig`] is the already-resolved result, assembled in code:
//!
//! ```rust
//! use sealpack::{BuildConfig, Compression, Plugin};
//! use serde_json::json;
//!
//! let config = BuildConfig::new("project")
//!     .output("dist/app.sealpack")
//!     .compression(Compression::Gzip)
//!     .main("bin/run")
//!     .path("src")
//!     .path_as("vendor/lib", "lib")
//!     .plugin(Plugin::Chmod)
//!     .setting("chmod", json!({"mode": 0o755}));
//!
//! assert_eq!(config.paths.len(), 2);
//! assert!(config.settings.contains("chmod"));
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Compression;
use crate::plugin::Plugin;
use crate::{Error, Result};

/// Default output file name, relative to the base directory.
pub const DEFAULT_OUTPUT: &str = "project.sealpack";

/// Namespaced plugin settings.
///
/// Each plugin owns one namespace (`"chmod"`, `"replace"`, ...) holding an
/// arbitrary JSON value that the plugin deserializes into its own types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, Value>,
}

impl Settings {
    /// Creates empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw value of a namespace.
    pub fn get(&self, namespace: &str) -> Option<&Value> {
        self.values.get(namespace)
    }

    /// Sets a namespace, returning the previous value.
    pub fn insert(&mut self, namespace: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(namespace.into(), value)
    }

    /// Removes a namespace.
    pub fn remove(&mut self, namespace: &str) -> Option<Value> {
        self.values.remove(namespace)
    }

    /// Returns `true` if the namespace is set.
    pub fn contains(&self, namespace: &str) -> bool {
        self.values.contains_key(namespace)
    }

    /// Deserializes a namespace, if it is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the namespace if the value
    /// does not have the expected shape.
    pub fn typed<T: DeserializeOwned>(&self, namespace: &str) -> Result<Option<T>> {
        self.values
            .get(namespace)
            .map(|value| {
                T::deserialize(value).map_err(|e| Error::configuration(namespace, e.to_string()))
            })
            .transpose()
    }

    /// Deserializes a namespace that must be set.
    pub fn require<T: DeserializeOwned>(&self, namespace: &str) -> Result<T> {
        self.typed(namespace)?
            .ok_or_else(|| Error::configuration(namespace, "settings are missing"))
    }

    /// Serializes `value` into a namespace.
    pub fn store<T: Serialize>(&mut self, namespace: &str, value: &T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| Error::configuration(namespace, e.to_string()))?;
        self.values.insert(namespace.to_string(), value);
        Ok(())
    }
}

/// One on-disk path to add, with an optional in-archive name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    /// File or directory on disk; relative paths resolve against the base.
    pub source: PathBuf,
    /// Name to use inside the archive instead of the relative path.
    pub alternative: Option<String>,
}

/// Everything a [`Builder`](crate::Builder) needs to produce an archive.
#[derive(Debug)]
pub struct BuildConfig {
    /// Base directory for relative paths and git facts.
    pub directory: PathBuf,
    /// Archive file to write.
    pub output: PathBuf,
    /// Custom stub bytes.
    pub bootstrap: Option<Vec<u8>>,
    /// Interpreter line for the generated stub.
    pub shebang: Option<String>,
    /// Compression for added entries.
    pub compression: Compression,
    /// In-archive path of the script the primary entry runs.
    pub main: Option<String>,
    /// Paths to add, in order.
    pub paths: Vec<PathSpec>,
    /// Plugins to register, in order.
    pub plugins: Vec<Plugin>,
    /// Plugin settings.
    pub settings: Settings,
    /// Whether to log each added entry.
    pub report: bool,
}

impl BuildConfig {
    /// Creates a configuration rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            bootstrap: None,
            shebang: None,
            compression: Compression::None,
            main: None,
            paths: Vec::new(),
            plugins: Vec::new(),
            settings: Settings::new(),
            report: true,
        }
    }

    /// Sets the output file.
    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /// Sets custom stub bytes.
    pub fn bootstrap(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.bootstrap = Some(bytes.into());
        self
    }

    /// Sets the interpreter line for the generated stub.
    pub fn shebang(mut self, shebang: impl Into<String>) -> Self {
        self.shebang = Some(shebang.into());
        self
    }

    /// Sets the compression mode.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the main script.
    pub fn main(mut self, main: impl Into<String>) -> Self {
        self.main = Some(main.into());
        self
    }

    /// Adds a file or directory under its relative name.
    pub fn path(mut self, source: impl Into<PathBuf>) -> Self {
        self.paths.push(PathSpec {
            source: source.into(),
            alternative: None,
        });
        self
    }

    /// Adds a file or directory under `alternative`.
    pub fn path_as(mut self, source: impl Into<PathBuf>, alternative: impl Into<String>) -> Self {
        self.paths.push(PathSpec {
            source: source.into(),
            alternative: Some(alternative.into()),
        });
        self
    }

    /// Appends a plugin.
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Sets a settings namespace.
    pub fn setting(mut self, namespace: impl Into<String>, value: Value) -> Self {
        self.settings.insert(namespace, value);
        self
    }

    /// Enables or disables per-entry reporting.
    pub fn report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }

    /// Resolves `path` against the base directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory.join(path)
        }
    }

    /// The output file, resolved against the base directory.
    pub fn output_path(&self) -> PathBuf {
        self.resolve_path(&self.output)
    }
}
