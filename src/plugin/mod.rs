//! Build plugins.
//!
//! Plugins extend a build in two phases, driven by
//! [`Builder::register_plugins`](crate::Builder::register_plugins):
//!
//! 1. **Resolution** ([`Plugin::resolve`]). Fact-producing plugins
//!    ([`Git`](Plugin::Git), [`Date`](Plugin::Date)) compute their values and
//!    fill the `%s` slot of matching rules in the shared `replace` settings.
//! 2. **Subscription** ([`Plugin::register_with`]). Entry-mutating plugins
//!    ([`Chmod`](Plugin::Chmod), [`Filter`](Plugin::Filter),
//!    [`Replace`](Plugin::Replace)) build subscribers from the finalized
//!    settings and attach them to the archive's [`EventBus`].
//!
//! Because Git and Date rewrite Replace's rules, they must come before
//! Replace in the plugin list. [`validate_order`] rejects any other
//! arrangement with [`Error::PluginOrder`], and Git/Date refuse to register
//! on a bus where Replace already subscribed.
//!
//! # Settings
//!
//! Each plugin reads its own namespace from
//! [`Settings`](crate::builder::Settings):
//!
//! | Plugin  | Namespace | Shape |
//! |---------|-----------|-------|
//! | Chmod   | `chmod`   | `{"mode": 493}`, `493`, or `"0755"` |
//! | Filter  | `filter`  | `{"exclude": {"name": [], "path": [], "pattern": []}, "include": {..}}` |
//! | Replace | `replace` | `{"all": [{"pattern", "replacement"}], "path": [{"path", ..}], "pattern": [{"path", ..}]}` |
//! | Git     | `git`     | `{"commit": ["@commit@"], "commit-short": [], "commit-date": [], "commit-tag": [], "tag": []}` |
//! | Date    | `date`    | `[{"pattern", "format", "when", "zone"}]` |
//!
//! Patterns are regular expressions. They may be written bare (`^src/`) or
//! between delimiters with trailing flags (`/test/i`).

pub mod chmod;
pub mod date;
pub mod filter;
pub mod git;
pub mod replace;

use std::fmt;
use std::str::FromStr;

use crate::builder::BuildConfig;
use crate::event::EventBus;
use crate::{Archive, Error, Result};

pub use chmod::ChmodSubscriber;
pub use date::DatePlugin;
pub use filter::FilterSubscriber;
pub use git::{GitFact, GitPlugin};
pub use replace::ReplaceSubscriber;

/// Identifies a plugin type, independent of its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    /// Permission override.
    Chmod,
    /// Inclusion/exclusion filtering.
    Filter,
    /// Content substitution.
    Replace,
    /// Git facts for Replace.
    Git,
    /// Date facts for Replace.
    Date,
    /// A plugin supplied by the embedding application.
    External,
}

impl PluginKind {
    /// Display name, as used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            PluginKind::Chmod => "Chmod",
            PluginKind::Filter => "Filter",
            PluginKind::Replace => "Replace",
            PluginKind::Git => "Git",
            PluginKind::Date => "Date",
            PluginKind::External => "External",
        }
    }

    /// Returns `true` for plugins that rewrite Replace's settings.
    pub fn feeds_replace(self) -> bool {
        matches!(self, PluginKind::Git | PluginKind::Date)
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A plugin implemented outside this crate.
pub trait ExternalPlugin {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Resolution phase; may edit `config`'s settings.
    fn resolve(&mut self, _config: &mut BuildConfig) -> Result<()> {
        Ok(())
    }

    /// Subscription phase.
    fn register_with(
        &mut self,
        bus: &mut EventBus,
        config: &BuildConfig,
        archive: &Archive,
    ) -> Result<()>;
}

/// A build plugin.
pub enum Plugin {
    /// Overrides permission bits of every entry.
    Chmod,
    /// Drops entries by name, path, or pattern.
    Filter,
    /// Substitutes text inside file entries.
    Replace,
    /// Fills Replace rules with repository facts.
    Git(GitPlugin),
    /// Fills Replace rules with formatted dates.
    Date(DatePlugin),
    /// Application-provided plugin.
    External(Box<dyn ExternalPlugin>),
}

impl Plugin {
    /// A Git plugin with default options.
    pub fn git() -> Self {
        Plugin::Git(GitPlugin::new())
    }

    /// A Date plugin reading the system clock.
    pub fn date() -> Self {
        Plugin::Date(DatePlugin::new())
    }

    /// Wraps an external plugin.
    pub fn external(plugin: impl ExternalPlugin + 'static) -> Self {
        Plugin::External(Box::new(plugin))
    }

    /// Looks up a built-in plugin by name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no built-in plugin has that name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "chmod" => Ok(Plugin::Chmod),
            "filter" => Ok(Plugin::Filter),
            "replace" => Ok(Plugin::Replace),
            "git" => Ok(Plugin::git()),
            "date" => Ok(Plugin::date()),
            _ => Err(Error::configuration(
                name,
                "no plugin implementation with this name",
            )),
        }
    }

    /// Returns the plugin kind.
    pub fn kind(&self) -> PluginKind {
        match self {
            Plugin::Chmod => PluginKind::Chmod,
            Plugin::Filter => PluginKind::Filter,
            Plugin::Replace => PluginKind::Replace,
            Plugin::Git(_) => PluginKind::Git,
            Plugin::Date(_) => PluginKind::Date,
            Plugin::External(_) => PluginKind::External,
        }
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        match self {
            Plugin::External(plugin) => plugin.name(),
            other => other.kind().name(),
        }
    }

    /// Resolution phase.
    ///
    /// Git and Date fill Replace rules in `config`'s settings; the
    /// entry-mutating plugins do nothing here.
    pub fn resolve(&mut self, config: &mut BuildConfig) -> Result<()> {
        match self {
            Plugin::Git(git) => git.resolve(config),
            Plugin::Date(date) => date.resolve(config),
            Plugin::External(plugin) => plugin.resolve(config),
            Plugin::Chmod | Plugin::Filter | Plugin::Replace => Ok(()),
        }
    }

    /// Subscription phase.
    ///
    /// Builds the plugin's subscriber from `config`'s settings and attaches
    /// it to `bus`. Settings errors surface here as
    /// [`Error::Configuration`].
    pub fn register_with(
        &mut self,
        bus: &mut EventBus,
        config: &BuildConfig,
        archive: &Archive,
    ) -> Result<()> {
        let kind = self.kind();
        if kind.feeds_replace() && bus.has_plugin(PluginKind::Replace) {
            return Err(Error::PluginOrder {
                plugin: kind.name(),
                before: PluginKind::Replace.name(),
            });
        }

        match self {
            Plugin::Chmod => chmod::register(bus, config)?,
            Plugin::Filter => filter::register(bus, config)?,
            Plugin::Replace => replace::register(bus, config)?,
            Plugin::Git(_) | Plugin::Date(_) => {}
            Plugin::External(plugin) => plugin.register_with(bus, config, archive)?,
        }
        bus.record_plugin(kind);
        log::debug!("registered plugin {}", self.name());
        Ok(())
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plugin::Git(git) => f.debug_tuple("Git").field(git).finish(),
            Plugin::Date(date) => f.debug_tuple("Date").field(date).finish(),
            Plugin::External(plugin) => f.debug_tuple("External").field(&plugin.name()).finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Plugin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Plugin::from_name(s)
    }
}

/// Checks that no Git or Date plugin follows a Replace plugin.
pub fn validate_order(plugins: &[Plugin]) -> Result<()> {
    let mut replace_seen = false;
    for plugin in plugins {
        let kind = plugin.kind();
        if kind == PluginKind::Replace {
            replace_seen = true;
        } else if replace_seen && kind.feeds_replace() {
            return Err(Error::PluginOrder {
                plugin: kind.name(),
                before: PluginKind::Replace.name(),
            });
        }
    }
    Ok(())
}

/// Translates a possibly delimited pattern into `regex` syntax.
///
/// `/body/flags` becomes `(?flags)body` for the flags `i`, `m`, `s`, `x`,
/// `u` and `U`. Anything else, including text that merely starts with one
/// of `/ # ~ ! |`, is taken as a bare expression. `@` and `%` are not
/// delimiters, so placeholders such as `@version@` match literally.
pub(crate) fn pattern_source(pattern: &str) -> String {
    const DELIMITERS: &[char] = &['/', '#', '~', '!', '|'];

    let mut chars = pattern.chars();
    let Some(first) = chars.next().filter(|c| DELIMITERS.contains(c)) else {
        return pattern.to_string();
    };
    let Some(end) = pattern.rfind(first).filter(|&end| end > 0) else {
        return pattern.to_string();
    };

    let body = &pattern[first.len_utf8()..end];
    let flags = &pattern[end + first.len_utf8()..];
    if flags.chars().any(|c| !"imsxuU".contains(c)) {
        // "/usr/bin" is a path, not a pattern with flags "bin".
        return pattern.to_string();
    }
    if flags.is_empty() {
        body.to_string()
    } else {
        format!("(?{}){}", flags, body)
    }
}

/// Compiles a path pattern.
pub(crate) fn compile_pattern(plugin: &str, pattern: &str) -> Result<regex::Regex> {
    let source = pattern_source(pattern);
    regex::Regex::new(&source).map_err(|e| {
        Error::configuration(plugin, format!("invalid pattern {}: {}", pattern, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_source() {
        assert_eq!(pattern_source("^src/"), "^src/");
        assert_eq!(pattern_source("/test/"), "test");
        assert_eq!(pattern_source("#a/b#i"), "(?i)a/b");
        assert_eq!(pattern_source("/"), "/");
        assert_eq!(pattern_source("/usr/bin"), "/usr/bin");
        assert_eq!(pattern_source("@commit@"), "@commit@");
    }

    #[test]
    fn test_compile_pattern_matches_inside_path() {
        let re = compile_pattern("filter", "/test/").unwrap();
        assert!(re.is_match("src/other_test.php"));
        assert!(!re.is_match("src/main.php"));
        assert!(compile_pattern("filter", "(").is_err());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Plugin::from_name("Chmod").unwrap().kind(), PluginKind::Chmod);
        assert_eq!("git".parse::<Plugin>().unwrap().kind(), PluginKind::Git);
        let err = Plugin::from_name("Nope").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_validate_order() {
        assert!(validate_order(&[Plugin::git(), Plugin::date(), Plugin::Replace]).is_ok());
        assert!(validate_order(&[Plugin::Chmod, Plugin::Filter]).is_ok());

        let err = validate_order(&[Plugin::Replace, Plugin::git()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The Replace plugin must be registered after Git"
        );
        let err = validate_order(&[Plugin::Replace, Plugin::Chmod, Plugin::date()]).unwrap_err();
        assert!(matches!(err, Error::PluginOrder { plugin: "Date", .. }));
    }

    #[test]
    fn test_register_git_after_replace_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path().join("a.sealpack")).unwrap();
        let config = BuildConfig::new(dir.path());
        let mut bus = EventBus::new();

        Plugin::Replace.register_with(&mut bus, &config, &archive).unwrap();
        let err = Plugin::git()
            .register_with(&mut bus, &config, &archive)
            .unwrap_err();
        assert!(matches!(err, Error::PluginOrder { plugin: "Git", before: "Replace" }));
    }
}
