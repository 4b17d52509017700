//! Inclusion and exclusion filtering.
//!
//! An entry is dropped when it matches an exclusion rule and no inclusion
//! rule. Rules match by file name, by exact archive path, by a pattern
//! searched anywhere in the archive path, or by a subtree.
//!
//! `name` and `path` rules match one entry each. Excluding a directory that
//! way drops only the directory entry; its files are still offered and
//! kept unless they match a rule themselves. To drop everything below a
//! directory use a `tree` rule (`{"tree": ["vendor/cache"]}`) or, for a
//! directory name at any depth, a pattern such as `(^|/)\.git(/|$)`.

use regex::Regex;
use serde::Deserialize;

use super::compile_pattern;
use crate::builder::BuildConfig;
use crate::event::{BeforeSetPath, DEFAULT_PRIORITY, EventBus, Subscriber};
use crate::{ArchivePath, Error, Result};

const PLUGIN: &str = "Filter";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSettings {
    #[serde(default)]
    name: Vec<String>,
    #[serde(default)]
    path: Vec<String>,
    #[serde(default)]
    pattern: Vec<String>,
    #[serde(default)]
    tree: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterSettings {
    #[serde(default)]
    exclude: RuleSettings,
    #[serde(default)]
    include: RuleSettings,
}

/// Compiled filter rules.
#[derive(Debug, Default)]
pub struct Rules {
    names: Vec<String>,
    paths: Vec<ArchivePath>,
    patterns: Vec<Regex>,
    trees: Vec<ArchivePath>,
}

impl Rules {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches entries whose last path component equals `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Matches the entry at exactly `path`.
    pub fn path(mut self, path: &str) -> Result<Self> {
        let path = ArchivePath::new(path)
            .map_err(|e| Error::configuration(PLUGIN, e.to_string()))?;
        self.paths.push(path);
        Ok(self)
    }

    /// Matches entries whose path contains a match for `pattern`.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        self.patterns.push(compile_pattern(PLUGIN, pattern)?);
        Ok(self)
    }

    /// Matches the entry at `root` and every entry below it.
    pub fn tree(mut self, root: &str) -> Result<Self> {
        let root = ArchivePath::new(root)
            .map_err(|e| Error::configuration(PLUGIN, e.to_string()))?;
        self.trees.push(root);
        Ok(self)
    }

    /// Returns `true` if `path` matches any rule.
    pub fn matches(&self, path: &ArchivePath) -> bool {
        self.names.iter().any(|name| name == path.file_name())
            || self.paths.iter().any(|p| p == path)
            || self.patterns.iter().any(|re| re.is_match(path.as_str()))
            || self.trees.iter().any(|root| path.starts_with(root.as_str()))
    }

    fn from_settings(settings: RuleSettings) -> Result<Self> {
        let mut rules = Rules::new();
        for name in settings.name {
            rules = rules.name(name);
        }
        for path in &settings.path {
            rules = rules.path(path)?;
        }
        for pattern in &settings.pattern {
            rules = rules.pattern(pattern)?;
        }
        for root in &settings.tree {
            rules = rules.tree(root)?;
        }
        Ok(rules)
    }
}

/// Skips excluded entries unless they are explicitly included.
#[derive(Debug, Default)]
pub struct FilterSubscriber {
    exclude: Rules,
    include: Rules,
}

impl FilterSubscriber {
    /// Creates a filter from exclusion and inclusion rules.
    pub fn new(exclude: Rules, include: Rules) -> Self {
        Self { exclude, include }
    }

    /// Returns `true` if `path` would be dropped.
    pub fn is_excluded(&self, path: &ArchivePath) -> bool {
        self.exclude.matches(path) && !self.include.matches(path)
    }
}

impl Subscriber for FilterSubscriber {
    fn name(&self) -> &str {
        "filter"
    }

    fn before_set_path(&mut self, event: &mut BeforeSetPath<'_>) -> Result<()> {
        if self.is_excluded(event.path()) {
            event.skip();
        }
        Ok(())
    }
}

pub(super) fn register(bus: &mut EventBus, config: &BuildConfig) -> Result<()> {
    let settings: FilterSettings = config.settings.require("filter")?;
    let subscriber = FilterSubscriber::new(
        Rules::from_settings(settings.exclude)?,
        Rules::from_settings(settings.include)?,
    );
    bus.subscribe(subscriber, DEFAULT_PRIORITY);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ArchivePath {
        ArchivePath::new(s).unwrap()
    }

    #[test]
    fn test_include_overrides_exclude() {
        let filter = FilterSubscriber::new(
            Rules::new().pattern("/test/").unwrap(),
            Rules::new().name("keep_test.php"),
        );
        assert!(!filter.is_excluded(&path("src/keep_test.php")));
        assert!(filter.is_excluded(&path("src/other_test.php")));
        assert!(!filter.is_excluded(&path("src/main.php")));
    }

    #[test]
    fn test_exact_path_rules() {
        let filter = FilterSubscriber::new(
            Rules::new().path("/build/cache").unwrap(),
            Rules::new(),
        );
        assert!(filter.is_excluded(&path("build/cache")));
        assert!(!filter.is_excluded(&path("build/cache/x")));
        assert!(!filter.is_excluded(&path("other/build/cache")));
    }

    #[test]
    fn test_name_rules_ignore_directories() {
        let rules = Rules::new().name("README");
        assert!(rules.matches(&path("docs/README")));
        assert!(!rules.matches(&path("README/notes")));
    }

    #[test]
    fn test_settings_parse() {
        let settings: FilterSettings = serde_json::from_value(serde_json::json!({
            "exclude": {"pattern": ["\\.bak$"], "name": [".git"]},
            "include": {"path": ["keep.bak"]}
        }))
        .unwrap();
        let filter = FilterSubscriber::new(
            Rules::from_settings(settings.exclude).unwrap(),
            Rules::from_settings(settings.include).unwrap(),
        );
        assert!(filter.is_excluded(&path("a/b.bak")));
        assert!(!filter.is_excluded(&path("keep.bak")));
        assert!(filter.is_excluded(&path(".git")));
    }

    #[test]
    fn test_directory_rules_do_not_reach_descendants() {
        let by_name = FilterSubscriber::new(Rules::new().name(".git"), Rules::new());
        assert!(by_name.is_excluded(&path(".git")));
        assert!(!by_name.is_excluded(&path(".git/HEAD")));

        let subtree = FilterSubscriber::new(
            Rules::new().pattern(r"(^|/)\.git(/|$)").unwrap(),
            Rules::new(),
        );
        assert!(subtree.is_excluded(&path(".git/HEAD")));
        assert!(subtree.is_excluded(&path("vendor/lib/.git/objects/ab")));
        assert!(!subtree.is_excluded(&path("src/.gitignore")));
    }

    #[test]
    fn test_tree_rules() {
        let settings: FilterSettings = serde_json::from_value(serde_json::json!({
            "exclude": {"tree": ["vendor/cache"]},
            "include": {"path": ["vendor/cache/KEEP"]}
        }))
        .unwrap();
        let filter = FilterSubscriber::new(
            Rules::from_settings(settings.exclude).unwrap(),
            Rules::from_settings(settings.include).unwrap(),
        );
        assert!(filter.is_excluded(&path("vendor/cache")));
        assert!(filter.is_excluded(&path("vendor/cache/a/b.bin")));
        assert!(!filter.is_excluded(&path("vendor/cache/KEEP")));
        assert!(!filter.is_excluded(&path("vendor/cache2/x")));
        assert!(!filter.is_excluded(&path("vendor")));
    }

    #[test]
    fn test_bad_pattern_is_configuration_error() {
        let err = Rules::new().pattern("[").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
