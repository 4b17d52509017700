//! Content substitution.
//!
//! Rules come in three scopes and always apply in this order:
//!
//! 1. `all`: every file entry.
//! 2. `path`: the entry at an exact archive path.
//! 3. `pattern`: entries whose path matches a pattern.
//!
//! Within a scope rules apply in the order they were configured, and each
//! rule replaces every match of its pattern. Replacement strings use
//! `regex` expansion syntax (`$1`, `${name}`).
//!
//! A replacement may also be a template with one `%s` slot for the Git and
//! Date plugins to fill; see [`fill_slot`].
//!
//! A file is read only when some rule's scope covers its path, and it is
//! rewritten only when a rule changed its bytes. A rewritten entry holds
//! the new bytes in memory until commit, so a broad `all` rule over a
//! large tree costs memory in proportion to what it rewrites. Entries left
//! unchanged stay file-backed and are streamed at commit.

use std::borrow::Cow;

use regex::Regex;
use regex::bytes::Regex as BytesRegex;
use serde::{Deserialize, Serialize};

use super::{compile_pattern, pattern_source};
use crate::builder::BuildConfig;
use crate::event::{BeforeSetPath, DEFAULT_PRIORITY, EventBus, Subscriber};
use crate::{ArchivePath, Error, Result};

const PLUGIN: &str = "Replace";

/// The `replace` settings namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceSettings {
    /// Rules for every file entry.
    #[serde(default)]
    pub all: Vec<GlobalRule>,
    /// Rules keyed by exact archive path.
    #[serde(default)]
    pub path: Vec<ScopedRule>,
    /// Rules keyed by a path pattern.
    #[serde(default)]
    pub pattern: Vec<ScopedRule>,
}

/// A rule in the `all` scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRule {
    /// Content pattern.
    pub pattern: String,
    /// Replacement text.
    #[serde(default)]
    pub replacement: String,
}

/// A rule in the `path` or `pattern` scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedRule {
    /// Exact path or path pattern, depending on scope.
    pub path: String,
    /// Content pattern.
    pub pattern: String,
    /// Replacement text.
    #[serde(default)]
    pub replacement: String,
}

impl ReplaceSettings {
    fn replacements_for<'a>(&'a mut self, pattern: &'a str) -> impl Iterator<Item = &'a mut String> {
        let all = self
            .all
            .iter_mut()
            .filter(move |rule| rule.pattern == pattern)
            .map(|rule| &mut rule.replacement);
        let scoped = self
            .path
            .iter_mut()
            .chain(self.pattern.iter_mut())
            .filter(move |rule| rule.pattern == pattern)
            .map(|rule| &mut rule.replacement);
        all.chain(scoped)
    }
}

/// Fills the `%s` slot of every rule whose pattern is exactly `pattern`.
///
/// `value` is inserted literally. Returns the number of rules filled.
///
/// # Errors
///
/// Returns [`Error::Configuration`] naming `plugin` if a matched rule's
/// replacement does not contain exactly one `%s`.
pub fn fill_slot(
    plugin: &str,
    settings: &mut ReplaceSettings,
    pattern: &str,
    value: &str,
) -> Result<usize> {
    let mut filled = 0;
    for replacement in settings.replacements_for(pattern) {
        *replacement = fill_template(plugin, replacement, value)?;
        filled += 1;
    }
    if filled > 0 {
        log::debug!("{} filled {} rule(s) for {}", plugin, filled, pattern);
    }
    Ok(filled)
}

/// Expands a one-slot template. `%%` is a literal percent sign.
fn fill_template(plugin: &str, template: &str, value: &str) -> Result<String> {
    let mut out = String::with_capacity(template.len() + value.len());
    let mut slots = 0;
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                slots += 1;
                out.push_str(&value.replace('$', "$$"));
            }
            other => {
                return Err(Error::configuration(
                    plugin,
                    format!(
                        "unsupported directive '%{}' in replacement '{}'",
                        other.map(String::from).unwrap_or_default(),
                        template
                    ),
                ));
            }
        }
    }
    if slots != 1 {
        return Err(Error::configuration(
            plugin,
            format!(
                "replacement '{}' must contain exactly one %s slot, found {}",
                template, slots
            ),
        ));
    }
    Ok(out)
}

#[derive(Debug)]
enum Scope {
    All,
    Path(ArchivePath),
    Pattern(Regex),
}

impl Scope {
    fn applies_to(&self, path: &ArchivePath) -> bool {
        match self {
            Scope::All => true,
            Scope::Path(target) => target == path,
            Scope::Pattern(re) => re.is_match(path.as_str()),
        }
    }
}

#[derive(Debug)]
struct Rule {
    scope: Scope,
    search: BytesRegex,
    replacement: Vec<u8>,
}

/// Rewrites file contents with ordered regex rules.
#[derive(Debug, Default)]
pub struct ReplaceSubscriber {
    rules: Vec<Rule>,
}

impl ReplaceSubscriber {
    /// Creates a subscriber with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a subscriber from settings, scope by scope.
    pub fn from_settings(settings: &ReplaceSettings) -> Result<Self> {
        let mut subscriber = Self::new();
        for rule in &settings.all {
            subscriber.replace_all(&rule.pattern, &rule.replacement)?;
        }
        for rule in &settings.path {
            subscriber.replace_by_path(&rule.path, &rule.pattern, &rule.replacement)?;
        }
        for rule in &settings.pattern {
            subscriber.replace_by_pattern(&rule.path, &rule.pattern, &rule.replacement)?;
        }
        Ok(subscriber)
    }

    /// Adds a rule for every file.
    pub fn replace_all(&mut self, pattern: &str, replacement: &str) -> Result<()> {
        self.push(Scope::All, pattern, replacement)
    }

    /// Adds a rule for the file at `path`.
    pub fn replace_by_path(&mut self, path: &str, pattern: &str, replacement: &str) -> Result<()> {
        let path =
            ArchivePath::new(path).map_err(|e| Error::configuration(PLUGIN, e.to_string()))?;
        self.push(Scope::Path(path), pattern, replacement)
    }

    /// Adds a rule for files whose path matches `path_pattern`.
    pub fn replace_by_pattern(
        &mut self,
        path_pattern: &str,
        pattern: &str,
        replacement: &str,
    ) -> Result<()> {
        let scope = Scope::Pattern(compile_pattern(PLUGIN, path_pattern)?);
        self.push(scope, pattern, replacement)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies every rule relevant to `path` to `data`.
    pub fn apply<'a>(&self, path: &ArchivePath, data: &'a [u8]) -> Cow<'a, [u8]> {
        let mut data = Cow::Borrowed(data);
        for rule in self.rules.iter().filter(|r| r.scope.applies_to(path)) {
            let replaced = match rule.search.replace_all(&data, rule.replacement.as_slice()) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if let Some(replaced) = replaced {
                data = Cow::Owned(replaced);
            }
        }
        data
    }

    fn push(&mut self, scope: Scope, pattern: &str, replacement: &str) -> Result<()> {
        let source = pattern_source(pattern);
        let search = BytesRegex::new(&source).map_err(|e| {
            Error::configuration(PLUGIN, format!("invalid pattern {}: {}", pattern, e))
        })?;
        self.rules.push(Rule {
            scope,
            search,
            replacement: replacement.as_bytes().to_vec(),
        });
        Ok(())
    }
}

impl Subscriber for ReplaceSubscriber {
    fn name(&self) -> &str {
        "replace"
    }

    fn before_set_path(&mut self, event: &mut BeforeSetPath<'_>) -> Result<()> {
        if !event.entry().is_file() || !self.rules.iter().any(|r| r.scope.applies_to(event.path())) {
            return Ok(());
        }
        let original = event.entry().contents()?;
        if let Cow::Owned(replaced) = self.apply(event.path(), &original) {
            log::debug!("replaced content in '{}'", event.path());
            event.entry_mut().set_content(replaced);
        }
        Ok(())
    }
}

pub(super) fn register(bus: &mut EventBus, config: &BuildConfig) -> Result<()> {
    let settings: ReplaceSettings = config.settings.typed("replace")?.unwrap_or_default();
    let subscriber = ReplaceSubscriber::from_settings(&settings)?;
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
    fn test_fill_template() {
        assert_eq!(fill_template("t", "v%s", "1.0").unwrap(), "v1.0");
        assert_eq!(fill_template("t", "100%% %s", "x").unwrap(), "100% x");
        assert_eq!(fill_template("t", "%s", "$1").unwrap(), "$$1");
        assert!(fill_template("t", "none", "x").is_err());
        assert!(fill_template("t", "%s-%s", "x").is_err());
        assert!(fill_template("t", "%d", "x").is_err());
        assert!(fill_template("t", "%s%", "x").is_err());
    }

    #[test]
    fn test_fill_slot_touches_every_scope() {
        let mut settings = ReplaceSettings {
            all: vec![GlobalRule {
                pattern: "@v@".into(),
                replacement: "%s".into(),
            }],
            path: vec![ScopedRule {
                path: "a".into(),
                pattern: "@v@".into(),
                replacement: "v%s".into(),
            }],
            pattern: vec![ScopedRule {
                path: "b".into(),
                pattern: "@other@".into(),
                replacement: "%s".into(),
            }],
        };
        assert_eq!(fill_slot("Git", &mut settings, "@v@", "9").unwrap(), 2);
        assert_eq!(settings.all[0].replacement, "9");
        assert_eq!(settings.path[0].replacement, "v9");
        assert_eq!(settings.pattern[0].replacement, "%s");
    }

    #[test]
    fn test_scope_order() {
        let settings = ReplaceSettings {
            all: vec![GlobalRule {
                pattern: "name".into(),
                replacement: "a".into(),
            }],
            path: vec![ScopedRule {
                path: "x.txt".into(),
                pattern: "a".into(),
                replacement: "b".into(),
            }],
            pattern: vec![ScopedRule {
                path: "\\.txt$".into(),
                pattern: "b".into(),
                replacement: "c".into(),
            }],
        };
        let ordered = ReplaceSubscriber::from_settings(&settings).unwrap();
        assert_eq!(ordered.apply(&path("x.txt"), b"name").as_ref(), b"c");
        assert_eq!(ordered.apply(&path("y.txt"), b"name").as_ref(), b"a");
        assert_eq!(ordered.apply(&path("y.md"), b"name").as_ref(), b"a");
        assert_eq!(ordered.len(), 3);
    }

    #[test]
    fn test_untouched_content_is_borrowed() {
        let mut subscriber = ReplaceSubscriber::new();
        subscriber.replace_all("zzz", "y").unwrap();
        assert!(matches!(subscriber.apply(&path("f"), b"abc"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_only_changed_entries_leave_disk() {
        use crate::content::ContentSource;
        use crate::event::BeforeSetPath;
        use crate::{Archive, ManifestEntry};

        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path().join("t.sealpack")).unwrap();
        std::fs::write(dir.path().join("hit.txt"), "v@version@").unwrap();
        std::fs::write(dir.path().join("miss.txt"), "plain").unwrap();

        let mut subscriber = ReplaceSubscriber::new();
        subscriber.replace_all("@version@", "1.2").unwrap();

        let mut entry_for = |name: &str| {
            let source = ContentSource::file(dir.path().join(name));
            let mut event =
                BeforeSetPath::new(&archive, path(name), ManifestEntry::file(source));
            subscriber.before_set_path(&mut event).unwrap();
            event.entry().clone()
        };

        let hit = entry_for("hit.txt");
        assert!(matches!(hit.content(), Some(ContentSource::Memory(_))));
        assert_eq!(hit.contents().unwrap(), b"v1.2");
        let miss = entry_for("miss.txt");
        assert!(matches!(miss.content(), Some(ContentSource::File(_))));
    }

    #[test]
    fn test_binary_content_tolerated() {
        let mut subscriber = ReplaceSubscriber::new();
        subscriber.replace_all("@x@", "ok").unwrap();
        let data = [0xff, 0xfe, b'@', b'x', b'@', 0x00];
        assert_eq!(
            subscriber.apply(&path("bin"), &data).as_ref(),
            &[0xff, 0xfe, b'o', b'k', 0x00]
        );
    }

    #[test]
    fn test_settings_defaults() {
        let settings: ReplaceSettings = serde_json::from_value(serde_json::json!({
            "all": [{"pattern": "x"}]
        }))
        .unwrap();
        assert_eq!(settings.all[0].replacement, "");
        assert!(settings.path.is_empty());
    }
}
