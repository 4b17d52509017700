//! Build-phase event dispatch.
//!
//! Entries added in bulk through
//! [`Archive::set_paths_using_iterator`](crate::Archive::set_paths_using_iterator)
//! are announced to every registered [`Subscriber`] as a [`BeforeSetPath`]
//! event before they reach the manifest. Subscribers may rewrite the
//! entry's content and permissions, or drop the entry with
//! [`BeforeSetPath::skip`].
//!
//! Dispatch order is descending priority, with ties broken by registration
//! order. User plugins subscribe at [`DEFAULT_PRIORITY`]; the built-in
//! [`ReportSubscriber`] uses [`REPORT_PRIORITY`] so it observes the final
//! state of each entry.
//!
//! ```rust
//! use sealpack::event::{BeforeSetPath, EventBus, Subscriber};
//! use sealpack::Result;
//!
//! struct ReadOnly;
//!
//! impl Subscriber for ReadOnly {
//!     fn before_set_path(&mut self, event: &mut BeforeSetPath<'_>) -> Result<()> {
//!         event.entry_mut().set_permissions(0o444);
//!         Ok(())
//!     }
//! }
//!
//! let mut bus = EventBus::new();
//! bus.subscribe(ReadOnly, 0);
//! assert_eq!(bus.len(), 1);
//! ```

use std::fmt;

use crate::plugin::PluginKind;
use crate::{Archive, ArchivePath, ManifestEntry, Result};

/// Priority for user plugins.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Priority for the reporting subscriber.
pub const REPORT_PRIORITY: i32 = -100;

/// Announced once per entry before it is set in the manifest.
pub struct BeforeSetPath<'a> {
    archive: &'a Archive,
    path: ArchivePath,
    entry: ManifestEntry,
    skipped: bool,
}

impl<'a> BeforeSetPath<'a> {
    pub(crate) fn new(archive: &'a Archive, path: ArchivePath, entry: ManifestEntry) -> Self {
        Self {
            archive,
            path,
            entry,
            skipped: false,
        }
    }

    /// The archive the entry is about to be added to.
    pub fn archive(&self) -> &Archive {
        self.archive
    }

    /// The candidate manifest path.
    pub fn path(&self) -> &ArchivePath {
        &self.path
    }

    /// The candidate entry.
    pub fn entry(&self) -> &ManifestEntry {
        &self.entry
    }

    /// Mutable access to the candidate entry.
    pub fn entry_mut(&mut self) -> &mut ManifestEntry {
        &mut self.entry
    }

    /// Drops the entry. Later subscribers are not notified.
    pub fn skip(&mut self) {
        self.skipped = true;
    }

    /// Returns `true` once a subscriber has dropped the entry.
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub(crate) fn into_parts(self) -> (ArchivePath, ManifestEntry, bool) {
        (self.path, self.entry, self.skipped)
    }
}

impl fmt::Debug for BeforeSetPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeforeSetPath")
            .field("path", &self.path)
            .field("entry", &self.entry)
            .field("skipped", &self.skipped)
            .finish()
    }
}

/// Receives [`BeforeSetPath`] events.
pub trait Subscriber {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "subscriber"
    }

    /// Handles one entry. Returning an error aborts the bulk operation.
    fn before_set_path(&mut self, event: &mut BeforeSetPath<'_>) -> Result<()>;
}

struct Registration {
    priority: i32,
    subscriber: Box<dyn Subscriber>,
}

/// Ordered set of subscribers plus a record of which plugins registered them.
#[derive(Default)]
pub struct EventBus {
    registrations: Vec<Registration>,
    plugins: Vec<PluginKind>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber at the given priority.
    pub fn subscribe<S: Subscriber + 'static>(&mut self, subscriber: S, priority: i32) {
        self.subscribe_boxed(Box::new(subscriber), priority);
    }

    /// Adds a boxed subscriber at the given priority.
    pub fn subscribe_boxed(&mut self, subscriber: Box<dyn Subscriber>, priority: i32) {
        let idx = self
            .registrations
            .partition_point(|r| r.priority >= priority);
        log::debug!(
            "subscribing '{}' at priority {} (slot {})",
            subscriber.name(),
            priority,
            idx
        );
        self.registrations.insert(
            idx,
            Registration {
                priority,
                subscriber,
            },
        );
    }

    /// Delivers an event to subscribers until one skips it.
    pub fn dispatch(&mut self, event: &mut BeforeSetPath<'_>) -> Result<()> {
        for registration in &mut self.registrations {
            registration.subscriber.before_set_path(event)?;
            if event.is_skipped() {
                log::debug!(
                    "'{}' skipped by {}",
                    event.path(),
                    registration.subscriber.name()
                );
                break;
            }
        }
        Ok(())
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Subscriber names in dispatch order.
    pub fn subscriber_names(&self) -> Vec<&str> {
        self.registrations
            .iter()
            .map(|r| r.subscriber.name())
            .collect()
    }

    /// Notes that a plugin of `kind` has registered with this bus.
    pub fn record_plugin(&mut self, kind: PluginKind) {
        self.plugins.push(kind);
    }

    /// Returns `true` if a plugin of `kind` has registered.
    pub fn has_plugin(&self, kind: PluginKind) -> bool {
        self.plugins.contains(&kind)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "subscribers",
                &self
                    .registrations
                    .iter()
                    .map(|r| (r.subscriber.name(), r.priority))
                    .collect::<Vec<_>>(),
            )
            .field("plugins", &self.plugins)
            .finish()
    }
}

/// Logs `+ <path>` for every entry that reaches the manifest.
#[derive(Debug, Default)]
pub struct ReportSubscriber {
    count: usize,
}

impl ReportSubscriber {
    /// Creates a reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries reported so far.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Subscriber for ReportSubscriber {
    fn name(&self) -> &str {
        "report"
    }

    fn before_set_path(&mut self, event: &mut BeforeSetPath<'_>) -> Result<()> {
        self.count += 1;
        log::info!("+ {}", event.path());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        label: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
        skip: bool,
    }

    impl Subscriber for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        fn before_set_path(&mut self, event: &mut BeforeSetPath<'_>) -> Result<()> {
            self.log.borrow_mut().push(self.label);
            if self.skip {
                event.skip();
            }
            Ok(())
        }
    }

    fn recorder(label: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> Recorder {
        Recorder {
            label,
            log: Rc::clone(log),
            skip: false,
        }
    }

    fn scratch() -> (tempfile::TempDir, Archive) {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path().join("t.sealpack")).unwrap();
        (dir, archive)
    }

    #[test]
    fn test_priority_then_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(recorder("low", &log), -100);
        bus.subscribe(recorder("first", &log), 0);
        bus.subscribe(recorder("high", &log), 10);
        bus.subscribe(recorder("second", &log), 0);
        assert_eq!(bus.subscriber_names(), vec!["high", "first", "second", "low"]);

        let (_dir, archive) = scratch();
        let mut event = BeforeSetPath::new(
            &archive,
            ArchivePath::new("a").unwrap(),
            ManifestEntry::file("x"),
        );
        bus.dispatch(&mut event).unwrap();
        assert_eq!(*log.borrow(), vec!["high", "first", "second", "low"]);
    }

    #[test]
    fn test_skip_stops_dispatch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let mut dropper = recorder("dropper", &log);
        dropper.skip = true;
        bus.subscribe(dropper, 0);
        bus.subscribe(recorder("report", &log), REPORT_PRIORITY);

        let (_dir, archive) = scratch();
        let mut event = BeforeSetPath::new(
            &archive,
            ArchivePath::new("a").unwrap(),
            ManifestEntry::file("x"),
        );
        bus.dispatch(&mut event).unwrap();
        assert!(event.is_skipped());
        assert_eq!(*log.borrow(), vec!["dropper"]);
    }

    #[test]
    fn test_error_propagates() {
        struct Failing;
        impl Subscriber for Failing {
            fn before_set_path(&mut self, _event: &mut BeforeSetPath<'_>) -> Result<()> {
                Err(Error::configuration("failing", "boom"))
            }
        }

        let mut bus = EventBus::new();
        bus.subscribe(Failing, 0);
        let (_dir, archive) = scratch();
        let mut event = BeforeSetPath::new(
            &archive,
            ArchivePath::new("a").unwrap(),
            ManifestEntry::file("x"),
        );
        assert!(bus.dispatch(&mut event).is_err());
    }

    #[test]
    fn test_plugin_record() {
        let mut bus = EventBus::new();
        assert!(!bus.has_plugin(PluginKind::Replace));
        bus.record_plugin(PluginKind::Replace);
        assert!(bus.has_plugin(PluginKind::Replace));
    }

    #[test]
    fn test_report_counts_entries() {
        let mut report = ReportSubscriber::new();
        let (_dir, archive) = scratch();
        let mut event = BeforeSetPath::new(
            &archive,
            ArchivePath::new("a").unwrap(),
            ManifestEntry::file("x"),
        );
        report.before_set_path(&mut event).unwrap();
        assert_eq!(report.count(), 1);
        assert!(!event.is_skipped());
    }
}
