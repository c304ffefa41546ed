//! Debug Event Filter
//!
//! Chooses which dispatched events are logged verbosely. The filter is
//! parsed from a comma-separated list such as `*,-MotionNotify` and never
//! affects what dispatch returns.

use std::collections::BTreeSet;

use tracing::{debug, warn};

/// Include/exclude sets of event names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl DebugFilter {
    /// Parse a filter string against the set of known event names.
    ///
    /// `*` and `all` stand for every known name, a leading `-` excludes.
    /// Unknown names are reported and skipped.
    pub fn parse<'a>(text: &str, known: impl IntoIterator<Item = &'a str>) -> Self {
        let known: BTreeSet<&str> = known.into_iter().collect();
        let mut filter = Self::default();

        for entry in text.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (target, name) = match entry.strip_prefix('-') {
                Some(name) => (&mut filter.exclude, name.trim()),
                None => (&mut filter.include, entry),
            };
            if name == "*" || name == "all" {
                target.extend(known.iter().map(|name| name.to_string()));
            } else if known.contains(name) {
                target.insert(name.to_string());
            } else {
                warn!("Unknown event name in debug filter: {:?}", name);
            }
        }

        if !filter.include.is_empty() {
            debug!(
                "Debug logging for {} event types ({} excluded)",
                filter.include.len(),
                filter.exclude.len()
            );
        }
        filter
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.include.contains(name) && !self.exclude.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }
}
