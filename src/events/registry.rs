//! Event Type Registry
//!
//! Bidirectional map between event codes and their names, plus the signal
//! names the router uses to tell "this window" notifications apart from
//! "one of my children" notifications.

use std::collections::HashMap;

use tracing::debug;

use super::EventCode;
use crate::error::EventError;

/// One registered event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTypeEntry {
    pub code: EventCode,
    pub name: &'static str,
    /// Signal emitted on the window the event is about ("" for none)
    pub signal_name: &'static str,
    /// Signal emitted on the parent when the event concerns a child ("" for none)
    pub child_signal_name: &'static str,
}

/// Code ⇄ name registry.
///
/// Conflicting registrations are rejected: a code keeps its first name for
/// the lifetime of the connection. Re-registering an identical entry is a no-op.
#[derive(Debug, Default)]
pub struct EventTypeRegistry {
    by_code: HashMap<EventCode, EventTypeEntry>,
    by_name: HashMap<&'static str, EventCode>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event type.
    pub fn register(
        &mut self,
        code: EventCode,
        name: &'static str,
        signal_name: &'static str,
        child_signal_name: &'static str,
    ) -> Result<(), EventError> {
        let entry = EventTypeEntry {
            code,
            name,
            signal_name,
            child_signal_name,
        };

        if let Some(existing) = self.by_code.get(&code) {
            if *existing == entry {
                return Ok(());
            }
            return Err(EventError::Conflict {
                code,
                name,
                existing: existing.name.to_string(),
            });
        }
        if let Some(&other) = self.by_name.get(name) {
            return Err(EventError::Conflict {
                code,
                name,
                existing: format!("code {other}"),
            });
        }

        debug!("Registered event type {} = {}", code, name);
        self.by_code.insert(code, entry);
        self.by_name.insert(name, code);
        Ok(())
    }

    pub fn name_of(&self, code: EventCode) -> Option<&'static str> {
        self.by_code.get(&code).map(|entry| entry.name)
    }

    pub fn code_of(&self, name: &str) -> Option<EventCode> {
        self.by_name.get(name).copied()
    }

    pub fn entry(&self, code: EventCode) -> Option<&EventTypeEntry> {
        self.by_code.get(&code)
    }

    /// All registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_name.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
