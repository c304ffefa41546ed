//! Error types for event registration and decoding.

use thiserror::Error;

use crate::events::EventCode;

/// Errors raised by the event layer.
///
/// Only the configuration variants and [`EventError::Payload`] ever cross the
/// dispatch boundary. The others are logged where they happen and turned into
/// `None` (or an empty string for atom names).
#[derive(Debug, Error)]
pub enum EventError {
    /// Extension missing or its version query failed
    #[error("extension {0} is not available")]
    ExtensionUnavailable(&'static str),

    /// Field values that cannot come from a well-behaved server
    #[error("malformed {kind} event: {reason}")]
    Malformed { kind: &'static str, reason: String },

    /// Atom to text resolution failed
    #[error("failed to resolve atom {atom}: {reason}")]
    RoundTrip { atom: u64, reason: String },

    /// Parser registered for a code the table cannot hold
    #[error("event code {code} is outside the parser table (capacity {capacity})")]
    CodeOutOfRange { code: EventCode, capacity: usize },

    /// Parser table slot already holds a parser
    #[error("event code {code} already has a parser")]
    SlotTaken { code: EventCode },

    /// GenericEvent is routed through the extension table, never directly
    #[error("GenericEvent cannot have a primary parser")]
    GenericPrimary,

    /// Code or name already registered with a different counterpart
    #[error("cannot register {name} as event code {code}: already taken by {existing}")]
    Conflict {
        code: EventCode,
        name: &'static str,
        existing: String,
    },

    /// Generic event sub-parser failure
    #[error("failed to decode generic event {evtype} of extension {extension}: {reason}")]
    Payload {
        extension: i32,
        evtype: i32,
        reason: String,
    },
}

impl EventError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }

    /// Whether this error indicates a startup defect rather than bad input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::CodeOutOfRange { .. }
                | Self::SlotTaken { .. }
                | Self::GenericPrimary
                | Self::Conflict { .. }
        )
    }
}
