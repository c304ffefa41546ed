//! Parser Dispatch Tables
//!
//! Primary events are looked up by code in a fixed array. Generic events
//! live in their own namespace keyed by `(extension opcode, evtype)`.

use std::collections::HashMap;

use tracing::debug;
use x11_dl::xlib::{self, XEvent};

use super::generic::GenericPayload;
use super::record::EventRecord;
use super::EventCode;
use crate::error::EventError;
use crate::session::XConnection;

/// Number of primary event codes the table can hold.
pub const PARSER_CAPACITY: usize = 256;

/// Decoder for a primary event code.
pub type Parser = fn(&dyn XConnection, &XEvent) -> Option<EventRecord>;

/// Decoder for a generic event payload.
pub type GenericParser =
    fn(&dyn XConnection, &GenericPayload) -> Result<Option<EventRecord>, EventError>;

/// Fixed-capacity code → parser table.
pub struct ParserTable {
    parsers: [Option<Parser>; PARSER_CAPACITY],
}

impl ParserTable {
    pub fn new() -> Self {
        Self {
            parsers: [None; PARSER_CAPACITY],
        }
    }

    /// Slot index for `code`.
    ///
    /// Fails for codes the table cannot hold and for `GenericEvent`, which is
    /// always routed through [`GenericParserTable`].
    pub fn check(code: EventCode) -> Result<usize, EventError> {
        if code == xlib::GenericEvent {
            return Err(EventError::GenericPrimary);
        }
        usize::try_from(code)
            .ok()
            .filter(|&index| index < PARSER_CAPACITY)
            .ok_or(EventError::CodeOutOfRange {
                code,
                capacity: PARSER_CAPACITY,
            })
    }

    /// Install the parser for `code`. An occupied slot is never replaced.
    pub fn add_parser(&mut self, code: EventCode, parser: Parser) -> Result<(), EventError> {
        let slot = &mut self.parsers[Self::check(code)?];
        if slot.is_some() {
            return Err(EventError::SlotTaken { code });
        }
        debug!("Installed parser for event code {}", code);
        *slot = Some(parser);
        Ok(())
    }

    pub fn get(&self, code: EventCode) -> Option<Parser> {
        usize::try_from(code)
            .ok()
            .and_then(|index| self.parsers.get(index))
            .copied()
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.parsers.iter().filter(|parser| parser.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ParserTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry of the generic event table.
#[derive(Clone, Copy)]
pub struct GenericEntry {
    pub name: &'static str,
    pub parser: GenericParser,
    /// Skip an event whose `(serial, evtype)` repeats the previous one
    pub dedupe: bool,
}

/// `(extension opcode, evtype)` → parser table.
#[derive(Default)]
pub struct GenericParserTable {
    entries: HashMap<(i32, i32), GenericEntry>,
}

impl GenericParserTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parser(
        &mut self,
        extension: i32,
        evtype: i32,
        entry: GenericEntry,
    ) -> Result<(), EventError> {
        if let Some(existing) = self.entries.get(&(extension, evtype)) {
            if existing.name != entry.name {
                return Err(EventError::Conflict {
                    code: evtype,
                    name: entry.name,
                    existing: existing.name.to_string(),
                });
            }
        }
        debug!(
            "Registered generic event {} (extension {}, evtype {})",
            entry.name, extension, evtype
        );
        self.entries.insert((extension, evtype), entry);
        Ok(())
    }

    pub fn get(&self, extension: i32, evtype: i32) -> Option<&GenericEntry> {
        self.entries.get(&(extension, evtype))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.values().map(|entry| entry.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
