//! Event Dispatch
//!
//! Turns native X events into [`EventRecord`]s. One [`EventDispatcher`] is
//! built per connection once the extensions have been probed; it owns the
//! type registry, both parser tables and the debug filter.

mod decode;
mod extension;
pub mod filter;
pub mod generic;
pub mod native;
pub mod record;
pub mod registry;
pub mod table;
#[cfg(test)]
pub(crate) mod testing;

use tracing::{debug, info, trace};
use x11_dl::xlib::{self, XAnyEvent, XEvent};

use crate::error::EventError;
use crate::probe::{Extension, ExtensionSet};
use crate::session::XConnection;

pub use filter::DebugFilter;
pub use generic::{GenericDispatcher, GenericPayload, PayloadGuard};
pub use record::{EventDetails, EventRecord, HierarchyDevice, Rect};
pub use registry::{EventTypeEntry, EventTypeRegistry};
pub use table::{GenericParser, Parser, ParserTable, PARSER_CAPACITY};

/// Xlib event type code.
pub type EventCode = i32;

/// Synthetic events decoded anyway. ICCCM selection replies and window
/// manager messages always arrive through SendEvent.
const SYNTHETIC_ALLOWED: [EventCode; 4] = [
    xlib::ClientMessage,
    xlib::MapNotify,
    xlib::UnmapNotify,
    xlib::SelectionNotify,
];

/// What got registered for one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRegistration {
    pub extension: Extension,
    /// `None` when the extension is unavailable
    pub event_base: Option<i32>,
    pub major_opcode: Option<i32>,
    pub registered_codes: Vec<EventCode>,
}

/// A host-supplied primary parser.
struct CustomKind {
    code: EventCode,
    name: &'static str,
    signal_name: &'static str,
    child_signal_name: &'static str,
    parser: Parser,
}

/// Collects the registration inputs for an [`EventDispatcher`].
#[derive(Default)]
pub struct EventDispatcherBuilder {
    extensions: ExtensionSet,
    custom: Vec<CustomKind>,
    debug_events: String,
}

impl EventDispatcherBuilder {
    /// Register the events of every extension present in `extensions`.
    pub fn extensions(mut self, extensions: &ExtensionSet) -> Self {
        self.extensions = extensions.clone();
        self
    }

    /// Add a parser for an event kind this crate does not know about.
    pub fn parser(
        mut self,
        code: EventCode,
        name: &'static str,
        signal_name: &'static str,
        child_signal_name: &'static str,
        parser: Parser,
    ) -> Self {
        self.custom.push(CustomKind {
            code,
            name,
            signal_name,
            child_signal_name,
            parser,
        });
        self
    }

    /// Debug filter string, e.g. `*,-MotionNotify`.
    pub fn debug_events(mut self, filter: impl Into<String>) -> Self {
        self.debug_events = filter.into();
        self
    }

    /// Populate the registry and parser tables.
    ///
    /// Any error here is a configuration defect (a code collision or an
    /// event base that pushes codes past the table) and should abort startup.
    pub fn build(self) -> Result<EventDispatcher, EventError> {
        let mut dispatcher = EventDispatcher {
            registry: EventTypeRegistry::new(),
            parsers: ParserTable::new(),
            generic: GenericDispatcher::new(),
            filter: DebugFilter::default(),
            extensions: Vec::new(),
        };

        for kind in decode::CORE_KINDS {
            dispatcher.add_kind(
                kind.code,
                kind.name,
                kind.signal_name,
                kind.child_signal_name,
                kind.parser,
            )?;
        }

        for extension in Extension::ALL {
            let info = self.extensions.get(extension).copied();
            let mut registration = ExtensionRegistration {
                extension,
                event_base: info.map(|info| info.event_base),
                major_opcode: info.map(|info| info.major_opcode),
                registered_codes: Vec::new(),
            };
            if let Some(info) = info {
                for kind in extension::kinds(extension) {
                    let code = info.event_base + kind.offset;
                    dispatcher.add_kind(
                        code,
                        kind.name,
                        kind.signal_name,
                        kind.child_signal_name,
                        kind.parser,
                    )?;
                    registration.registered_codes.push(code);
                }
                if extension == Extension::XInput {
                    dispatcher.generic.register_xinput(info.major_opcode)?;
                }
                debug!(
                    "{} events registered at base {}: {:?}",
                    extension, info.event_base, registration.registered_codes
                );
            }
            dispatcher.extensions.push(registration);
        }

        for kind in self.custom {
            dispatcher.add_kind(
                kind.code,
                kind.name,
                kind.signal_name,
                kind.child_signal_name,
                kind.parser,
            )?;
        }

        dispatcher.filter = DebugFilter::parse(&self.debug_events, dispatcher.known_names());
        info!(
            "Event dispatcher ready: {} event types, {} generic",
            dispatcher.registry.len(),
            dispatcher.generic.table().len()
        );
        Ok(dispatcher)
    }
}

/// Per-connection event decoder.
pub struct EventDispatcher {
    registry: EventTypeRegistry,
    parsers: ParserTable,
    generic: GenericDispatcher,
    filter: DebugFilter,
    extensions: Vec<ExtensionRegistration>,
}

impl EventDispatcher {
    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::default()
    }

    fn add_kind(
        &mut self,
        code: EventCode,
        name: &'static str,
        signal_name: &'static str,
        child_signal_name: &'static str,
        parser: Parser,
    ) -> Result<(), EventError> {
        // A code the table cannot hold never reaches the registry.
        ParserTable::check(code)?;
        if self.registry.entry(code).is_some() {
            // Identical entries are a no-op and keep the installed parser.
            return self.registry.register(code, name, signal_name, child_signal_name);
        }
        self.registry.register(code, name, signal_name, child_signal_name)?;
        self.parsers.add_parser(code, parser)
    }

    /// Decode one event.
    ///
    /// `Ok(None)` covers unknown codes, synthetic events outside the
    /// allow-list and anything a parser rejected. Only a generic sub-parser
    /// failure is an error.
    pub fn dispatch(
        &mut self,
        conn: &dyn XConnection,
        event: &XEvent,
    ) -> Result<Option<EventRecord>, EventError> {
        let any: &XAnyEvent = event.as_ref();
        let code = any.type_;

        if any.send_event != 0 && !SYNTHETIC_ALLOWED.contains(&code) {
            trace!("Ignoring synthetic event {} #{}", code, any.serial);
            return Ok(None);
        }

        let record = if code == xlib::GenericEvent {
            self.generic.dispatch(conn, event)?
        } else {
            let Some(parser) = self.parsers.get(code) else {
                trace!("No parser for event code {}", code);
                return Ok(None);
            };
            parser(conn, event).map(|mut record| {
                if let Some(name) = self.registry.name_of(code) {
                    record.name = name;
                }
                record
            })
        };

        if let Some(record) = &record {
            if self.filter.is_enabled(record.name) {
                info!("{:?}", record);
            } else {
                trace!("{}", record);
            }
        }
        Ok(record)
    }

    /// Every event name this dispatcher can produce.
    pub fn known_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .registry
            .names()
            .chain(self.generic.table().names())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn registry(&self) -> &EventTypeRegistry {
        &self.registry
    }

    pub fn filter(&self) -> &DebugFilter {
        &self.filter
    }

    /// Registration outcome for each extension, available or not.
    pub fn extensions(&self) -> &[ExtensionRegistration] {
        &self.extensions
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use x11_dl::xinput2;
    use x11_dl::xlib::{XClientMessageEvent, XConfigureEvent, XMapEvent};

    use super::*;
    use crate::events::testing::{capture_warnings, generic_event, FakeConnection};
    use crate::probe::ExtensionInfo;

    fn probed() -> ExtensionSet {
        let mut set = ExtensionSet::new();
        for (extension, event_base, major_opcode) in [
            (Extension::Xkb, 85, 135),
            (Extension::XFixes, 87, 138),
            (Extension::Damage, 91, 143),
            (Extension::Shape, 64, 129),
            (Extension::XInput, 0, 131),
            (Extension::RandR, 89, 140),
        ] {
            set.insert(
                extension,
                ExtensionInfo {
                    event_base,
                    major_opcode,
                    version: (1, 0),
                },
            );
        }
        set
    }

    fn map_notify(send_event: bool) -> XEvent {
        XEvent::from(XMapEvent {
            type_: xlib::MapNotify,
            serial: 12,
            send_event: send_event.into(),
            display: ptr::null_mut(),
            event: testing::ROOT,
            window: 0x400001,
            override_redirect: 0,
        })
    }

    fn configure_notify(send_event: bool) -> XEvent {
        XEvent::from(XConfigureEvent {
            type_: xlib::ConfigureNotify,
            serial: 13,
            send_event: send_event.into(),
            display: ptr::null_mut(),
            event: 0x400001,
            window: 0x400001,
            x: 0,
            y: 0,
            width: 100,
            height: 100,
            border_width: 0,
            above: 0,
            override_redirect: 0,
        })
    }

    fn dummy(_: &dyn XConnection, _: &XEvent) -> Option<EventRecord> {
        None
    }

    #[test]
    fn names_round_trip_for_every_registered_code() {
        let dispatcher = EventDispatcher::builder().extensions(&probed()).build().unwrap();
        let registry = dispatcher.registry();
        for name in registry.names() {
            let code = registry.code_of(name).unwrap();
            assert_eq!(registry.name_of(code), Some(name));
        }
        assert_eq!(registry.code_of("XFCursorNotify"), Some(88));
        assert_eq!(registry.code_of("RRScreenChangeNotify"), Some(89));

        let xfixes = &dispatcher.extensions()[1];
        assert_eq!(xfixes.extension, Extension::XFixes);
        assert_eq!(xfixes.registered_codes, vec![87, 88]);
    }

    #[test]
    fn missing_extensions_register_nothing() {
        let dispatcher = EventDispatcher::builder().build().unwrap();
        assert!(dispatcher.registry().code_of("DamageNotify").is_none());
        assert!(dispatcher
            .extensions()
            .iter()
            .all(|ext| ext.event_base.is_none() && ext.registered_codes.is_empty()));
        assert!(!dispatcher.known_names().contains(&"XI_RawMotion"));
    }

    #[test]
    fn neighbouring_extension_bases_do_not_collide() {
        const A: [&str; 2] = ["ANotify0", "ANotify1"];
        const B: [&str; 4] = ["BNotify0", "BNotify1", "BNotify2", "BNotify3"];
        let mut builder = EventDispatcher::builder();
        for (offset, name) in A.into_iter().enumerate() {
            builder = builder.parser(100 + offset as i32, name, "", "", dummy);
        }
        for (offset, name) in B.into_iter().enumerate() {
            builder = builder.parser(120 + offset as i32, name, "", "", dummy);
        }
        let dispatcher = builder.build().unwrap();

        for (base, names) in [(100, &A[..]), (120, &B[..])] {
            for (offset, name) in names.iter().enumerate() {
                let code = base + offset as i32;
                assert_eq!(dispatcher.registry().name_of(code), Some(*name));
                assert_eq!(dispatcher.registry().code_of(name), Some(code));
            }
        }
    }

    #[test]
    fn event_base_past_table_is_a_startup_error() {
        let err = EventDispatcher::builder()
            .parser(PARSER_CAPACITY as i32, "TooFar", "", "", dummy)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, EventError::CodeOutOfRange { code: 256, .. }));

        let mut set = ExtensionSet::new();
        set.insert(
            Extension::XFixes,
            ExtensionInfo {
                event_base: 255,
                major_opcode: 138,
                version: (5, 0),
            },
        );
        // XFCursorNotify lands on 256
        let err = EventDispatcher::builder().extensions(&set).build().err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn conflicting_kind_leaves_both_tables_unchanged() {
        let err = EventDispatcher::builder()
            .parser(xlib::MapNotify, "OtherNotify", "", "", dummy)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, EventError::Conflict { code: xlib::MapNotify, .. }));

        let mut dispatcher = EventDispatcher::builder().build().unwrap();
        let err = dispatcher.add_kind(200, "MapNotify", "", "", dummy).unwrap_err();
        assert!(err.is_configuration());
        assert!(dispatcher.parsers.get(200).is_none());
        assert_eq!(dispatcher.registry.name_of(200), None);

        let err = dispatcher.add_kind(xlib::MapNotify, "OtherNotify", "", "", dummy).unwrap_err();
        assert!(matches!(err, EventError::Conflict { .. }));
        let conn = FakeConnection::new();
        let record = dispatcher.dispatch(&conn, &map_notify(false)).unwrap().unwrap();
        assert_eq!(record.name, "MapNotify");
    }

    #[test]
    fn unknown_codes_are_dropped() {
        let conn = FakeConnection::new();
        let mut dispatcher = EventDispatcher::builder().build().unwrap();
        for code in [xlib::Expose, 200, 1000, -4] {
            let mut event = map_notify(false);
            AsMut::<XAnyEvent>::as_mut(&mut event).type_ = code;
            assert!(dispatcher.dispatch(&conn, &event).unwrap().is_none());
        }
    }

    #[test]
    fn synthetic_events_outside_allow_list_are_dropped() {
        let conn = FakeConnection::new();
        let mut dispatcher = EventDispatcher::builder().build().unwrap();

        let record = dispatcher.dispatch(&conn, &map_notify(true)).unwrap().unwrap();
        assert_eq!(record.name, "MapNotify");
        assert!(record.send_event);
        assert_eq!(record.delivered_to, testing::ROOT);
        assert_eq!(record.window, 0x400001);

        assert!(dispatcher.dispatch(&conn, &configure_notify(true)).unwrap().is_none());
        let record = dispatcher.dispatch(&conn, &configure_notify(false)).unwrap().unwrap();
        assert_eq!(record.name, "ConfigureNotify");
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_client_message_type_is_dropped_with_a_warning() {
        let conn = FakeConnection::new();
        let mut dispatcher = EventDispatcher::builder().build().unwrap();
        let event = XEvent::from(XClientMessageEvent {
            type_: xlib::ClientMessage,
            serial: 1,
            send_event: 1,
            display: ptr::null_mut(),
            window: 0x400001,
            message_type: 1 << 32,
            format: 32,
            data: xlib::ClientMessageData::new(),
        });
        let (result, logs) = capture_warnings(|| dispatcher.dispatch(&conn, &event));
        assert!(result.unwrap().is_none());
        assert!(logs.contains("malformed ClientMessage event"), "{logs}");
    }

    #[test]
    fn generic_failure_propagates_after_release() {
        let conn = FakeConnection::new();
        let mut dispatcher = EventDispatcher::builder().extensions(&probed()).build().unwrap();
        let mut native = 0u8;
        let mut event = generic_event(131, xinput2::XI_HierarchyChanged, 3, &mut native);
        AsMut::<xlib::XGenericEventCookie>::as_mut(&mut event).data = ptr::null_mut();

        assert!(dispatcher.dispatch(&conn, &event).is_err());
        assert_eq!(conn.acquired.get(), 1);
        assert_eq!(conn.released.get(), 1);
    }

    #[test]
    fn debug_filter_covers_generic_names() {
        let dispatcher = EventDispatcher::builder()
            .extensions(&probed())
            .debug_events("*,-FocusIn")
            .build()
            .unwrap();
        let filter = dispatcher.filter();
        for name in dispatcher.known_names() {
            assert_eq!(filter.is_enabled(name), name != "FocusIn", "{name}");
        }
        assert!(filter.is_enabled("XI_RawMotion"));
    }
}
