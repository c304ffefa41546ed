//! Core Event Decoders
//!
//! One parser per core event kind. Parsers copy what they need out of the
//! native event and return `None` for values a well-behaved server never
//! sends.

use std::os::raw::{c_uchar, c_ushort};

use tracing::warn;
use x11_dl::xlib::{
    self, Window, XAnyEvent, XButtonEvent, XCirculateEvent, XClientMessageEvent, XConfigureEvent,
    XConfigureRequestEvent, XCreateWindowEvent, XCrossingEvent, XDestroyWindowEvent, XEvent,
    XFocusChangeEvent, XKeyEvent, XMapEvent, XMapRequestEvent, XMotionEvent, XPropertyEvent,
    XReparentEvent, XSelectionClearEvent, XSelectionEvent, XSelectionRequestEvent, XUnmapEvent,
};

use super::record::{EventDetails, EventRecord};
use super::table::Parser;
use super::EventCode;
use crate::error::EventError;
use crate::session::XConnection;

/// A core event kind: code, name, signal names and parser.
pub(crate) struct CoreKind {
    pub code: EventCode,
    pub name: &'static str,
    pub signal_name: &'static str,
    pub child_signal_name: &'static str,
    pub parser: Parser,
}

macro_rules! core_kinds {
    ($(($code:expr, $name:literal, $signal:literal, $child:literal, $parser:ident $(,)?)),* $(,)?) => {
        &[$(CoreKind {
            code: $code,
            name: $name,
            signal_name: $signal,
            child_signal_name: $child,
            parser: $parser,
        }),*]
    };
}

pub(crate) const CORE_KINDS: &[CoreKind] = core_kinds![
    (xlib::MapRequest, "MapRequest", "", "child-map-request-event", parse_map_request),
    (
        xlib::ConfigureRequest,
        "ConfigureRequest",
        "",
        "child-configure-request-event",
        parse_configure_request,
    ),
    (xlib::SelectionRequest, "SelectionRequest", "selection-request", "", parse_selection_request),
    (xlib::SelectionClear, "SelectionClear", "selection-clear", "", parse_selection_clear),
    (xlib::SelectionNotify, "SelectionNotify", "selection-notify", "", parse_selection_notify),
    (xlib::CreateNotify, "CreateNotify", "create-event", "child-create-event", parse_create),
    (xlib::DestroyNotify, "DestroyNotify", "destroy-event", "child-destroy-event", parse_destroy),
    (xlib::MapNotify, "MapNotify", "map-event", "child-map-event", parse_map),
    (xlib::UnmapNotify, "UnmapNotify", "unmap-event", "child-unmap-event", parse_unmap),
    (
        xlib::ReparentNotify,
        "ReparentNotify",
        "reparent-event",
        "child-reparent-event",
        parse_reparent,
    ),
    (
        xlib::ConfigureNotify,
        "ConfigureNotify",
        "configure-event",
        "child-configure-event",
        parse_configure,
    ),
    (
        xlib::CirculateNotify,
        "CirculateNotify",
        "circulate-event",
        "child-circulate-event",
        parse_circulate,
    ),
    (xlib::PropertyNotify, "PropertyNotify", "property-notify-event", "", parse_property),
    (xlib::FocusIn, "FocusIn", "focus-in-event", "", parse_focus),
    (xlib::FocusOut, "FocusOut", "focus-out-event", "", parse_focus),
    (xlib::EnterNotify, "EnterNotify", "enter-event", "", parse_crossing),
    (xlib::LeaveNotify, "LeaveNotify", "leave-event", "", parse_crossing),
    (xlib::KeyPress, "KeyPress", "key-press-event", "", parse_key),
    (xlib::KeyRelease, "KeyRelease", "key-release-event", "", parse_key),
    (xlib::ButtonPress, "ButtonPress", "button-press-event", "", parse_button),
    (xlib::ButtonRelease, "ButtonRelease", "button-release-event", "", parse_button),
    (xlib::MotionNotify, "MotionNotify", "motion-event", "", parse_motion),
    (xlib::ClientMessage, "ClientMessage", "client-message-event", "", parse_client_message),
];

/// Build a record, rejecting window ids outside the 32-bit XID range.
pub(crate) fn checked_record(
    kind: &'static str,
    any: &XAnyEvent,
    window: Window,
    details: EventDetails,
) -> Option<EventRecord> {
    for xid in [any.window, window] {
        if u32::try_from(xid).is_err() {
            let err = EventError::malformed(kind, format!("window 0x{xid:x} is not an XID"));
            warn!("{}", err);
            return None;
        }
    }
    Some(EventRecord::new(any, window, details))
}

/// Resolve an atom to text.
///
/// Atom 0 (`None`) is the empty string without a round trip. A value that
/// cannot be an atom makes the whole event malformed (`None`). A failed
/// lookup is logged and reads as the empty string.
pub(crate) fn atom_text(conn: &dyn XConnection, kind: &'static str, atom: u64) -> Option<String> {
    if atom == 0 {
        return Some(String::new());
    }
    let Ok(atom) = u32::try_from(atom) else {
        warn!("{}", EventError::malformed(kind, format!("atom {atom} out of range")));
        return None;
    };
    match conn.atom_name(atom) {
        Ok(name) => Some(name),
        Err(e) => {
            warn!("{}", e);
            Some(String::new())
        }
    }
}

fn any(event: &XEvent) -> &XAnyEvent {
    event.as_ref()
}

fn parse_map_request(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XMapRequestEvent = event.as_ref();
    checked_record(
        "MapRequest",
        any(event),
        e.window,
        EventDetails::MapRequest { parent: e.parent },
    )
}

fn parse_configure_request(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XConfigureRequestEvent = event.as_ref();
    checked_record(
        "ConfigureRequest",
        any(event),
        e.window,
        EventDetails::ConfigureRequest {
            parent: e.parent,
            x: e.x,
            y: e.y,
            width: e.width,
            height: e.height,
            border_width: e.border_width,
            above: e.above,
            detail: e.detail,
            value_mask: e.value_mask as u64,
        },
    )
}

fn parse_selection_request(conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    const KIND: &str = "SelectionRequest";
    let e: &XSelectionRequestEvent = event.as_ref();
    let details = EventDetails::SelectionRequest {
        owner: e.owner,
        requestor: e.requestor,
        selection: atom_text(conn, KIND, e.selection as u64)?,
        target: atom_text(conn, KIND, e.target as u64)?,
        property: atom_text(conn, KIND, e.property as u64)?,
        time: e.time as u64,
    };
    checked_record(KIND, any(event), e.owner, details)
}

fn parse_selection_clear(conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    const KIND: &str = "SelectionClear";
    let e: &XSelectionClearEvent = event.as_ref();
    let details = EventDetails::SelectionClear {
        selection: atom_text(conn, KIND, e.selection as u64)?,
        time: e.time as u64,
    };
    checked_record(KIND, any(event), e.window, details)
}

fn parse_selection_notify(conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    const KIND: &str = "SelectionNotify";
    let e: &XSelectionEvent = event.as_ref();
    let details = EventDetails::SelectionNotify {
        requestor: e.requestor,
        selection: atom_text(conn, KIND, e.selection as u64)?,
        target: atom_text(conn, KIND, e.target as u64)?,
        property: atom_text(conn, KIND, e.property as u64)?,
        time: e.time as u64,
    };
    checked_record(KIND, any(event), e.requestor, details)
}

fn parse_create(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XCreateWindowEvent = event.as_ref();
    checked_record(
        "CreateNotify",
        any(event),
        e.window,
        EventDetails::Create {
            parent: e.parent,
            x: e.x,
            y: e.y,
            width: e.width,
            height: e.height,
            border_width: e.border_width,
            override_redirect: e.override_redirect != 0,
        },
    )
}

fn parse_destroy(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XDestroyWindowEvent = event.as_ref();
    checked_record("DestroyNotify", any(event), e.window, EventDetails::Destroy)
}

fn parse_map(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XMapEvent = event.as_ref();
    checked_record(
        "MapNotify",
        any(event),
        e.window,
        EventDetails::Map {
            override_redirect: e.override_redirect != 0,
        },
    )
}

fn parse_unmap(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XUnmapEvent = event.as_ref();
    checked_record(
        "UnmapNotify",
        any(event),
        e.window,
        EventDetails::Unmap {
            from_configure: e.from_configure != 0,
        },
    )
}

fn parse_reparent(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XReparentEvent = event.as_ref();
    checked_record(
        "ReparentNotify",
        any(event),
        e.window,
        EventDetails::Reparent {
            parent: e.parent,
            x: e.x,
            y: e.y,
            override_redirect: e.override_redirect != 0,
        },
    )
}

fn parse_configure(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XConfigureEvent = event.as_ref();
    checked_record(
        "ConfigureNotify",
        any(event),
        e.window,
        EventDetails::Configure {
            x: e.x,
            y: e.y,
            width: e.width,
            height: e.height,
            border_width: e.border_width,
            above: e.above,
            override_redirect: e.override_redirect != 0,
        },
    )
}

fn parse_circulate(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XCirculateEvent = event.as_ref();
    checked_record(
        "CirculateNotify",
        any(event),
        e.window,
        EventDetails::Circulate { place: e.place },
    )
}

fn parse_property(conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    const KIND: &str = "PropertyNotify";
    let e: &XPropertyEvent = event.as_ref();
    let details = EventDetails::Property {
        atom: atom_text(conn, KIND, e.atom as u64)?,
        time: e.time as u64,
        deleted: e.state == xlib::PropertyDelete,
    };
    checked_record(KIND, any(event), e.window, details)
}

fn parse_focus(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XFocusChangeEvent = event.as_ref();
    checked_record(
        "Focus",
        any(event),
        e.window,
        EventDetails::Focus {
            mode: e.mode,
            detail: e.detail,
        },
    )
}

fn parse_crossing(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XCrossingEvent = event.as_ref();
    checked_record(
        "Crossing",
        any(event),
        e.window,
        EventDetails::Crossing {
            mode: e.mode,
            detail: e.detail,
            subwindow: e.subwindow,
            focus: e.focus != 0,
            x: e.x,
            y: e.y,
            x_root: e.x_root,
            y_root: e.y_root,
            time: e.time as u64,
        },
    )
}

fn parse_key(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XKeyEvent = event.as_ref();
    checked_record(
        "Key",
        any(event),
        e.window,
        EventDetails::Key {
            keycode: e.keycode,
            state: e.state,
            time: e.time as u64,
        },
    )
}

fn parse_button(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XButtonEvent = event.as_ref();
    checked_record(
        "Button",
        any(event),
        e.window,
        EventDetails::Button {
            button: e.button,
            state: e.state,
            x: e.x,
            y: e.y,
            x_root: e.x_root,
            y_root: e.y_root,
            time: e.time as u64,
        },
    )
}

fn parse_motion(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: &XMotionEvent = event.as_ref();
    checked_record(
        "MotionNotify",
        any(event),
        e.window,
        EventDetails::Motion {
            x: e.x,
            y: e.y,
            x_root: e.x_root,
            y_root: e.y_root,
            state: e.state,
            is_hint: e.is_hint != 0,
            time: e.time as u64,
        },
    )
}

fn parse_client_message(conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    const KIND: &str = "ClientMessage";
    let e: &XClientMessageEvent = event.as_ref();
    let message_type = atom_text(conn, KIND, e.message_type as u64)?;

    // Each slot is masked to the format's width: no sign extension.
    let data: Vec<u32> = match e.format {
        8 => {
            let bytes: &[c_uchar] = e.data.as_ref();
            bytes.iter().copied().map(u32::from).collect()
        }
        16 => {
            let shorts: &[c_ushort] = e.data.as_ref();
            shorts.iter().copied().map(u32::from).collect()
        }
        32 => e
            .data
            .as_longs()
            .iter()
            .map(|&value| (value as u64 & 0xffff_ffff) as u32)
            .collect(),
        format => {
            warn!("{}", EventError::malformed(KIND, format!("unsupported format {format}")));
            return None;
        }
    };

    checked_record(
        KIND,
        any(event),
        e.window,
        EventDetails::ClientMessage {
            message_type,
            format: e.format,
            data,
        },
    )
}
