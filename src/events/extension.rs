//! Extension Event Decoders
//!
//! Parsers for XKB, XFIXES, DAMAGE, SHAPE and RANDR events. Their codes are
//! `event_base + offset`, with the base negotiated per connection.

use tracing::trace;
use x11_dl::xfixes::{XFixesCursorNotifyEvent, XFixesSelectionNotifyEvent};
use x11_dl::xlib::{self, XAnyEvent, XEvent, XRectangle, XkbAnyEvent, XkbBellNotifyEvent};
use x11_dl::xrandr::XRRScreenChangeNotifyEvent;

use super::decode::{atom_text, checked_record};
use super::native::{self, offset, XDamageNotifyEvent, XShapeEvent};
use super::record::{EventDetails, EventRecord, Rect};
use super::table::Parser;
use crate::probe::Extension;
use crate::session::XConnection;

/// An extension event kind, placed relative to the extension's event base.
pub(crate) struct ExtensionKind {
    pub offset: i32,
    pub name: &'static str,
    pub signal_name: &'static str,
    pub child_signal_name: &'static str,
    pub parser: Parser,
}

const XKB: &[ExtensionKind] = &[ExtensionKind {
    offset: offset::XKB_ANY,
    name: "XKBNotify",
    signal_name: "xkb-event",
    child_signal_name: "",
    parser: parse_xkb,
}];

const XFIXES: &[ExtensionKind] = &[
    ExtensionKind {
        offset: offset::XFIXES_SELECTION_NOTIFY,
        name: "XFSelectionNotify",
        signal_name: "xfixes-selection-notify-event",
        child_signal_name: "",
        parser: parse_xfixes_selection,
    },
    ExtensionKind {
        offset: offset::XFIXES_CURSOR_NOTIFY,
        name: "XFCursorNotify",
        signal_name: "cursor-event",
        child_signal_name: "",
        parser: parse_xfixes_cursor,
    },
];

const DAMAGE: &[ExtensionKind] = &[ExtensionKind {
    offset: offset::DAMAGE_NOTIFY,
    name: "DamageNotify",
    signal_name: "damage-event",
    child_signal_name: "",
    parser: parse_damage,
}];

const SHAPE: &[ExtensionKind] = &[ExtensionKind {
    offset: offset::SHAPE_NOTIFY,
    name: "ShapeNotify",
    signal_name: "shape-event",
    child_signal_name: "",
    parser: parse_shape,
}];

const RANDR: &[ExtensionKind] = &[ExtensionKind {
    offset: offset::RR_SCREEN_CHANGE_NOTIFY,
    name: "RRScreenChangeNotify",
    signal_name: "screen-change-event",
    child_signal_name: "",
    parser: parse_screen_change,
}];

/// Primary event kinds of an extension. XInput has none: its events are generic.
pub(crate) fn kinds(extension: Extension) -> &'static [ExtensionKind] {
    match extension {
        Extension::Xkb => XKB,
        Extension::XFixes => XFIXES,
        Extension::Damage => DAMAGE,
        Extension::Shape => SHAPE,
        Extension::RandR => RANDR,
        Extension::XInput => &[],
    }
}

fn parse_xkb(conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    const KIND: &str = "XKBNotify";
    let any: XkbAnyEvent = native::read(event);
    if any.xkb_type != xlib::XkbBellNotify {
        trace!("Ignoring XKB event subtype {}", any.xkb_type);
        return None;
    }

    let bell: XkbBellNotifyEvent = native::read(event);
    // Bells not tied to a window ring on the root
    let window = if bell.window == 0 {
        conn.root_window()
    } else {
        bell.window
    };
    let details = EventDetails::Bell {
        device: bell.device,
        percent: bell.percent,
        pitch: bell.pitch,
        duration: bell.duration,
        bell_class: bell.bell_class,
        bell_id: bell.bell_id,
        bell_name: atom_text(conn, KIND, bell.name as u64)?,
        event_only: bell.event_only != 0,
        time: bell.time as u64,
    };
    // XKB events have no window in the XAnyEvent position.
    let header = XAnyEvent {
        type_: bell.type_,
        serial: bell.serial,
        send_event: bell.send_event,
        display: bell.display,
        window,
    };
    checked_record(KIND, &header, window, details)
}

fn parse_xfixes_selection(conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    const KIND: &str = "XFSelectionNotify";
    let e: XFixesSelectionNotifyEvent = native::read(event);
    let details = EventDetails::SelectionOwner {
        subtype: e.subtype,
        owner: e.owner,
        selection: atom_text(conn, KIND, e.selection as u64)?,
        time: e.timestamp as u64,
        selection_time: e.selection_timestamp as u64,
    };
    checked_record(KIND, event.as_ref(), e.window, details)
}

fn parse_xfixes_cursor(conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    const KIND: &str = "XFCursorNotify";
    let e: XFixesCursorNotifyEvent = native::read(event);
    let details = EventDetails::Cursor {
        cursor_serial: e.cursor_serial as u64,
        cursor_name: atom_text(conn, KIND, e.cursor_name as u64)?,
        time: e.timestamp as u64,
    };
    checked_record(KIND, event.as_ref(), e.window, details)
}

fn rect(r: &XRectangle) -> Rect {
    Rect {
        x: r.x.into(),
        y: r.y.into(),
        width: r.width.into(),
        height: r.height.into(),
    }
}

fn parse_damage(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: XDamageNotifyEvent = native::read(event);
    checked_record(
        "DamageNotify",
        event.as_ref(),
        e.drawable,
        EventDetails::Damage {
            damage: e.damage as u64,
            level: e.level,
            more: e.more != 0,
            area: rect(&e.area),
            geometry: rect(&e.geometry),
            time: e.timestamp as u64,
        },
    )
}

fn parse_shape(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: XShapeEvent = native::read(event);
    checked_record(
        "ShapeNotify",
        event.as_ref(),
        e.window,
        EventDetails::Shape {
            kind: e.kind,
            x: e.x,
            y: e.y,
            width: e.width,
            height: e.height,
            shaped: e.shaped != 0,
            time: e.time as u64,
        },
    )
}

fn parse_screen_change(_conn: &dyn XConnection, event: &XEvent) -> Option<EventRecord> {
    let e: XRRScreenChangeNotifyEvent = native::read(event);
    checked_record(
        "RRScreenChangeNotify",
        event.as_ref(),
        e.window,
        EventDetails::ScreenChange {
            root: e.root,
            width: e.width,
            height: e.height,
            mwidth: e.mwidth,
            mheight: e.mheight,
            rotation: e.rotation,
            size_index: e.size_index,
            subpixel_order: e.subpixel_order,
            time: e.timestamp as u64,
            config_time: e.config_timestamp as u64,
        },
    )
}
