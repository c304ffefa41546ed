//! Decoded event records handed to the window-management router.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use x11_dl::xlib::{Window, XAnyEvent};

use super::EventCode;

/// A decoded X event.
///
/// Owns all of its data; nothing points back into the native event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Registered event name, e.g. `MapNotify`
    pub name: &'static str,
    pub code: EventCode,
    pub serial: u64,
    /// Set when the event was sent by a client rather than the server
    pub send_event: bool,
    /// Window the event was delivered to
    pub delivered_to: Window,
    /// Window the event is about
    pub window: Window,
    #[serde(flatten)]
    pub details: EventDetails,
}

impl EventRecord {
    /// Build a record from the common header of a native event.
    ///
    /// The name is filled in by the dispatcher from the registry.
    pub(crate) fn new(any: &XAnyEvent, window: Window, details: EventDetails) -> Self {
        Self {
            name: "",
            code: any.type_,
            serial: any.serial as u64,
            send_event: any.send_event != 0,
            delivered_to: any.window,
            window,
            details,
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} window=0x{:x} delivered_to=0x{:x}{} {:?}",
            self.name,
            self.serial,
            self.window,
            self.delivered_to,
            if self.send_event { " (synthetic)" } else { "" },
            self.details
        )
    }
}

/// Rectangle as reported by DAMAGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One device entry of an XI2 hierarchy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HierarchyDevice {
    pub device: i32,
    pub attachment: i32,
    pub device_use: i32,
    pub enabled: bool,
    pub flags: i32,
}

/// Kind-specific payload of an [`EventRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EventDetails {
    MapRequest {
        parent: Window,
    },
    ConfigureRequest {
        parent: Window,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        border_width: i32,
        above: Window,
        detail: i32,
        value_mask: u64,
    },
    SelectionRequest {
        owner: Window,
        requestor: Window,
        selection: String,
        target: String,
        property: String,
        time: u64,
    },
    SelectionClear {
        selection: String,
        time: u64,
    },
    SelectionNotify {
        requestor: Window,
        selection: String,
        target: String,
        property: String,
        time: u64,
    },
    Create {
        parent: Window,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        border_width: i32,
        override_redirect: bool,
    },
    Destroy,
    Map {
        override_redirect: bool,
    },
    Unmap {
        from_configure: bool,
    },
    Reparent {
        parent: Window,
        x: i32,
        y: i32,
        override_redirect: bool,
    },
    Configure {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        border_width: i32,
        above: Window,
        override_redirect: bool,
    },
    Circulate {
        place: i32,
    },
    Property {
        atom: String,
        time: u64,
        deleted: bool,
    },
    Focus {
        mode: i32,
        detail: i32,
    },
    Crossing {
        mode: i32,
        detail: i32,
        subwindow: Window,
        focus: bool,
        x: i32,
        y: i32,
        x_root: i32,
        y_root: i32,
        time: u64,
    },
    Key {
        keycode: u32,
        state: u32,
        time: u64,
    },
    Button {
        button: u32,
        state: u32,
        x: i32,
        y: i32,
        x_root: i32,
        y_root: i32,
        time: u64,
    },
    Motion {
        x: i32,
        y: i32,
        x_root: i32,
        y_root: i32,
        state: u32,
        is_hint: bool,
        time: u64,
    },
    ClientMessage {
        message_type: String,
        format: i32,
        /// 20, 10 or 5 values for format 8, 16 or 32, masked to that width
        data: Vec<u32>,
    },
    Bell {
        device: i32,
        percent: i32,
        pitch: i32,
        duration: i32,
        bell_class: i32,
        bell_id: i32,
        bell_name: String,
        event_only: bool,
        time: u64,
    },
    SelectionOwner {
        subtype: i32,
        owner: Window,
        selection: String,
        time: u64,
        selection_time: u64,
    },
    Cursor {
        cursor_serial: u64,
        cursor_name: String,
        time: u64,
    },
    Damage {
        damage: u64,
        level: i32,
        more: bool,
        area: Rect,
        geometry: Rect,
        time: u64,
    },
    Shape {
        kind: i32,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        shaped: bool,
        time: u64,
    },
    ScreenChange {
        root: Window,
        width: i32,
        height: i32,
        mwidth: i32,
        mheight: i32,
        rotation: u16,
        size_index: u16,
        subpixel_order: u16,
        time: u64,
        config_time: u64,
    },
    Hierarchy {
        device_flags: i32,
        devices: Vec<HierarchyDevice>,
        time: u64,
    },
    RawInput {
        device: i32,
        source: i32,
        detail: i32,
        flags: i32,
        /// Valuator index to accelerated value
        valuators: BTreeMap<u32, f64>,
        /// Valuator index to unaccelerated value
        raw_valuators: BTreeMap<u32, f64>,
        time: u64,
    },
    DeviceInput {
        device: i32,
        source: i32,
        detail: i32,
        root: Window,
        event: Window,
        child: Window,
        root_x: f64,
        root_y: f64,
        event_x: f64,
        event_y: f64,
        flags: i32,
        buttons: Vec<u32>,
        valuators: BTreeMap<u32, f64>,
        modifiers: i32,
        time: u64,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(details: EventDetails) -> EventRecord {
        EventRecord {
            name: "DestroyNotify",
            code: 17,
            serial: 42,
            send_event: false,
            delivered_to: 0x1e6,
            window: 0x400001,
            details,
        }
    }

    #[test]
    fn json_lines_are_flat_and_tagged() {
        let value = serde_json::to_value(record(EventDetails::Destroy)).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "DestroyNotify",
                "code": 17,
                "serial": 42,
                "send_event": false,
                "delivered_to": 0x1e6,
                "window": 0x400001,
                "type": "Destroy",
            })
        );

        let mut property = record(EventDetails::Property {
            atom: "WM_NAME".to_string(),
            time: 7,
            deleted: false,
        });
        property.name = "PropertyNotify";
        let value = serde_json::to_value(property).unwrap();
        assert_eq!(value["type"], "Property");
        assert_eq!(value["atom"], "WM_NAME");
        assert_eq!(value["window"], 0x400001);
        assert!(value.get("details").is_none());
    }
}
