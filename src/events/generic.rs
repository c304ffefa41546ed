//! Generic Event Sub-dispatcher
//!
//! `GenericEvent` carries no payload of its own: the extension data lives in
//! Xlib's cookie side-channel and has to be fetched with `XGetEventData` and
//! handed back with `XFreeEventData`. Dispatch is keyed by the extension's
//! major opcode and the cookie's `evtype`.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::slice;

use tracing::{trace, warn};
use x11_dl::xinput2::{
    self, XIButtonState, XIDeviceEvent, XIHierarchyEvent, XIRawEvent, XIValuatorState,
};
use x11_dl::xlib::{self, Window, XEvent, XGenericEventCookie};

use super::record::{EventDetails, EventRecord, HierarchyDevice};
use super::table::{GenericEntry, GenericParser, GenericParserTable};
use crate::error::EventError;
use crate::session::XConnection;

/// A generic event whose payload has been fetched.
#[derive(Debug, Clone, Copy)]
pub struct GenericPayload {
    cookie: XGenericEventCookie,
}

impl GenericPayload {
    pub fn extension(&self) -> i32 {
        self.cookie.extension
    }

    pub fn evtype(&self) -> i32 {
        self.cookie.evtype
    }

    pub fn serial(&self) -> u64 {
        self.cookie.serial as u64
    }

    pub fn send_event(&self) -> bool {
        self.cookie.send_event != 0
    }

    /// Borrow the payload as the extension struct for this evtype.
    ///
    /// # Safety
    ///
    /// `T` must be the struct Xlib produces for this `(extension, evtype)`.
    pub unsafe fn data<T>(&self) -> Option<&T> {
        unsafe { (self.cookie.data as *const T).as_ref() }
    }

    fn error(&self, reason: impl Into<String>) -> EventError {
        EventError::Payload {
            extension: self.cookie.extension,
            evtype: self.cookie.evtype,
            reason: reason.into(),
        }
    }

    fn record(&self, delivered_to: Window, window: Window, details: EventDetails) -> EventRecord {
        EventRecord {
            name: "",
            code: xlib::GenericEvent,
            serial: self.serial(),
            send_event: self.send_event(),
            delivered_to,
            window,
            details,
        }
    }
}

/// Holds a fetched payload and frees it when dropped.
///
/// Drop runs on every way out of a parser call, unwinding included, so the
/// payload is released exactly once per successful acquisition.
pub struct PayloadGuard<'a> {
    conn: &'a dyn XConnection,
    payload: GenericPayload,
}

impl<'a> PayloadGuard<'a> {
    /// Fetch the payload of a `GenericEvent`.
    ///
    /// Returns `None` when Xlib has no data for it. Nothing needs releasing then.
    pub fn acquire(conn: &'a dyn XConnection, event: &XEvent) -> Option<Self> {
        let mut cookie = XGenericEventCookie::from(event);
        if !conn.acquire_event_data(&mut cookie) {
            return None;
        }
        Some(Self {
            conn,
            payload: GenericPayload { cookie },
        })
    }
}

impl Deref for PayloadGuard<'_> {
    type Target = GenericPayload;

    fn deref(&self) -> &GenericPayload {
        &self.payload
    }
}

impl Drop for PayloadGuard<'_> {
    fn drop(&mut self) {
        self.conn.release_event_data(&mut self.payload.cookie);
    }
}

/// Routes `GenericEvent`s to their extension parsers.
#[derive(Default)]
pub struct GenericDispatcher {
    table: GenericParserTable,
    /// `(serial, evtype)` of the last deduplicated event
    last: Option<(u64, i32)>,
}

impl GenericDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &GenericParserTable {
        &self.table
    }

    /// Register the XI2 events under the extension's major opcode.
    ///
    /// Only the motion events are deduplicated. Key and button events can
    /// share a serial with the previous one and still be distinct.
    pub fn register_xinput(&mut self, opcode: i32) -> Result<(), EventError> {
        let entries: [(i32, &'static str, GenericParser, bool); 11] = [
            (xinput2::XI_HierarchyChanged, "XI_HierarchyChanged", parse_hierarchy, false),
            (xinput2::XI_RawKeyPress, "XI_RawKeyPress", parse_raw, false),
            (xinput2::XI_RawKeyRelease, "XI_RawKeyRelease", parse_raw, false),
            (xinput2::XI_RawButtonPress, "XI_RawButtonPress", parse_raw, false),
            (xinput2::XI_RawButtonRelease, "XI_RawButtonRelease", parse_raw, false),
            (xinput2::XI_RawMotion, "XI_RawMotion", parse_raw, true),
            (xinput2::XI_KeyPress, "XI_KeyPress", parse_device, false),
            (xinput2::XI_KeyRelease, "XI_KeyRelease", parse_device, false),
            (xinput2::XI_ButtonPress, "XI_ButtonPress", parse_device, false),
            (xinput2::XI_ButtonRelease, "XI_ButtonRelease", parse_device, false),
            (xinput2::XI_Motion, "XI_Motion", parse_device, true),
        ];
        for (evtype, name, parser, dedupe) in entries {
            self.table.add_parser(
                opcode,
                evtype,
                GenericEntry {
                    name,
                    parser,
                    dedupe,
                },
            )?;
        }
        Ok(())
    }

    /// Decode one `GenericEvent`.
    ///
    /// Unknown `(extension, evtype)` pairs, repeated deduplicated events and
    /// events without a payload yield `Ok(None)`. A parser error is returned
    /// after the payload has been released.
    pub fn dispatch(
        &mut self,
        conn: &dyn XConnection,
        event: &XEvent,
    ) -> Result<Option<EventRecord>, EventError> {
        let cookie: &XGenericEventCookie = event.as_ref();
        let Some(entry) = self.table.get(cookie.extension, cookie.evtype).copied() else {
            trace!(
                "No parser for generic event {} of extension {}",
                cookie.evtype, cookie.extension
            );
            return Ok(None);
        };

        let key = (cookie.serial as u64, cookie.evtype);
        if entry.dedupe && self.last == Some(key) {
            trace!("Skipping duplicate {} #{}", entry.name, key.0);
            return Ok(None);
        }

        let Some(payload) = PayloadGuard::acquire(conn, event) else {
            trace!("No payload for {}", entry.name);
            return Ok(None);
        };
        if entry.dedupe {
            self.last = Some(key);
        }
        let mut record = (entry.parser)(conn, &payload)?;
        if let Some(record) = record.as_mut() {
            record.name = entry.name;
        }
        Ok(record)
    }
}

fn parse_hierarchy(
    conn: &dyn XConnection,
    payload: &GenericPayload,
) -> Result<Option<EventRecord>, EventError> {
    // SAFETY: registered for XI_HierarchyChanged only.
    let event = unsafe { payload.data::<XIHierarchyEvent>() }
        .ok_or_else(|| payload.error("hierarchy event without data"))?;

    let Some(info) = (unsafe { copy_array(event.info, event.num_info) }) else {
        warn!("Hierarchy event with invalid device list ({} entries)", event.num_info);
        return Ok(None);
    };
    let devices = info
        .iter()
        .map(|device| HierarchyDevice {
            device: device.deviceid,
            attachment: device.attachment,
            device_use: device._use,
            enabled: device.enabled != 0,
            flags: device.flags,
        })
        .collect();

    let root = conn.root_window();
    Ok(Some(payload.record(
        root,
        root,
        EventDetails::Hierarchy {
            device_flags: event.flags,
            devices,
            time: event.time as u64,
        },
    )))
}

fn parse_raw(
    conn: &dyn XConnection,
    payload: &GenericPayload,
) -> Result<Option<EventRecord>, EventError> {
    // SAFETY: registered for the XI_Raw* evtypes only.
    let event = unsafe { payload.data::<XIRawEvent>() }
        .ok_or_else(|| payload.error("raw event without data"))?;

    let valuators = unsafe { copy_valuators(&event.valuators, event.valuators.values) };
    let raw_valuators = unsafe { copy_valuators(&event.valuators, event.raw_values) };
    let (Some(valuators), Some(raw_valuators)) = (valuators, raw_valuators) else {
        warn!("Raw event {} with invalid valuator state", event.evtype);
        return Ok(None);
    };

    let root = conn.root_window();
    Ok(Some(payload.record(
        root,
        root,
        EventDetails::RawInput {
            device: event.deviceid,
            source: event.sourceid,
            detail: event.detail,
            flags: event.flags,
            valuators,
            raw_valuators,
            time: event.time as u64,
        },
    )))
}

fn parse_device(
    _conn: &dyn XConnection,
    payload: &GenericPayload,
) -> Result<Option<EventRecord>, EventError> {
    // SAFETY: registered for the core XI2 device evtypes only.
    let event = unsafe { payload.data::<XIDeviceEvent>() }
        .ok_or_else(|| payload.error("device event without data"))?;

    let Some(buttons) = (unsafe { pressed_buttons(&event.buttons) }) else {
        warn!("Device event {} with invalid button state", event.evtype);
        return Ok(None);
    };
    let Some(valuators) = (unsafe { copy_valuators(&event.valuators, event.valuators.values) })
    else {
        warn!("Device event {} with invalid valuator state", event.evtype);
        return Ok(None);
    };

    Ok(Some(payload.record(
        event.event,
        event.event,
        EventDetails::DeviceInput {
            device: event.deviceid,
            source: event.sourceid,
            detail: event.detail,
            root: event.root,
            event: event.event,
            child: event.child,
            root_x: event.root_x,
            root_y: event.root_y,
            event_x: event.event_x,
            event_y: event.event_y,
            flags: event.flags,
            buttons,
            valuators,
            modifiers: event.mods.effective,
            time: event.time as u64,
        },
    )))
}

/// Borrow a counted Xlib array. `None` for a negative count or a null
/// pointer with a non-zero count.
///
/// # Safety
///
/// A non-null `ptr` must point to at least `len` initialised values.
unsafe fn copy_array<'a, T>(ptr: *const T, len: i32) -> Option<&'a [T]> {
    let len = usize::try_from(len).ok()?;
    if len == 0 {
        return Some(&[]);
    }
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { slice::from_raw_parts(ptr, len) })
}

/// Indices of the set bits of an XI2 mask.
fn mask_bits(mask: &[u8]) -> impl Iterator<Item = u32> + '_ {
    mask.iter().enumerate().flat_map(|(byte, bits)| {
        (0..8u32)
            .filter(move |bit| bits & (1 << bit) != 0)
            .map(move |bit| byte as u32 * 8 + bit)
    })
}

/// Copy valuator values out, keyed by valuator index.
///
/// Xlib packs only the values whose mask bit is set, in index order.
///
/// # Safety
///
/// The mask and `values` must be Xlib's arrays for one XI2 event.
unsafe fn copy_valuators(
    state: &XIValuatorState,
    values: *const f64,
) -> Option<BTreeMap<u32, f64>> {
    let mask = unsafe { copy_array(state.mask, state.mask_len) }?;
    let count = mask.iter().map(|bits| bits.count_ones()).sum::<u32>();
    let values = unsafe { copy_array(values, i32::try_from(count).ok()?) }?;
    Some(mask_bits(mask).zip(values.iter().copied()).collect())
}

/// # Safety
///
/// The mask must be Xlib's button mask for one XI2 event.
unsafe fn pressed_buttons(state: &XIButtonState) -> Option<Vec<u32>> {
    let mask = unsafe { copy_array(state.mask, state.mask_len) }?;
    Some(mask_bits(mask).collect())
}
