//! Native Event Layouts
//!
//! Xlib hands extension events to us inside the generic `XEvent` union.
//! x11-dl only offers safe conversions for the core members, so the
//! extension structs (and the two Xlib does not ship at all: DAMAGE and
//! SHAPE) are read through [`read`], which copies the value out.

use std::mem::{align_of, size_of};
use std::os::raw::{c_int, c_uint, c_ulong};

use x11_dl::xfixes::{XFixesCursorNotifyEvent, XFixesSelectionNotifyEvent};
use x11_dl::xlib::{self, Bool, Display, Time, XEvent, XRectangle};
use x11_dl::xrandr::XRRScreenChangeNotifyEvent;

/// Offsets from an extension's event base.
pub mod offset {
    pub const XKB_ANY: i32 = 0;
    pub const XFIXES_SELECTION_NOTIFY: i32 = 0;
    pub const XFIXES_CURSOR_NOTIFY: i32 = 1;
    pub const DAMAGE_NOTIFY: i32 = 0;
    pub const SHAPE_NOTIFY: i32 = 0;
    pub const RR_SCREEN_CHANGE_NOTIFY: i32 = 0;
}

/// `XDamageNotifyEvent` from `<X11/extensions/Xdamage.h>`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct XDamageNotifyEvent {
    pub type_: c_int,
    pub serial: c_ulong,
    pub send_event: Bool,
    pub display: *mut Display,
    pub drawable: xlib::Drawable,
    pub damage: xlib::XID,
    pub level: c_int,
    pub more: Bool,
    pub timestamp: Time,
    pub area: XRectangle,
    pub geometry: XRectangle,
}

/// `XShapeEvent` from `<X11/extensions/shape.h>`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct XShapeEvent {
    pub type_: c_int,
    pub serial: c_ulong,
    pub send_event: Bool,
    pub display: *mut Display,
    pub window: xlib::Window,
    pub kind: c_int,
    pub x: c_int,
    pub y: c_int,
    pub width: c_uint,
    pub height: c_uint,
    pub time: Time,
    pub shaped: Bool,
}

mod sealed {
    pub trait Sealed {}
}

/// A `#[repr(C)]` Xlib event struct that fits inside `XEvent`.
///
/// # Safety
///
/// Implementors must be plain-old-data Xlib event layouts whose leading
/// fields match `XAnyEvent`'s `type_`/`serial`/`send_event`/`display`.
pub unsafe trait NativeLayout: sealed::Sealed + Copy {}

macro_rules! native_layout {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            unsafe impl NativeLayout for $ty {}
            const _: () = assert!(
                size_of::<$ty>() <= size_of::<XEvent>()
                    && align_of::<$ty>() <= align_of::<XEvent>()
            );
        )*
    };
}

native_layout!(
    xlib::XkbAnyEvent,
    xlib::XkbBellNotifyEvent,
    XFixesSelectionNotifyEvent,
    XFixesCursorNotifyEvent,
    XRRScreenChangeNotifyEvent,
    XDamageNotifyEvent,
    XShapeEvent,
);

/// Copy an extension event out of the `XEvent` union.
///
/// The caller picks `T` from the event code the dispatcher matched on, the
/// same way Xlib clients cast `XEvent*` to the extension struct.
pub fn read<T: NativeLayout>(event: &XEvent) -> T {
    // SAFETY: T is a repr(C) Xlib struct no larger and no more aligned than
    // XEvent (checked at compile time above), and every bit pattern is valid
    // for its integer and pointer fields.
    unsafe { std::ptr::read(event as *const XEvent as *const T) }
}

/// Build an `XEvent` carrying an extension layout.
pub fn into_xevent<T: NativeLayout>(native: T) -> XEvent {
    let mut event = XEvent { pad: [0; 24] };
    // SAFETY: same size/alignment guarantee as `read`; the union is plain data.
    unsafe { std::ptr::write(&mut event as *mut XEvent as *mut T, native) };
    event
}
