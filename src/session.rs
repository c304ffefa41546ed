//! X Session
//!
//! The decoders' view of the display connection, and the Xlib-backed
//! implementation used at runtime.
//!
//! Events are read through Xlib (so extension events arrive as the native
//! structs and XI2 payloads come through the cookie side-channel), while
//! requests such as atom lookups and extension queries go through x11rb on
//! the very same connection via Xlib's XCB handle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::ptr;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11_dl::xlib::{self, Window, XEvent, XGenericEventCookie, Xlib};
use x11_dl::xlib_xcb::Xlib_xcb;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt as _;
use x11rb::xcb_ffi::XCBConnection;

use crate::error::EventError;
use crate::probe::{Extension, ExtensionSet};

/// What decoders need from the connection.
///
/// Implementations are used from the single event-pump thread only.
pub trait XConnection {
    /// Root window of the default screen.
    fn root_window(&self) -> Window;

    /// Resolve an atom to its name. This is a round trip to the server.
    fn atom_name(&self, atom: u32) -> Result<String, EventError>;

    /// Fetch the extension payload of a generic event (`XGetEventData`).
    ///
    /// Returns `false` when no payload is available, in which case
    /// [`XConnection::release_event_data`] must not be called.
    fn acquire_event_data(&self, cookie: &mut XGenericEventCookie) -> bool;

    /// Free a payload obtained by [`XConnection::acquire_event_data`].
    fn release_event_data(&self, cookie: &mut XGenericEventCookie);
}

/// Xlib display plus an x11rb view of its XCB connection.
pub struct XlibSession {
    xlib: Xlib,
    display: *mut xlib::Display,
    conn: ManuallyDrop<XCBConnection>,
    root: Window,
    owns_display: bool,
    /// Atoms never change name for the lifetime of the server
    atom_names: RefCell<HashMap<u32, String>>,
}

impl XlibSession {
    /// Open a display and wrap it.
    pub fn connect(display_name: Option<&str>) -> Result<Self> {
        let xlib = Xlib::open().context("Failed to load libX11")?;

        let display_cstr = display_name
            .map(CString::new)
            .transpose()
            .context("Invalid display name")?;
        let display = unsafe {
            (xlib.XOpenDisplay)(display_cstr.as_ref().map_or(ptr::null(), |name| name.as_ptr()))
        };
        if display.is_null() {
            return Err(anyhow::anyhow!(
                "Failed to open X11 display {}",
                display_name.unwrap_or("$DISPLAY")
            ));
        }

        // SAFETY: the display was just opened and is handed over to the session.
        match unsafe { Self::from_raw(xlib, display, true) } {
            Ok(session) => Ok(session),
            Err(e) => {
                // from_raw consumed our Xlib handle; load another one to close.
                if let Ok(xlib) = Xlib::open() {
                    unsafe { (xlib.XCloseDisplay)(display) };
                }
                Err(e)
            }
        }
    }

    /// Wrap a display opened by someone else.
    ///
    /// # Safety
    ///
    /// `display` must be a valid Xlib display that outlives the session unless
    /// `owns_display` is set, in which case the session closes it on drop.
    pub unsafe fn from_raw(
        xlib: Xlib,
        display: *mut xlib::Display,
        owns_display: bool,
    ) -> Result<Self> {
        let xlib_xcb = Xlib_xcb::open().context("Failed to load libX11-xcb")?;
        let raw = unsafe { (xlib_xcb.XGetXCBConnection)(display) };
        if raw.is_null() {
            return Err(anyhow::anyhow!("Display has no XCB connection"));
        }
        // Xlib keeps ownership of the connection and of the event queue.
        let conn = unsafe { XCBConnection::from_raw_xcb_connection(raw, false) }
            .context("Failed to wrap XCB connection")?;
        let root = unsafe { (xlib.XDefaultRootWindow)(display) };
        info!("X session ready, root window 0x{:x}", root);

        Ok(Self {
            xlib,
            display,
            conn: ManuallyDrop::new(conn),
            root,
            owns_display,
            atom_names: RefCell::new(HashMap::new()),
        })
    }

    /// x11rb handle for requests on this display.
    pub fn conn(&self) -> &XCBConnection {
        &self.conn
    }

    /// File descriptor of the display connection, for polling.
    pub fn fd(&self) -> RawFd {
        unsafe { (self.xlib.XConnectionNumber)(self.display) }
    }

    /// Make Xlib translate the probed extensions' events into native structs.
    ///
    /// Xlib only converts extension events whose client library has been
    /// initialised on this display. DAMAGE and SHAPE have no x11-dl binding;
    /// hosts that want their events must initialise libXdamage/libXext.
    pub fn enable_extension_events(&self, extensions: &ExtensionSet) {
        if extensions.get(Extension::Xkb).is_some() {
            let (mut opcode, mut event, mut error) = (0, 0, 0);
            let (mut major, mut minor): (c_int, c_int) = (1, 0);
            let ok = unsafe {
                (self.xlib.XkbQueryExtension)(
                    self.display,
                    &mut opcode,
                    &mut event,
                    &mut error,
                    &mut major,
                    &mut minor,
                )
            };
            debug!("Xlib XKB {}.{} initialised: {}", major, minor, ok != 0);
        }

        if extensions.get(Extension::XFixes).is_some() {
            match x11_dl::xfixes::Xlib::open() {
                Ok(xfixes) => {
                    let (mut event, mut error) = (0, 0);
                    unsafe { (xfixes.XFixesQueryExtension)(self.display, &mut event, &mut error) };
                    debug!("Xlib XFIXES initialised, event base {}", event);
                }
                Err(e) => warn!("Failed to load libXfixes: {}", e),
            }
        }

        if extensions.get(Extension::RandR).is_some() {
            match x11_dl::xrandr::Xrandr::open() {
                Ok(xrandr) => {
                    let (mut event, mut error) = (0, 0);
                    unsafe { (xrandr.XRRQueryExtension)(self.display, &mut event, &mut error) };
                    debug!("Xlib RANDR initialised, event base {}", event);
                }
                Err(e) => warn!("Failed to load libXrandr: {}", e),
            }
        }

        if extensions.get(Extension::XInput).is_some() {
            match x11_dl::xinput2::XInput2::open() {
                Ok(xinput2) => {
                    let (mut major, mut minor): (c_int, c_int) = (2, 2);
                    unsafe { (xinput2.XIQueryVersion)(self.display, &mut major, &mut minor) };
                    debug!("Xlib XInput {}.{} initialised", major, minor);
                }
                Err(e) => warn!("Failed to load libXi: {}", e),
            }
        }
    }

    /// Select core events on the root window (`XSelectInput`).
    pub fn select_root_input(&self, mask: std::os::raw::c_long) {
        unsafe { (self.xlib.XSelectInput)(self.display, self.root, mask) };
    }

    /// Ask XKB for bell notifications from the core keyboard.
    pub fn select_xkb_bell(&self) {
        const XKB_USE_CORE_KBD: std::os::raw::c_uint = 0x0100;
        unsafe {
            (self.xlib.XkbSelectEvents)(
                self.display,
                XKB_USE_CORE_KBD,
                xlib::XkbBellNotifyMask,
                xlib::XkbBellNotifyMask,
            )
        };
    }

    /// Number of events Xlib can hand out without blocking.
    pub fn pending(&self) -> i32 {
        unsafe { (self.xlib.XPending)(self.display) }
    }

    /// Next queued event. Blocks if none is pending.
    pub fn next_event(&self) -> XEvent {
        let mut event = XEvent { pad: [0; 24] };
        unsafe { (self.xlib.XNextEvent)(self.display, &mut event) };
        event
    }

    /// Flush requests from both the x11rb and the Xlib side.
    pub fn flush(&self) -> Result<()> {
        self.conn.flush().context("Failed to flush XCB connection")?;
        unsafe { (self.xlib.XFlush)(self.display) };
        Ok(())
    }
}

impl XConnection for XlibSession {
    fn root_window(&self) -> Window {
        self.root
    }

    fn atom_name(&self, atom: u32) -> Result<String, EventError> {
        if let Some(name) = self.atom_names.borrow().get(&atom) {
            return Ok(name.clone());
        }

        let round_trip = |reason: String| EventError::RoundTrip {
            atom: atom.into(),
            reason,
        };
        let reply = self
            .conn
            .get_atom_name(atom)
            .map_err(|e| round_trip(e.to_string()))?
            .reply()
            .map_err(|e| round_trip(e.to_string()))?;
        let name = String::from_utf8_lossy(&reply.name).into_owned();

        self.atom_names.borrow_mut().insert(atom, name.clone());
        Ok(name)
    }

    fn acquire_event_data(&self, cookie: &mut XGenericEventCookie) -> bool {
        unsafe { (self.xlib.XGetEventData)(self.display, cookie) != 0 }
    }

    fn release_event_data(&self, cookie: &mut XGenericEventCookie) {
        unsafe { (self.xlib.XFreeEventData)(self.display, cookie) }
    }
}

impl Drop for XlibSession {
    fn drop(&mut self) {
        // The XCB wrapper must go before the display that owns its connection.
        unsafe { ManuallyDrop::drop(&mut self.conn) };
        if self.owns_display {
            debug!("Closing X display");
            unsafe { (self.xlib.XCloseDisplay)(self.display) };
        }
    }
}
