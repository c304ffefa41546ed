//! In-memory connection for decoder tests.

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::io;
use std::ptr;
use std::sync::{Arc, Mutex};

use x11_dl::xlib::{self, Window, XEvent, XGenericEventCookie};

use crate::error::EventError;
use crate::session::XConnection;

pub const ROOT: Window = 0x1e6;

/// Fake display: a fixed atom table and counters for the cookie calls.
pub struct FakeConnection {
    pub root: Window,
    atoms: HashMap<u32, String>,
    pub payload_available: Cell<bool>,
    pub acquired: Cell<usize>,
    pub released: Cell<usize>,
    pub round_trips: Cell<usize>,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self {
            root: ROOT,
            atoms: HashMap::new(),
            payload_available: Cell::new(true),
            acquired: Cell::new(0),
            released: Cell::new(0),
            round_trips: Cell::new(0),
        }
    }

    pub fn with_atom(mut self, atom: u32, name: &str) -> Self {
        self.atoms.insert(atom, name.to_string());
        self
    }
}

impl XConnection for FakeConnection {
    fn root_window(&self) -> Window {
        self.root
    }

    fn atom_name(&self, atom: u32) -> Result<String, EventError> {
        self.round_trips.set(self.round_trips.get() + 1);
        self.atoms.get(&atom).cloned().ok_or(EventError::RoundTrip {
            atom: atom.into(),
            reason: "BadAtom".to_string(),
        })
    }

    fn acquire_event_data(&self, _cookie: &mut XGenericEventCookie) -> bool {
        self.acquired.set(self.acquired.get() + 1);
        self.payload_available.get()
    }

    fn release_event_data(&self, _cookie: &mut XGenericEventCookie) {
        self.released.set(self.released.get() + 1);
    }
}

/// A `GenericEvent` whose cookie already points at `data`.
pub fn generic_event<T>(extension: i32, evtype: i32, serial: u64, data: &mut T) -> XEvent {
    XEvent::from(XGenericEventCookie {
        type_: xlib::GenericEvent,
        serial: serial as _,
        send_event: 0,
        display: ptr::null_mut(),
        extension,
        evtype,
        cookie: serial as u32,
        data: data as *mut T as *mut c_void,
    })
}

/// Run `f` with a subscriber that keeps `warn` and above, returning the log text.
pub fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || LogBuffer(writer.clone()))
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned();
    (result, logs)
}

struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
