//! Area X11 event layer
//!
//! Decodes the X event stream, including the per-connection extension
//! events and XI2 generic events, into named [`events::EventRecord`]s for
//! the window manager.

pub mod config;
pub mod error;
pub mod events;
pub mod probe;
pub mod session;
pub mod x11_async;

pub use error::EventError;
pub use events::{EventDispatcher, EventRecord};
