//! X11 Async Event Stream
//!
//! Non-blocking async X11 event polling using mio, following LeftWM's architecture.

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Notify, oneshot};
use x11_dl::xlib::XEvent;

use crate::session::XlibSession;

/// X11 event stream with async polling support
///
/// Uses mio in a background thread to poll the display's file descriptor and
/// notify the async loop when it becomes readable. The session itself stays
/// on the loop's thread: Xlib displays are not thread-safe.
pub struct X11EventStream {
    notify: Arc<Notify>,
    _task_guard: oneshot::Receiver<()>,
}

impl X11EventStream {
    /// Start polling the connection behind `session`.
    pub fn new(session: &XlibSession) -> Result<Self> {
        Self::from_fd(session.fd())
    }

    fn from_fd(fd: RawFd) -> Result<Self> {
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        let (guard, task_guard) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let mut events = mio::Events::with_capacity(1);

        poll.registry()
            .register(
                &mut mio::unix::SourceFd(&fd),
                mio::Token(0),
                mio::Interest::READABLE,
            )
            .context("Failed to register X11 FD with mio")?;

        let timeout = Duration::from_millis(100);
        tokio::task::spawn_blocking(move || {
            loop {
                if guard.is_closed() {
                    tracing::info!("X11 socket polling thread shutting down");
                    return;
                }

                if let Err(err) = poll.poll(&mut events, Some(timeout)) {
                    tracing::warn!("X11 socket poll failed: {:?}", err);
                    continue;
                }

                events
                    .iter()
                    .filter(|event| event.token() == mio::Token(0))
                    .for_each(|_| task_notify.notify_one());
            }
        });

        Ok(Self {
            notify,
            _task_guard: task_guard,
        })
    }

    /// Non-blocking: next queued event, if any.
    ///
    /// Xlib may already hold events read off the socket, so callers drain
    /// this until `None` before waiting on [`X11EventStream::wait_readable`].
    pub fn poll_next_event(&self, session: &XlibSession) -> Option<XEvent> {
        if session.pending() > 0 {
            Some(session.next_event())
        } else {
            None
        }
    }

    /// Async wait for the X11 FD to become readable
    pub async fn wait_readable(&self) {
        self.notify.notified().await;
    }
}
