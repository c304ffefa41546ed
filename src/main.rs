//! area-events
//!
//! Prints every X event the Area event layer decodes, as text or JSON lines.
//! Shows exactly what the window manager gets to see.

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11_dl::xlib;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xproto::AtomEnum;

use area_events::config::{Config, TraceFormat};
use area_events::events::{EventDispatcher, EventRecord};
use area_events::probe::{self, Extension, ExtensionSet};
use area_events::session::{XConnection, XlibSession};
use area_events::x11_async::X11EventStream;

/// Connection, dispatcher and output settings
struct EventTracer {
    session: XlibSession,
    stream: X11EventStream,
    dispatcher: EventDispatcher,
    format: TraceFormat,
}

impl EventTracer {
    fn new(config: &Config, display: Option<&str>) -> Result<Self> {
        let session = XlibSession::connect(display)?;

        let extensions = probe::probe_all(session.conn(), &config.extensions);
        session.enable_extension_events(&extensions);

        let dispatcher = EventDispatcher::builder()
            .extensions(&extensions)
            .debug_events(config.debug_events())
            .build()
            .context("Failed to register event parsers")?;

        let stream = X11EventStream::new(&session)?;
        let tracer = Self {
            session,
            stream,
            dispatcher,
            format: config.trace.format,
        };
        tracer.select_events(config, &extensions)?;
        Ok(tracer)
    }

    /// Ask for the events we can decode on the root window
    fn select_events(&self, config: &Config, extensions: &ExtensionSet) -> Result<()> {
        let root = u32::try_from(self.session.root_window()).context("Root window is not an XID")?;
        let conn = self.session.conn();

        if config.trace.root_events {
            self.session.select_root_input(
                xlib::SubstructureNotifyMask | xlib::PropertyChangeMask | xlib::FocusChangeMask,
            );
        }

        if extensions.get(Extension::Xkb).is_some() {
            self.session.select_xkb_bell();
        }

        if extensions.get(Extension::XFixes).is_some() {
            conn.xfixes_select_cursor_input(root, xfixes::CursorNotifyMask::DISPLAY_CURSOR)?;
            for selection in [AtomEnum::PRIMARY, AtomEnum::SECONDARY] {
                conn.xfixes_select_selection_input(
                    root,
                    selection.into(),
                    xfixes::SelectionEventMask::SET_SELECTION_OWNER,
                )?;
            }
        }

        if extensions.get(Extension::RandR).is_some() {
            conn.randr_select_input(root, randr::NotifyMask::SCREEN_CHANGE)?;
        }

        if extensions.get(Extension::XInput).is_some() {
            let mask = xinput::XIEventMask::HIERARCHY
                | xinput::XIEventMask::RAW_MOTION
                | xinput::XIEventMask::RAW_BUTTON_PRESS
                | xinput::XIEventMask::RAW_BUTTON_RELEASE;
            conn.xinput_xi_select_events(
                root,
                &[xinput::EventMask {
                    deviceid: xinput::Device::ALL.into(),
                    mask: vec![mask],
                }],
            )?;
        }

        self.session.flush()
    }

    async fn run(mut self) -> Result<()> {
        info!("Tracing X events, {} known event types", self.dispatcher.known_names().len());

        loop {
            if let Err(e) = self.session.flush() {
                warn!("Failed to flush X11 requests: {}", e);
            }

            while let Some(event) = self.stream.poll_next_event(&self.session) {
                match self.dispatcher.dispatch(&self.session, &event) {
                    Ok(Some(record)) => self.emit(&record)?,
                    Ok(None) => {}
                    Err(e) => warn!("Failed to decode event: {}", e),
                }
            }

            self.stream.wait_readable().await;
        }
    }

    fn emit(&self, record: &EventRecord) -> Result<()> {
        match self.format {
            TraceFormat::Text => println!("{}", record),
            TraceFormat::Json => {
                let line = serde_json::to_string(record).context("Failed to serialize event")?;
                println!("{}", line);
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "area_events=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let display = args
        .iter()
        .position(|arg| arg == "--display" || arg == "-d")
        .and_then(|index| args.get(index + 1))
        .map(String::as_str);
    let list_only = args.iter().any(|arg| arg == "--list");

    let config = Config::load().context("Failed to load configuration")?;
    let tracer = EventTracer::new(&config, display)?;

    if list_only {
        for name in tracer.dispatcher.known_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle SIGTERM and SIGINT
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    let _ = tx.send(()).await;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    let _ = tx.send(()).await;
                }
            }
        });
    }

    tokio::select! {
        result = tracer.run() => {
            if let Err(e) = result {
                error!("Event tracer error: {}", e);
                return Err(e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
