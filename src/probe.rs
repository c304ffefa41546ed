//! Extension Probe
//!
//! Detects the optional X11 extensions whose events we decode and records
//! the event base each one was assigned for this server.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::connection::RequestConnection;
use x11rb::protocol::damage::ConnectionExt as _;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::shape::ConnectionExt as _;
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xinput::ConnectionExt as _;
use x11rb::protocol::xkb::ConnectionExt as _;
use x11rb::protocol::{damage, randr, shape, xfixes, xinput, xkb};

use crate::config::ExtensionsConfig;
use crate::error::EventError;

/// Optional extensions with events we know how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Extension {
    Xkb,
    XFixes,
    Damage,
    Shape,
    XInput,
    RandR,
}

impl Extension {
    pub const ALL: [Extension; 6] = [
        Extension::Xkb,
        Extension::XFixes,
        Extension::Damage,
        Extension::Shape,
        Extension::XInput,
        Extension::RandR,
    ];

    /// Name the server knows the extension by.
    pub fn wire_name(self) -> &'static str {
        match self {
            Extension::Xkb => xkb::X11_EXTENSION_NAME,
            Extension::XFixes => xfixes::X11_EXTENSION_NAME,
            Extension::Damage => damage::X11_EXTENSION_NAME,
            Extension::Shape => shape::X11_EXTENSION_NAME,
            Extension::XInput => xinput::X11_EXTENSION_NAME,
            Extension::RandR => randr::X11_EXTENSION_NAME,
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// What the server told us about an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionInfo {
    /// First event code assigned to the extension
    pub event_base: i32,
    /// Request opcode, also used to tag the extension's generic events
    pub major_opcode: i32,
    pub version: (u32, u32),
}

/// Probe results, one entry per available extension.
#[derive(Debug, Clone, Default)]
pub struct ExtensionSet {
    available: HashMap<Extension, ExtensionInfo>,
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, extension: Extension, info: ExtensionInfo) {
        self.available.insert(extension, info);
    }

    pub fn get(&self, extension: Extension) -> Option<&ExtensionInfo> {
        self.available.get(&extension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Extension, &ExtensionInfo)> + '_ {
        self.available.iter().map(|(extension, info)| (*extension, info))
    }
}

/// Query presence and version of one extension.
///
/// Absence is expected on some servers and is only logged: the caller simply
/// leaves the extension disabled. Availability never changes during a
/// connection, so there is no retry.
pub fn probe<C: RequestConnection>(conn: &C, extension: Extension) -> Option<ExtensionInfo> {
    match query(conn, extension) {
        Ok(info) => {
            debug!(
                "{} extension {}.{}: event base {}, opcode {}",
                extension, info.version.0, info.version.1, info.event_base, info.major_opcode
            );
            Some(info)
        }
        Err(e) => {
            info!("{} extension disabled: {:#}", extension, e);
            None
        }
    }
}

/// Probe every extension enabled in configuration.
pub fn probe_all<C: RequestConnection>(conn: &C, config: &ExtensionsConfig) -> ExtensionSet {
    let mut set = ExtensionSet::new();
    for extension in Extension::ALL {
        if !config.is_enabled(extension) {
            debug!("{} extension disabled in configuration", extension);
            continue;
        }
        if let Some(info) = probe(conn, extension) {
            set.insert(extension, info);
        }
    }
    info!(
        "X11 Extensions: xkb={}, xfixes={}, damage={}, shape={}, xinput2={}, randr={}",
        set.get(Extension::Xkb).is_some(),
        set.get(Extension::XFixes).is_some(),
        set.get(Extension::Damage).is_some(),
        set.get(Extension::Shape).is_some(),
        set.get(Extension::XInput).is_some(),
        set.get(Extension::RandR).is_some(),
    );
    set
}

fn query<C: RequestConnection>(conn: &C, extension: Extension) -> Result<ExtensionInfo> {
    let present = conn
        .extension_information(extension.wire_name())?
        .ok_or(EventError::ExtensionUnavailable(extension.wire_name()))?;

    // Several servers refuse extension requests until the version is negotiated.
    let version = match extension {
        Extension::Xkb => {
            let reply = conn.xkb_use_extension(1, 0)?.reply()?;
            if !reply.supported {
                warn!(
                    "XKB {}.{} does not support version 1.0",
                    reply.server_major, reply.server_minor
                );
                return Err(EventError::ExtensionUnavailable(extension.wire_name()).into());
            }
            (reply.server_major.into(), reply.server_minor.into())
        }
        Extension::XFixes => {
            let reply = conn.xfixes_query_version(5, 0)?.reply()?;
            (reply.major_version, reply.minor_version)
        }
        Extension::Damage => {
            let reply = conn.damage_query_version(1, 1)?.reply()?;
            (reply.major_version, reply.minor_version)
        }
        Extension::Shape => {
            let reply = conn.shape_query_version()?.reply()?;
            (reply.major_version.into(), reply.minor_version.into())
        }
        Extension::XInput => {
            let reply = conn.xinput_xi_query_version(2, 2)?.reply()?;
            // Only XI2 delivers generic events
            if reply.major_version < 2 {
                return Err(EventError::ExtensionUnavailable(extension.wire_name()).into());
            }
            (reply.major_version.into(), reply.minor_version.into())
        }
        Extension::RandR => {
            let reply = conn.randr_query_version(1, 5)?.reply()?;
            (reply.major_version, reply.minor_version)
        }
    };

    Ok(ExtensionInfo {
        event_base: present.first_event.into(),
        major_opcode: present.major_opcode.into(),
        version,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::IoSlice;

    use x11rb::connection::{BufWithFds, DiscardMode, ReplyOrError, RequestKind, SequenceNumber};
    use x11rb::cookie::{Cookie, CookieWithFds, VoidCookie};
    use x11rb::errors::{ConnectionError, ParseError};
    use x11rb::protocol::Event;
    use x11rb::utils::RawFdContainer;
    use x11rb::x11_utils::{ExtensionInformation, Serialize, TryParse, TryParseFd, X11Error};

    use super::*;

    const XI_OPCODE: u8 = 131;

    /// Server that only knows XInputExtension and answers XIQueryVersion.
    struct XInputServer {
        version: (u16, u16),
        queried: RefCell<Vec<&'static str>>,
    }

    impl XInputServer {
        fn new(major: u16, minor: u16) -> Self {
            Self {
                version: (major, minor),
                queried: RefCell::new(Vec::new()),
            }
        }
    }

    impl RequestConnection for XInputServer {
        type Buf = Vec<u8>;

        fn send_request_with_reply<R>(
            &self,
            _: &[IoSlice<'_>],
            _: Vec<RawFdContainer>,
        ) -> Result<Cookie<'_, Self, R>, ConnectionError>
        where
            R: TryParse,
        {
            Ok(Cookie::new(self, 1))
        }

        fn send_request_with_reply_with_fds<R>(
            &self,
            _: &[IoSlice<'_>],
            _: Vec<RawFdContainer>,
        ) -> Result<CookieWithFds<'_, Self, R>, ConnectionError>
        where
            R: TryParseFd,
        {
            unimplemented!()
        }

        fn send_request_without_reply(
            &self,
            _: &[IoSlice<'_>],
            _: Vec<RawFdContainer>,
        ) -> Result<VoidCookie<'_, Self>, ConnectionError> {
            unimplemented!()
        }

        fn discard_reply(&self, _: SequenceNumber, _: RequestKind, _: DiscardMode) {}

        fn prefetch_extension_information(&self, _: &'static str) -> Result<(), ConnectionError> {
            Ok(())
        }

        fn extension_information(
            &self,
            extension_name: &'static str,
        ) -> Result<Option<ExtensionInformation>, ConnectionError> {
            self.queried.borrow_mut().push(extension_name);
            Ok((extension_name == xinput::X11_EXTENSION_NAME).then_some(ExtensionInformation {
                major_opcode: XI_OPCODE,
                first_event: 0,
                first_error: 0,
            }))
        }

        fn wait_for_reply_or_raw_error(
            &self,
            sequence: SequenceNumber,
        ) -> Result<ReplyOrError<Self::Buf>, ConnectionError> {
            let reply = xinput::XIQueryVersionReply {
                sequence: sequence as u16,
                length: 0,
                major_version: self.version.0,
                minor_version: self.version.1,
            };
            Ok(ReplyOrError::Reply(reply.serialize().to_vec()))
        }

        fn wait_for_reply(&self, _: SequenceNumber) -> Result<Option<Self::Buf>, ConnectionError> {
            unimplemented!()
        }

        fn wait_for_reply_with_fds_raw(
            &self,
            _: SequenceNumber,
        ) -> Result<ReplyOrError<BufWithFds<Self::Buf>, Self::Buf>, ConnectionError> {
            unimplemented!()
        }

        fn check_for_raw_error(
            &self,
            _: SequenceNumber,
        ) -> Result<Option<Self::Buf>, ConnectionError> {
            unimplemented!()
        }

        fn prefetch_maximum_request_bytes(&self) {}

        fn maximum_request_bytes(&self) -> usize {
            4 * 65535
        }

        fn parse_error(&self, _: &[u8]) -> Result<X11Error, ParseError> {
            unimplemented!()
        }

        fn parse_event(&self, _: &[u8]) -> Result<Event, ParseError> {
            unimplemented!()
        }
    }

    #[test]
    fn xi2_is_detected_with_opcode_and_version() {
        let server = XInputServer::new(2, 2);
        let info = probe(&server, Extension::XInput).unwrap();
        assert_eq!(
            info,
            ExtensionInfo {
                event_base: 0,
                major_opcode: XI_OPCODE.into(),
                version: (2, 2),
            }
        );
    }

    #[test]
    fn xinput_1_is_not_enough() {
        let server = XInputServer::new(1, 5);
        assert!(probe(&server, Extension::XInput).is_none());

        let err = query(&server, Extension::XInput).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EventError>(),
            Some(EventError::ExtensionUnavailable(name)) if *name == xinput::X11_EXTENSION_NAME
        ));
    }

    #[test]
    fn absent_extension_is_not_fatal() {
        let server = XInputServer::new(2, 2);
        assert!(probe(&server, Extension::Damage).is_none());
        let err = query(&server, Extension::RandR).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EventError>(),
            Some(EventError::ExtensionUnavailable(_))
        ));
    }

    #[test]
    fn probe_all_skips_extensions_disabled_in_config() {
        let server = XInputServer::new(2, 2);
        let set = probe_all(&server, &ExtensionsConfig::default());
        assert!(set.get(Extension::XInput).is_some());
        assert_eq!(set.iter().count(), 1);
        let queried = server.queried.borrow();
        assert!(Extension::ALL.iter().all(|ext| queried.contains(&ext.wire_name())));
        drop(queried);

        let server = XInputServer::new(2, 2);
        let config = ExtensionsConfig {
            xinput: false,
            shape: false,
            ..ExtensionsConfig::default()
        };
        let set = probe_all(&server, &config);
        assert!(set.get(Extension::XInput).is_none());
        assert!(!server.queried.borrow().contains(&xinput::X11_EXTENSION_NAME));
        assert!(!server.queried.borrow().contains(&shape::X11_EXTENSION_NAME));
    }
}
