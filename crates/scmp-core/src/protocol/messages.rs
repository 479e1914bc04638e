//! All SCMP protocol message types.
//!
//! Every message starts with a 4-byte header (`type_code: u16`,
//! `total_length: u16`) followed by the payload.  Multi-byte integers use the
//! byte order negotiated by the first message of the connection, see
//! [`crate::protocol::endian`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Capacity of the receive buffer.  No single message may be larger.
pub const RECEIVE_CAPACITY: usize = 4096;

/// Payload of the Endianness announcement, written in the sender's byte order.
pub const ENDIANNESS_MARKER: u16 = 0x0102;

/// Oldest remote protocol version this engine accepts.
pub const MIN_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::new(4, 0);

/// Protocol version implemented by this engine.
pub const LOCAL_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::new(5, 1);

// ── Message type codes ────────────────────────────────────────────────────────

/// Reserved message type codes.
///
/// Any code not listed here is carried as [`ScmpMessage::Data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MessageType {
    // Handshake (0x0001–0x000F)
    Endianness = 0x0001,
    Version = 0x0002,
    Success = 0x0003,
    Failure = 0x0004,
    Authenticated = 0x0005,
    PluginsReady = 0x0006,
    Ready = 0x0007,
    Disconnect = 0x0008,
    // Execution control (0x0010–0x001F)
    DebugStart = 0x0010,
    DebugStop = 0x0011,
    StepInto = 0x0012,
    StepOver = 0x0013,
    StepOut = 0x0014,
    // Breakpoint handshake (0x0020–0x002F)
    BreakpointBegin = 0x0020,
    BreakpointSync = 0x0021,
    BreakpointEnd = 0x0022,
    BreakpointContinue = 0x0023,
}

impl TryFrom<u16> for MessageType {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, ()> {
        match value {
            0x0001 => Ok(MessageType::Endianness),
            0x0002 => Ok(MessageType::Version),
            0x0003 => Ok(MessageType::Success),
            0x0004 => Ok(MessageType::Failure),
            0x0005 => Ok(MessageType::Authenticated),
            0x0006 => Ok(MessageType::PluginsReady),
            0x0007 => Ok(MessageType::Ready),
            0x0008 => Ok(MessageType::Disconnect),
            0x0010 => Ok(MessageType::DebugStart),
            0x0011 => Ok(MessageType::DebugStop),
            0x0012 => Ok(MessageType::StepInto),
            0x0013 => Ok(MessageType::StepOver),
            0x0014 => Ok(MessageType::StepOut),
            0x0020 => Ok(MessageType::BreakpointBegin),
            0x0021 => Ok(MessageType::BreakpointSync),
            0x0022 => Ok(MessageType::BreakpointEnd),
            0x0023 => Ok(MessageType::BreakpointContinue),
            _ => Err(()),
        }
    }
}

// ── Common message header ─────────────────────────────────────────────────────

/// 4-byte header prepended to every message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Identifies the payload type.  Reserved codes map to [`MessageType`].
    pub type_code: u16,
    /// Length of the whole message, header included.
    pub total_length: u16,
}

impl Header {
    /// Number of payload bytes that follow the header.
    pub fn payload_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(HEADER_SIZE)
    }

    /// Whether `total_length` could ever describe a complete message that fits
    /// in the receive buffer.
    pub fn is_valid_length(&self) -> bool {
        let total = self.total_length as usize;
        (HEADER_SIZE..=RECEIVE_CAPACITY).contains(&total)
    }
}

// ── Protocol version ──────────────────────────────────────────────────────────

/// Numeric `major.minor` protocol version, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Creates a version from its components.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Returns `true` when `min <= self <= max`.
    pub fn is_within(&self, min: ProtocolVersion, max: ProtocolVersion) -> bool {
        min <= *self && *self <= max
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidVersion(s.to_string());
        let (major, minor) = match s.trim().split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s.trim(), "0"),
        };
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProtocolVersion> for String {
    fn from(value: ProtocolVersion) -> Self {
        value.to_string()
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// Remote source location the target is halted at.
///
/// Carried by BREAKPOINT_BEGIN.  An empty `relative_file_path` means the target
/// could not map the halt to a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BreakpointRef {
    /// Plugin (script host) that owns the file.
    pub plugin_id: u16,
    /// File path relative to the plugin root, as reported by the target.
    pub relative_file_path: String,
    /// 1-based line number.
    pub line: u32,
}

impl BreakpointRef {
    /// Returns `false` when the target reported the file as unknown.
    pub fn is_file_known(&self) -> bool {
        !self.relative_file_path.is_empty()
    }
}

impl fmt::Display for BreakpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_file_known() {
            write!(f, "[{}] {}:{}", self.plugin_id, self.relative_file_path, self.line)
        } else {
            write!(f, "[{}] <unknown>:{}", self.plugin_id, self.line)
        }
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// The top-level SCMP message enum.
///
/// Every message that crosses the wire is represented by a variant here.
/// Reserved type codes always decode to their dedicated variant; every other
/// code decodes to [`ScmpMessage::Data`] with the payload untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmpMessage {
    /// Byte-order announcement; must be the first message on a connection.
    Endianness,
    /// Remote protocol version, sent while connecting.
    Version(ProtocolVersion),
    /// Positive reply to VERSION.
    Success,
    /// Negative reply to VERSION.
    Failure,
    /// The remote accepted this debugger.
    Authenticated,
    /// Remote plugins finished loading.
    PluginsReady,
    /// Outbound: acknowledges PLUGINS_READY.  Inbound: the session is ready.
    Ready,
    /// Either side is closing the session.
    Disconnect,
    DebugStart,
    DebugStop,
    StepInto,
    StepOver,
    StepOut,
    /// Phase 1 of a breakpoint hit.
    BreakpointBegin(BreakpointRef),
    /// Phase 2 of a breakpoint hit; opaque state transfer.
    BreakpointSync(Vec<u8>),
    /// Phase 3 of a breakpoint hit.
    BreakpointEnd(Vec<u8>),
    /// Execution resumed after a hit.
    BreakpointContinue,
    /// Any non-reserved message, forwarded opaquely.
    Data { type_code: u16, payload: Vec<u8> },
}

impl ScmpMessage {
    /// Returns the reserved [`MessageType`] of this message, or `None` for
    /// [`ScmpMessage::Data`].
    pub fn message_type(&self) -> Option<MessageType> {
        let ty = match self {
            ScmpMessage::Endianness => MessageType::Endianness,
            ScmpMessage::Version(_) => MessageType::Version,
            ScmpMessage::Success => MessageType::Success,
            ScmpMessage::Failure => MessageType::Failure,
            ScmpMessage::Authenticated => MessageType::Authenticated,
            ScmpMessage::PluginsReady => MessageType::PluginsReady,
            ScmpMessage::Ready => MessageType::Ready,
            ScmpMessage::Disconnect => MessageType::Disconnect,
            ScmpMessage::DebugStart => MessageType::DebugStart,
            ScmpMessage::DebugStop => MessageType::DebugStop,
            ScmpMessage::StepInto => MessageType::StepInto,
            ScmpMessage::StepOver => MessageType::StepOver,
            ScmpMessage::StepOut => MessageType::StepOut,
            ScmpMessage::BreakpointBegin(_) => MessageType::BreakpointBegin,
            ScmpMessage::BreakpointSync(_) => MessageType::BreakpointSync,
            ScmpMessage::BreakpointEnd(_) => MessageType::BreakpointEnd,
            ScmpMessage::BreakpointContinue => MessageType::BreakpointContinue,
            ScmpMessage::Data { .. } => return None,
        };
        Some(ty)
    }

    /// Returns the on-wire type code.
    pub fn type_code(&self) -> u16 {
        match self {
            ScmpMessage::Data { type_code, .. } => *type_code,
            // `message_type` is `Some` for every non-Data variant.
            other => other.message_type().map(|t| t as u16).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_try_from_round_trips_every_reserved_code() {
        let all = [
            MessageType::Endianness,
            MessageType::Version,
            MessageType::Success,
            MessageType::Failure,
            MessageType::Authenticated,
            MessageType::PluginsReady,
            MessageType::Ready,
            MessageType::Disconnect,
            MessageType::DebugStart,
            MessageType::DebugStop,
            MessageType::StepInto,
            MessageType::StepOver,
            MessageType::StepOut,
            MessageType::BreakpointBegin,
            MessageType::BreakpointSync,
            MessageType::BreakpointEnd,
            MessageType::BreakpointContinue,
        ];
        for ty in all {
            assert_eq!(MessageType::try_from(ty as u16), Ok(ty));
        }
    }

    #[test]
    fn test_message_type_try_from_rejects_unreserved_code() {
        assert_eq!(MessageType::try_from(0x0100), Err(()));
    }

    #[test]
    fn test_header_validity_bounds() {
        let too_short = Header { type_code: 1, total_length: 3 };
        let minimal = Header { type_code: 1, total_length: 4 };
        let maximal = Header { type_code: 1, total_length: RECEIVE_CAPACITY as u16 };
        let too_long = Header { type_code: 1, total_length: RECEIVE_CAPACITY as u16 + 1 };

        assert!(!too_short.is_valid_length());
        assert!(minimal.is_valid_length());
        assert!(maximal.is_valid_length());
        assert!(!too_long.is_valid_length());
        assert_eq!(minimal.payload_len(), 0);
    }

    #[test]
    fn test_protocol_version_ordering_is_lexicographic() {
        assert!(ProtocolVersion::new(5, 0) < ProtocolVersion::new(5, 1));
        assert!(ProtocolVersion::new(4, 9) < ProtocolVersion::new(5, 0));
    }

    #[test]
    fn test_protocol_version_is_within_inclusive_range() {
        let min = ProtocolVersion::new(4, 0);
        let max = ProtocolVersion::new(5, 1);

        assert!(min.is_within(min, max));
        assert!(max.is_within(min, max));
        assert!(ProtocolVersion::new(5, 0).is_within(min, max));
        assert!(!ProtocolVersion::new(3, 9).is_within(min, max));
        assert!(!ProtocolVersion::new(5, 2).is_within(min, max));
    }

    #[test]
    fn test_protocol_version_parses_dotted_and_bare_forms() {
        assert_eq!("5.1".parse::<ProtocolVersion>(), Ok(ProtocolVersion::new(5, 1)));
        assert_eq!("4".parse::<ProtocolVersion>(), Ok(ProtocolVersion::new(4, 0)));
        assert!("five".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn test_breakpoint_ref_unknown_file_display() {
        let bp = BreakpointRef {
            plugin_id: 2,
            relative_file_path: String::new(),
            line: 7,
        };
        assert!(!bp.is_file_known());
        assert_eq!(bp.to_string(), "[2] <unknown>:7");
    }

    #[test]
    fn test_data_message_reports_its_own_type_code() {
        let msg = ScmpMessage::Data {
            type_code: 0x4242,
            payload: vec![1, 2, 3],
        };
        assert_eq!(msg.type_code(), 0x4242);
        assert_eq!(msg.message_type(), None);
        assert_eq!(ScmpMessage::Ready.type_code(), MessageType::Ready as u16);
    }
}
