//! Binary codec for encoding and decoding SCMP protocol messages.
//!
//! Wire format:
//! ```text
//! [type_code:2][total_length:2][payload:total_length-4]
//! ```
//! Total header size: 4 bytes.  All multi-byte integers use the negotiated
//! [`Endianness`]; encoding or decoding with an unknown order fails.

use thiserror::Error;

use crate::protocol::endian::Endianness;
use crate::protocol::messages::{
    BreakpointRef, Header, MessageType, ProtocolVersion, ScmpMessage, ENDIANNESS_MARKER,
    HEADER_SIZE,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// No byte order has been negotiated for this session yet.
    #[error("byte order has not been negotiated")]
    EndiannessUnknown,

    /// The header's `total_length` is smaller than the header itself.
    #[error("invalid message length: {declared}")]
    InvalidLength { declared: u16 },

    /// The encoded message does not fit in the 16-bit length field.
    #[error("message too large: {size} bytes")]
    MessageTooLarge { size: usize },

    /// The payload could not be parsed (truncated field, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A textual protocol version could not be parsed.
    #[error("invalid protocol version: {0:?}")]
    InvalidVersion(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`ScmpMessage`] into a byte vector including the 4-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError::EndiannessUnknown`] if `order` is unknown and
/// [`ProtocolError::MessageTooLarge`] if the message exceeds `u16::MAX` bytes.
///
/// # Examples
///
/// ```rust
/// use scmp_core::protocol::{decode_message, encode_message, Endianness};
/// use scmp_core::ScmpMessage;
///
/// let bytes = encode_message(&ScmpMessage::Ready, Endianness::Big).unwrap();
/// let (decoded, consumed) = decode_message(&bytes, Endianness::Big).unwrap();
/// assert_eq!(decoded, ScmpMessage::Ready);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &ScmpMessage, order: Endianness) -> Result<Vec<u8>, ProtocolError> {
    if !order.is_known() {
        return Err(ProtocolError::EndiannessUnknown);
    }
    let payload = encode_payload(msg, order)?;
    let total = HEADER_SIZE + payload.len();
    let total_length =
        u16::try_from(total).map_err(|_| ProtocolError::MessageTooLarge { size: total })?;

    let mut buf = Vec::with_capacity(total);
    order.write_u16(&mut buf, msg.type_code())?;
    order.write_u16(&mut buf, total_length)?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decodes the 4-byte header at the start of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 4 bytes are
/// available and [`ProtocolError::EndiannessUnknown`] without a negotiated order.
pub fn decode_header(bytes: &[u8], order: Endianness) -> Result<Header, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    Ok(Header {
        type_code: order.read_u16(bytes, 0)?,
        total_length: order.read_u16(bytes, 2)?,
    })
}

/// Decodes one [`ScmpMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes it occupied, so
/// the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are incomplete or malformed.
pub fn decode_message(bytes: &[u8], order: Endianness) -> Result<(ScmpMessage, usize), ProtocolError> {
    let header = decode_header(bytes, order)?;
    let total = header.total_length as usize;
    if total < HEADER_SIZE {
        return Err(ProtocolError::InvalidLength {
            declared: header.total_length,
        });
    }
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let payload = &bytes[HEADER_SIZE..total];
    let msg = match MessageType::try_from(header.type_code) {
        Ok(ty) => decode_payload(ty, payload, order)?,
        Err(()) => ScmpMessage::Data {
            type_code: header.type_code,
            payload: payload.to_vec(),
        },
    };
    Ok((msg, total))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &ScmpMessage, order: Endianness) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match msg {
        ScmpMessage::Endianness => order.write_u16(&mut buf, ENDIANNESS_MARKER)?,
        ScmpMessage::Version(v) => {
            order.write_u16(&mut buf, v.major)?;
            order.write_u16(&mut buf, v.minor)?;
        }
        ScmpMessage::BreakpointBegin(bp) => encode_breakpoint_ref(&mut buf, bp, order)?,
        ScmpMessage::BreakpointSync(data) | ScmpMessage::BreakpointEnd(data) => {
            buf.extend_from_slice(data)
        }
        ScmpMessage::Data { payload, .. } => buf.extend_from_slice(payload),
        ScmpMessage::Success
        | ScmpMessage::Failure
        | ScmpMessage::Authenticated
        | ScmpMessage::PluginsReady
        | ScmpMessage::Ready
        | ScmpMessage::Disconnect
        | ScmpMessage::DebugStart
        | ScmpMessage::DebugStop
        | ScmpMessage::StepInto
        | ScmpMessage::StepOver
        | ScmpMessage::StepOut
        | ScmpMessage::BreakpointContinue => {} // empty payload
    }
    Ok(buf)
}

fn encode_breakpoint_ref(
    buf: &mut Vec<u8>,
    bp: &BreakpointRef,
    order: Endianness,
) -> Result<(), ProtocolError> {
    let path = bp.relative_file_path.as_bytes();
    let path_len = u16::try_from(path.len()).map_err(|_| ProtocolError::MessageTooLarge {
        size: path.len(),
    })?;
    order.write_u16(buf, bp.plugin_id)?;
    order.write_u32(buf, bp.line)?;
    order.write_u16(buf, path_len)?;
    buf.extend_from_slice(path);
    Ok(())
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(
    ty: MessageType,
    payload: &[u8],
    order: Endianness,
) -> Result<ScmpMessage, ProtocolError> {
    let msg = match ty {
        MessageType::Endianness => {
            let marker = order.read_u16(payload, 0).map_err(|e| malformed("Endianness", e))?;
            if marker != ENDIANNESS_MARKER {
                return Err(ProtocolError::MalformedPayload(format!(
                    "endianness marker 0x{marker:04X}"
                )));
            }
            ScmpMessage::Endianness
        }
        MessageType::Version => {
            let major = order.read_u16(payload, 0).map_err(|e| malformed("Version", e))?;
            let minor = order.read_u16(payload, 2).map_err(|e| malformed("Version", e))?;
            ScmpMessage::Version(ProtocolVersion::new(major, minor))
        }
        MessageType::Success => ScmpMessage::Success,
        MessageType::Failure => ScmpMessage::Failure,
        MessageType::Authenticated => ScmpMessage::Authenticated,
        MessageType::PluginsReady => ScmpMessage::PluginsReady,
        MessageType::Ready => ScmpMessage::Ready,
        MessageType::Disconnect => ScmpMessage::Disconnect,
        MessageType::DebugStart => ScmpMessage::DebugStart,
        MessageType::DebugStop => ScmpMessage::DebugStop,
        MessageType::StepInto => ScmpMessage::StepInto,
        MessageType::StepOver => ScmpMessage::StepOver,
        MessageType::StepOut => ScmpMessage::StepOut,
        MessageType::BreakpointBegin => {
            ScmpMessage::BreakpointBegin(decode_breakpoint_ref(payload, order)?)
        }
        MessageType::BreakpointSync => ScmpMessage::BreakpointSync(payload.to_vec()),
        MessageType::BreakpointEnd => ScmpMessage::BreakpointEnd(payload.to_vec()),
        MessageType::BreakpointContinue => ScmpMessage::BreakpointContinue,
    };
    Ok(msg)
}

fn decode_breakpoint_ref(p: &[u8], order: Endianness) -> Result<BreakpointRef, ProtocolError> {
    // 2 (plugin) + 4 (line) + 2 (path_len) + path
    let plugin_id = order.read_u16(p, 0).map_err(|e| malformed("BreakpointBegin", e))?;
    let line = order.read_u32(p, 2).map_err(|e| malformed("BreakpointBegin", e))?;
    let path_len = order.read_u16(p, 6).map_err(|e| malformed("BreakpointBegin", e))? as usize;
    let raw = p.get(8..8 + path_len).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!(
            "BreakpointBegin: path needs {path_len} bytes, {} available",
            p.len().saturating_sub(8)
        ))
    })?;
    let relative_file_path = std::str::from_utf8(raw)
        .map_err(|e| ProtocolError::MalformedPayload(format!("BreakpointBegin: path not UTF-8: {e}")))?
        .to_string();
    Ok(BreakpointRef {
        plugin_id,
        relative_file_path,
        line,
    })
}

fn malformed(context: &str, err: ProtocolError) -> ProtocolError {
    match err {
        ProtocolError::InsufficientData { needed, available } => ProtocolError::MalformedPayload(
            format!("{context}: need {needed} bytes, got {available}"),
        ),
        other => other,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
