//! Byte-order handling and the endianness handshake.
//!
//! # Why negotiate byte order? (for beginners)
//!
//! The remote script runtime writes integers in its *native* byte order, which
//! may be little-endian (x86, ARM in most configurations) or big-endian (some
//! console and embedded targets).  Instead of forcing one order on the wire,
//! the runtime opens every connection with an ENDIANNESS announcement and the
//! debugger adapts to whatever order that message uses.
//!
//! The announcement is a 6-byte message:
//!
//! ```text
//! little-endian: 01 00 | 06 00 | 02 01
//! big-endian:    00 01 | 00 06 | 01 02
//!                type    length  marker (0x0102)
//! ```
//!
//! Because the type code `0x0001` reads differently under each order, the first
//! two bytes are enough to pick a candidate order.  The marker then confirms
//! it once the whole message has arrived.

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;
use crate::protocol::messages::{MessageType, ENDIANNESS_MARKER, HEADER_SIZE, RECEIVE_CAPACITY};

/// Byte order used for every multi-byte field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endianness {
    /// No ENDIANNESS announcement has been processed yet.
    #[default]
    Unknown,
    Little,
    Big,
}

impl Endianness {
    /// Whether a concrete order has been negotiated.
    pub fn is_known(self) -> bool {
        !matches!(self, Endianness::Unknown)
    }

    /// Picks the candidate order from the first two bytes of a message, which
    /// must be the ENDIANNESS type code under exactly one order.
    pub fn detect(bytes: &[u8]) -> Option<Endianness> {
        let code = bytes.get(..2)?;
        let announcement = MessageType::Endianness as u16;
        if code == announcement.to_le_bytes() {
            Some(Endianness::Little)
        } else if code == announcement.to_be_bytes() {
            Some(Endianness::Big)
        } else {
            None
        }
    }

    pub fn read_u16(self, buf: &[u8], offset: usize) -> Result<u16, ProtocolError> {
        let raw: [u8; 2] = take(buf, offset)?;
        match self {
            Endianness::Little => Ok(u16::from_le_bytes(raw)),
            Endianness::Big => Ok(u16::from_be_bytes(raw)),
            Endianness::Unknown => Err(ProtocolError::EndiannessUnknown),
        }
    }

    pub fn read_u32(self, buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
        let raw: [u8; 4] = take(buf, offset)?;
        match self {
            Endianness::Little => Ok(u32::from_le_bytes(raw)),
            Endianness::Big => Ok(u32::from_be_bytes(raw)),
            Endianness::Unknown => Err(ProtocolError::EndiannessUnknown),
        }
    }

    pub fn write_u16(self, buf: &mut Vec<u8>, value: u16) -> Result<(), ProtocolError> {
        match self {
            Endianness::Little => buf.extend_from_slice(&value.to_le_bytes()),
            Endianness::Big => buf.extend_from_slice(&value.to_be_bytes()),
            Endianness::Unknown => return Err(ProtocolError::EndiannessUnknown),
        }
        Ok(())
    }

    pub fn write_u32(self, buf: &mut Vec<u8>, value: u32) -> Result<(), ProtocolError> {
        match self {
            Endianness::Little => buf.extend_from_slice(&value.to_le_bytes()),
            Endianness::Big => buf.extend_from_slice(&value.to_be_bytes()),
            Endianness::Unknown => return Err(ProtocolError::EndiannessUnknown),
        }
        Ok(())
    }
}

fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], ProtocolError> {
    buf.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(ProtocolError::InsufficientData {
            needed: offset + N,
            available: buf.len(),
        })
}

// ── Negotiator ────────────────────────────────────────────────────────────────

/// Result of inspecting the receive buffer while the order is still unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// The announcement has not fully arrived yet.
    NeedMoreData,
    /// The announcement is complete and confirms this order.  The caller must
    /// consume `consumed` bytes.
    Resolved { order: Endianness, consumed: usize },
    /// The leading bytes are not a valid announcement under either order.
    Indeterminate,
}

/// Tracks the negotiated byte order for one session.
///
/// The order is locked in by the first successful [`resolve`](Self::resolve)
/// and only returns to [`Endianness::Unknown`] through [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct EndiannessNegotiator {
    order: Endianness,
}

impl EndiannessNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently negotiated order.
    pub fn order(&self) -> Endianness {
        self.order
    }

    pub fn is_resolved(&self) -> bool {
        self.order.is_known()
    }

    /// Inspects the start of `bytes` for an ENDIANNESS announcement.
    ///
    /// Once an order has been resolved this is a no-op that reports the
    /// locked-in order with nothing to consume.
    pub fn resolve(&mut self, bytes: &[u8]) -> Negotiation {
        if self.order.is_known() {
            return Negotiation::Resolved {
                order: self.order,
                consumed: 0,
            };
        }
        if bytes.len() < 2 {
            return Negotiation::NeedMoreData;
        }
        let Some(order) = Endianness::detect(bytes) else {
            return Negotiation::Indeterminate;
        };
        if bytes.len() < HEADER_SIZE {
            return Negotiation::NeedMoreData;
        }
        let total = match order.read_u16(bytes, 2) {
            Ok(total) => total as usize,
            Err(_) => return Negotiation::Indeterminate,
        };
        // An announcement that cannot fit the receive buffer never completes.
        if total < HEADER_SIZE + 2 || total > RECEIVE_CAPACITY {
            return Negotiation::Indeterminate;
        }
        if bytes.len() < total {
            return Negotiation::NeedMoreData;
        }
        match order.read_u16(bytes, HEADER_SIZE) {
            Ok(ENDIANNESS_MARKER) => {
                self.order = order;
                Negotiation::Resolved {
                    order,
                    consumed: total,
                }
            }
            _ => Negotiation::Indeterminate,
        }
    }

    /// Forgets the negotiated order.  Called on every disconnect.
    pub fn reset(&mut self) {
        self.order = Endianness::Unknown;
    }
}
