//! Receive framing: turns an arbitrary stream of byte chunks into whole messages.
//!
//! # Why a framer? (for beginners)
//!
//! TCP delivers a *stream* of bytes, not discrete messages.  One `read` may
//! return half a message, exactly one message, or three and a half messages.
//! The framer accumulates chunks in a fixed-size buffer until the header's
//! `total_length` bytes are present, hands the complete message out, and
//! shifts whatever remains to the front for the next round.
//!
//! ```text
//! append(chunk) ─► [ hdr | payload | hdr | pay… ]   size = 11
//!                   └── frame() ──┘
//! consume(total_length)
//!                ─► [ hdr | pay… ]                  size = 5
//! ```
//!
//! The buffer never grows.  Appending past its capacity fails without touching
//! the stored bytes, and the caller treats the connection as unrecoverable.

use thiserror::Error;
use tracing::trace;

use crate::protocol::codec::{decode_header, decode_message, ProtocolError};
use crate::protocol::endian::{Endianness, EndiannessNegotiator, Negotiation};
use crate::protocol::messages::{Header, ScmpMessage, HEADER_SIZE, RECEIVE_CAPACITY};

/// Appending would exceed the buffer capacity.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("receive buffer overflow: {size} buffered + {incoming} incoming > {capacity} capacity")]
pub struct OverflowError {
    pub size: usize,
    pub incoming: usize,
    pub capacity: usize,
}

/// Fixed-capacity receive buffer.
///
/// Invariant: `size <= capacity` at all times.
pub struct ReceiveBuffer {
    data: Box<[u8]>,
    size: usize,
}

impl ReceiveBuffer {
    /// Creates an empty buffer with the protocol capacity of
    /// [`RECEIVE_CAPACITY`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(RECEIVE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The buffered bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Copies `bytes` to the tail of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`OverflowError`] if the bytes do not fit; the buffer is left
    /// exactly as it was.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), OverflowError> {
        let end = self.size + bytes.len();
        if end > self.capacity() {
            return Err(OverflowError {
                size: self.size,
                incoming: bytes.len(),
                capacity: self.capacity(),
            });
        }
        self.data[self.size..end].copy_from_slice(bytes);
        self.size = end;
        Ok(())
    }

    /// Removes the first `n` bytes, shifting the remainder to offset 0.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the number of buffered bytes.  Callers only consume
    /// bytes they have just verified are present.
    pub fn consume(&mut self, n: usize) {
        assert!(
            n <= self.size,
            "consume({n}) past end of receive buffer (size {})",
            self.size
        );
        self.data.copy_within(n..self.size, 0);
        self.size -= n;
    }

    /// Decodes the leading header, if enough bytes are buffered and the byte
    /// order is known.
    pub fn peek_header(&self, order: Endianness) -> Option<Header> {
        if self.size < HEADER_SIZE {
            return None;
        }
        decode_header(self.as_slice(), order).ok()
    }

    /// Returns the complete leading message described by `header`, or `None`
    /// if it has not fully arrived yet.
    pub fn frame(&self, header: &Header) -> Option<&[u8]> {
        let total = header.total_length as usize;
        if total < HEADER_SIZE || self.size < total {
            return None;
        }
        Some(&self.data[..total])
    }

    /// Discards all buffered bytes.
    pub fn reset(&mut self) {
        self.size = 0;
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("size", &self.size)
            .field("capacity", &self.capacity())
            .finish()
    }
}

// ── Framer ────────────────────────────────────────────────────────────────────

/// Unrecoverable framing failures.  Every variant means the stream can no
/// longer be trusted and the connection must be torn down.
#[derive(Debug, Error, PartialEq)]
pub enum FramingError {
    #[error(transparent)]
    Overflow(#[from] OverflowError),

    /// The first message was not a valid ENDIANNESS announcement.
    #[error("could not determine byte order from the first message")]
    UndeterminedEndianness,

    /// A header declared a length that can never complete in the buffer.
    #[error("invalid message length {total_length} for type 0x{type_code:04X}")]
    InvalidLength { type_code: u16, total_length: u16 },
}

/// One complete message lifted out of the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    /// The raw message bytes, header included.
    pub bytes: Vec<u8>,
}

impl Frame {
    /// Decodes the frame under the session's byte order.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if a reserved message has a malformed payload.
    pub fn decode(&self, order: Endianness) -> Result<ScmpMessage, ProtocolError> {
        decode_message(&self.bytes, order).map(|(msg, _)| msg)
    }
}

/// Receive-side framing for one session: the bounded buffer plus the byte
/// order negotiated from its first message.
///
/// Typical use from a transport delivery callback:
///
/// ```rust
/// use scmp_core::protocol::{Endianness, Framer};
///
/// let mut framer = Framer::new();
/// framer.push(&[0x01, 0x00, 0x06]).unwrap();
/// assert_eq!(framer.next_frame(), Ok(None)); // waits for more data
/// framer.push(&[0x00, 0x02, 0x01]).unwrap();
/// let frame = framer.next_frame().unwrap().unwrap();
/// assert_eq!(framer.order(), Endianness::Little);
/// assert_eq!(frame.bytes.len(), 6);
/// ```
#[derive(Debug, Default)]
pub struct Framer {
    buffer: ReceiveBuffer,
    negotiator: EndiannessNegotiator,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The byte order negotiated for this session.
    pub fn order(&self) -> Endianness {
        self.negotiator.order()
    }

    /// Number of bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of bytes that can still be pushed without overflowing.
    pub fn free_space(&self) -> usize {
        self.buffer.capacity() - self.buffer.len()
    }

    /// Appends a transport chunk.
    ///
    /// # Errors
    ///
    /// Returns [`OverflowError`] if the chunk does not fit; nothing is appended.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), OverflowError> {
        self.buffer.append(chunk)
    }

    /// Lifts the next complete message out of the buffer.
    ///
    /// Returns `Ok(None)` when the leading message has not fully arrived yet;
    /// this is the only point where receive processing waits.  While the byte
    /// order is unknown the leading message must be the ENDIANNESS
    /// announcement, which is returned like any other frame once it resolves
    /// the order.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError`] when the stream can no longer be framed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        if !self.negotiator.is_resolved() {
            return match self.negotiator.resolve(self.buffer.as_slice()) {
                Negotiation::NeedMoreData => Ok(None),
                Negotiation::Indeterminate => Err(FramingError::UndeterminedEndianness),
                Negotiation::Resolved { order, consumed } => {
                    trace!(?order, consumed, "byte order resolved");
                    let header = decode_header(self.buffer.as_slice(), order)
                        .map_err(|_| FramingError::UndeterminedEndianness)?;
                    Ok(Some(self.take(header, consumed)))
                }
            };
        }

        let Some(header) = self.buffer.peek_header(self.order()) else {
            return Ok(None);
        };
        if !header.is_valid_length() {
            return Err(FramingError::InvalidLength {
                type_code: header.type_code,
                total_length: header.total_length,
            });
        }
        let total = header.total_length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }
        Ok(Some(self.take(header, total)))
    }

    fn take(&mut self, header: Header, total: usize) -> Frame {
        let bytes = self.buffer.as_slice()[..total].to_vec();
        self.buffer.consume(total);
        Frame { header, bytes }
    }

    /// Discards buffered bytes and forgets the byte order.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.negotiator.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::encode_message;
    use crate::protocol::messages::ScmpMessage;

    #[test]
    fn test_new_buffer_has_protocol_capacity() {
        let buf = ReceiveBuffer::new();
        assert_eq!(buf.capacity(), 4096);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_append_then_consume_shifts_remainder_to_front() {
        // Arrange
        let mut buf = ReceiveBuffer::with_capacity(16);
        buf.append(&[1, 2, 3, 4, 5]).unwrap();

        // Act
        buf.consume(2);

        // Assert
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_append_to_exact_capacity_succeeds() {
        let mut buf = ReceiveBuffer::with_capacity(4);
        assert!(buf.append(&[1, 2]).is_ok());
        assert!(buf.append(&[3, 4]).is_ok());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_append_overflow_leaves_buffer_unchanged() {
        // Arrange
        let mut buf = ReceiveBuffer::with_capacity(8);
        buf.append(&[9, 8, 7, 6, 5]).unwrap();

        // Act
        let result = buf.append(&[1, 2, 3, 4]);

        // Assert
        assert_eq!(
            result,
            Err(OverflowError {
                size: 5,
                incoming: 4,
                capacity: 8
            })
        );
        assert_eq!(buf.as_slice(), &[9, 8, 7, 6, 5]);
    }

    #[test]
    #[should_panic(expected = "past end of receive buffer")]
    fn test_consume_past_size_panics() {
        let mut buf = ReceiveBuffer::with_capacity(8);
        buf.append(&[1, 2]).unwrap();
        buf.consume(3);
    }

    #[test]
    fn test_peek_header_requires_full_header_and_known_order() {
        let mut buf = ReceiveBuffer::new();
        buf.append(&[0x07, 0x00, 0x04]).unwrap();
        assert_eq!(buf.peek_header(Endianness::Little), None);

        buf.append(&[0x00]).unwrap();
        assert_eq!(buf.peek_header(Endianness::Unknown), None);
        assert_eq!(
            buf.peek_header(Endianness::Little),
            Some(Header {
                type_code: 0x0007,
                total_length: 4
            })
        );
    }

    #[test]
    fn test_frame_waits_for_full_message() {
        // Arrange
        let bytes =
            encode_message(&ScmpMessage::BreakpointSync(vec![1; 10]), Endianness::Big).unwrap();
        let mut buf = ReceiveBuffer::new();
        buf.append(&bytes[..9]).unwrap();
        let header = buf.peek_header(Endianness::Big).unwrap();

        // Act / Assert
        assert!(buf.frame(&header).is_none());
        buf.append(&bytes[9..]).unwrap();
        assert_eq!(buf.frame(&header), Some(bytes.as_slice()));
    }

    #[test]
    fn test_reset_discards_partial_message() {
        let mut buf = ReceiveBuffer::new();
        buf.append(&[1, 2, 3]).unwrap();
        buf.reset();
        assert!(buf.is_empty());
        assert!(buf.append(&[0; 4096]).is_ok());
    }

    // ── Framer ────────────────────────────────────────────────────────────────

    fn little_stream(msgs: &[ScmpMessage]) -> Vec<u8> {
        let mut out = encode_message(&ScmpMessage::Endianness, Endianness::Little).unwrap();
        for msg in msgs {
            out.extend(encode_message(msg, Endianness::Little).unwrap());
        }
        out
    }

    fn drain(framer: &mut Framer) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = framer.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_framer_extracts_multiple_messages_from_one_chunk() {
        // Arrange
        let mut framer = Framer::new();
        framer
            .push(&little_stream(&[ScmpMessage::Authenticated, ScmpMessage::Ready]))
            .unwrap();

        // Act
        let frames = drain(&mut framer);

        // Assert
        let decoded: Vec<_> = frames
            .iter()
            .map(|f| f.decode(framer.order()).unwrap())
            .collect();
        assert_eq!(
            decoded,
            vec![
                ScmpMessage::Endianness,
                ScmpMessage::Authenticated,
                ScmpMessage::Ready
            ]
        );
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_framer_reassembles_message_split_at_every_boundary() {
        let msg = ScmpMessage::BreakpointBegin(crate::BreakpointRef {
            plugin_id: 1,
            relative_file_path: "a.lua".to_string(),
            line: 10,
        });
        let stream = little_stream(std::slice::from_ref(&msg));

        for split in 1..stream.len() {
            let mut framer = Framer::new();
            let mut frames = Vec::new();
            for chunk in [&stream[..split], &stream[split..]] {
                framer.push(chunk).unwrap();
                frames.extend(drain(&mut framer));
            }
            assert_eq!(frames.len(), 2, "split at {split}");
            assert_eq!(frames[1].decode(framer.order()).unwrap(), msg);
        }
    }

    #[test]
    fn test_framer_reports_indeterminate_first_message() {
        let mut framer = Framer::new();
        framer
            .push(&encode_message(&ScmpMessage::Ready, Endianness::Little).unwrap())
            .unwrap();
        assert_eq!(framer.next_frame(), Err(FramingError::UndeterminedEndianness));
    }

    #[test]
    fn test_framer_rejects_oversized_announcement_immediately() {
        let mut framer = Framer::new();
        framer.push(&[0x01, 0x00, 0xFF, 0xFF, 0x02, 0x01]).unwrap();
        assert_eq!(framer.next_frame(), Err(FramingError::UndeterminedEndianness));
    }

    #[test]
    fn test_free_space_tracks_buffered_bytes() {
        let mut framer = Framer::new();
        assert_eq!(framer.free_space(), RECEIVE_CAPACITY);
        framer.push(&[0x01, 0x00, 0x06]).unwrap();
        assert_eq!(framer.free_space(), RECEIVE_CAPACITY - 3);
        framer.push(&[0x00, 0x02, 0x01]).unwrap();
        framer.next_frame().unwrap();
        assert_eq!(framer.free_space(), RECEIVE_CAPACITY);
    }

    #[test]
    fn test_framer_rejects_header_longer_than_capacity() {
        let mut framer = Framer::new();
        let mut stream = little_stream(&[]);
        stream.extend_from_slice(&[0x00, 0x03, 0x01, 0x10]); // total_length = 0x1001
        framer.push(&stream).unwrap();

        assert!(framer.next_frame().unwrap().is_some()); // announcement
        assert_eq!(
            framer.next_frame(),
            Err(FramingError::InvalidLength {
                type_code: 0x0300,
                total_length: 0x1001
            })
        );
    }

    #[test]
    fn test_framer_second_announcement_is_an_ordinary_frame() {
        // Arrange: little-endian session that announces itself twice.
        let mut framer = Framer::new();
        let stream = little_stream(&[ScmpMessage::Endianness]);
        framer.push(&stream).unwrap();

        // Act
        let frames = drain(&mut framer);

        // Assert: the order stays little-endian.
        assert_eq!(frames.len(), 2);
        assert_eq!(framer.order(), Endianness::Little);
    }

    #[test]
    fn test_framer_reset_forgets_order_and_bytes() {
        let mut framer = Framer::new();
        framer.push(&little_stream(&[])).unwrap();
        framer.push(&[0x07]).unwrap();
        drain(&mut framer);

        framer.reset();

        assert_eq!(framer.order(), Endianness::Unknown);
        assert_eq!(framer.buffered(), 0);
    }
}
