//! CommandSender: encodes outbound messages and writes them to the transport.
//!
//! The sender knows nothing about session state.  Gating (for example "no
//! StepInto while the target is running") happens one level up in the
//! session engine; by the time a message reaches this type it is sent.

use scmp_core::{encode_message, Endianness, ProtocolError, ScmpMessage};
use thiserror::Error;
use tracing::{debug, trace};

use crate::application::diagnostics::{DiagnosticsConfig, Direction};
use crate::application::transport::{Transport, TransportError};

/// Errors returned when a message could not be sent.
#[derive(Debug, Error)]
pub enum SendError {
    /// The transport has no established link.  Nothing was written.
    #[error("not connected")]
    NotConnected,
    /// No byte order has been negotiated yet, so nothing can be encoded.
    #[error("byte order has not been negotiated")]
    EndiannessUnknown,
    #[error("failed to encode message: {0}")]
    Encode(ProtocolError),
    #[error(transparent)]
    Transport(TransportError),
}

impl From<ProtocolError> for SendError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::EndiannessUnknown => SendError::EndiannessUnknown,
            other => SendError::Encode(other),
        }
    }
}

impl From<TransportError> for SendError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => SendError::NotConnected,
            other => SendError::Transport(other),
        }
    }
}

/// Outbound half of the session: owns the transport and the sent-traffic
/// recorder.
pub struct CommandSender<T: Transport> {
    transport: T,
    diagnostics: DiagnosticsConfig,
}

impl<T: Transport> CommandSender<T> {
    pub fn new(transport: T, diagnostics: DiagnosticsConfig) -> Self {
        Self {
            transport,
            diagnostics,
        }
    }

    /// Encodes `msg` under `order` and sends it.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotConnected`] if the transport has no link; callers
    /// must check rather than assume the message went out.
    #[must_use = "a disconnected transport is reported through the result"]
    pub fn send(&mut self, msg: &ScmpMessage, order: Endianness) -> Result<usize, SendError> {
        if !self.transport.is_connected() {
            return Err(SendError::NotConnected);
        }
        let bytes = encode_message(msg, order)?;
        debug!("sending {msg:?} ({} bytes)", bytes.len());
        self.write(&bytes)
    }

    /// Sends already-encoded bytes, used to echo handshake messages back
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    #[must_use = "a disconnected transport is reported through the result"]
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<usize, SendError> {
        if !self.transport.is_connected() {
            return Err(SendError::NotConnected);
        }
        trace!("echoing {} raw bytes", bytes.len());
        self.write(bytes)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, SendError> {
        let sent = self.transport.send(bytes)?;
        self.diagnostics.record(Direction::Sent, bytes);
        Ok(sent)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infrastructure::diagnostics::MemorySink;
    use crate::infrastructure::transport::memory::MemoryTransport;

    fn connected_sender(sink: Arc<MemorySink>) -> (CommandSender<MemoryTransport>, MemoryTransport) {
        let transport = MemoryTransport::new();
        transport.set_connected(true);
        let probe = transport.clone();
        (
            CommandSender::new(transport, DiagnosticsConfig::new(sink)),
            probe,
        )
    }

    #[test]
    fn test_send_returns_byte_count_and_writes_to_transport() {
        // Arrange
        let (mut sender, probe) = connected_sender(Arc::new(MemorySink::new()));

        // Act
        let sent = sender.send(&ScmpMessage::DebugStart, Endianness::Little).unwrap();

        // Assert
        assert_eq!(sent, 4);
        assert_eq!(probe.sent(), vec![vec![0x10, 0x00, 0x04, 0x00]]);
    }

    #[test]
    fn test_send_uses_negotiated_order() {
        let (mut sender, probe) = connected_sender(Arc::new(MemorySink::new()));
        sender.send(&ScmpMessage::DebugStart, Endianness::Big).unwrap();
        assert_eq!(probe.sent(), vec![vec![0x00, 0x10, 0x00, 0x04]]);
    }

    #[test]
    fn test_send_when_disconnected_reports_not_connected() {
        let transport = MemoryTransport::new();
        let probe = transport.clone();
        let mut sender = CommandSender::new(transport, DiagnosticsConfig::disabled());

        let result = sender.send(&ScmpMessage::DebugStart, Endianness::Little);

        assert!(matches!(result, Err(SendError::NotConnected)));
        assert!(probe.sent().is_empty());
    }

    #[test]
    fn test_send_before_negotiation_reports_unknown_order() {
        let (mut sender, probe) = connected_sender(Arc::new(MemorySink::new()));
        let result = sender.send(&ScmpMessage::Ready, Endianness::Unknown);
        assert!(matches!(result, Err(SendError::EndiannessUnknown)));
        assert!(probe.sent().is_empty());
    }

    #[test]
    fn test_sent_messages_are_recorded_with_direction_zero() {
        // Arrange
        let sink = Arc::new(MemorySink::new());
        let (mut sender, _probe) = connected_sender(Arc::clone(&sink));

        // Act
        sender.send_raw(&[0x22, 0x00, 0x04, 0x00]).unwrap();

        // Assert
        assert_eq!(
            sink.records(),
            vec![(Direction::Sent, vec![0x22, 0x00, 0x04, 0x00])]
        );
    }

    #[test]
    fn test_disabled_diagnostics_record_nothing() {
        let sink = Arc::new(MemorySink::new());
        let transport = MemoryTransport::new();
        transport.set_connected(true);
        let mut sender = CommandSender::new(
            transport,
            DiagnosticsConfig {
                enabled: false,
                sink: sink.clone(),
            },
        );

        sender.send(&ScmpMessage::Ready, Endianness::Little).unwrap();

        assert!(sink.records().is_empty());
    }
}
