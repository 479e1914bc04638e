//! In-memory transport for unit and integration testing.
//!
//! `MemoryTransport` records every sent message and every connect request
//! instead of touching the network.  Clones share state, so a test keeps one
//! clone as a probe after handing the other to the engine:
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! let probe = transport.clone();
//! let mut engine = SessionEngine::new(transport, freeze, diag, cfg, tx);
//!
//! engine.connect(target.clone())?;
//! engine.on_data(&target, &announcement);
//!
//! assert_eq!(probe.sent(), vec![expected_reply]);
//! ```
//!
//! When built with [`with_events`](MemoryTransport::with_events), `connect`
//! also reports [`TransportEvent::Connected`] on the channel, mimicking a
//! real link coming up.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::application::transport::{Target, Transport, TransportError};
use crate::infrastructure::transport::TransportEvent;

#[derive(Debug, Default)]
struct MemoryState {
    connected: bool,
    fail_connect: bool,
    sent: Vec<Vec<u8>>,
    connect_requests: Vec<Target>,
    disconnects: usize,
}

/// A transport that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that announces successful connects on `events`.
    pub fn with_events(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            state: Arc::default(),
            events: Some(events),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forces the link state, e.g. to send without going through `connect`.
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Makes subsequent `connect` calls fail.
    pub fn fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    /// Every message sent so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    /// Returns and clears the sent messages.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state().sent)
    }

    pub fn connect_requests(&self) -> Vec<Target> {
        self.state().connect_requests.clone()
    }

    /// Number of `disconnect` calls.
    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, target: &Target) -> Result<(), TransportError> {
        {
            let mut state = self.state();
            state.connect_requests.push(target.clone());
            if state.fail_connect {
                return Err(TransportError::ConnectFailed {
                    address: target.address().to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            state.connected = true;
        }
        if let Some(events) = &self.events {
            let _ = events.send(TransportEvent::Connected(target.clone()));
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state();
        state.connected = false;
        state.disconnects += 1;
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.sent.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_connect_is_rejected() {
        let mut transport = MemoryTransport::new();
        assert!(matches!(
            transport.send(&[1, 2]),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_clones_share_recorded_traffic() {
        // Arrange
        let mut transport = MemoryTransport::new();
        let probe = transport.clone();
        let target = Target::new("mem:0");

        // Act
        transport.connect(&target).unwrap();
        transport.send(&[7, 8, 9]).unwrap();
        transport.disconnect();

        // Assert
        assert_eq!(probe.sent(), vec![vec![7, 8, 9]]);
        assert_eq!(probe.connect_requests(), vec![target]);
        assert_eq!(probe.disconnects(), 1);
        assert!(!probe.is_connected());
    }

    #[test]
    fn test_connect_reports_connected_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = MemoryTransport::with_events(tx);
        let target = Target::new("mem:1");

        transport.connect(&target).unwrap();

        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Connected(target));
    }
}
