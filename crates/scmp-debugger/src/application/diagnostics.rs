//! Raw traffic recording.
//!
//! When enabled, every message sent or received is appended to a sink as one
//! record: a direction byte followed by the raw message bytes.
//!
//! ```text
//! [1][01 00 06 00 02 01]      received ENDIANNESS
//! [1][02 00 08 00 05 00 00 00] received VERSION 5.0
//! [0][03 00 04 00]             sent SUCCESS
//! ```
//!
//! Configuration is passed in explicitly; there is no process-wide toggle.

use std::sync::Arc;

use tracing::warn;

/// Which way a recorded message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Sent = 0,
    Received = 1,
}

/// Destination for recorded traffic.
pub trait MessageSink: Send + Sync {
    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; callers log it and carry on.
    fn record(&self, direction: Direction, bytes: &[u8]) -> std::io::Result<()>;
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn record(&self, _direction: Direction, _bytes: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

/// Traffic recording settings shared by the send and receive paths.
#[derive(Clone)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub sink: Arc<dyn MessageSink>,
}

impl DiagnosticsConfig {
    /// Recording switched on, writing to `sink`.
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            enabled: true,
            sink,
        }
    }

    /// Recording switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            sink: Arc::new(NullSink),
        }
    }

    /// Records `bytes` if recording is enabled.  Sink failures are logged and
    /// never interrupt the session.
    pub fn record(&self, direction: Direction, bytes: &[u8]) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.sink.record(direction, bytes) {
            warn!("failed to record {direction:?} message: {e}");
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for DiagnosticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsConfig")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
