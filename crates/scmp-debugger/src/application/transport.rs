//! The byte-pipe the session engine talks through.
//!
//! The engine never opens sockets itself.  It asks a [`Transport`] to connect,
//! send, or disconnect, and the transport reports back through the engine's
//! `on_transport_*` callbacks.  Connecting is therefore a two-step affair:
//! [`Transport::connect`] only *starts* the attempt.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No link is currently established.
    #[error("transport is not connected")]
    NotConnected,
    /// The connection attempt could not be started.
    #[error("failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },
    /// The link closed while sending.
    #[error("transport closed")]
    Closed,
}

/// Opaque identity of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(Uuid);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote endpoint the debugger connects to.
///
/// Two targets are equal only if they are the *same* connection attempt;
/// connecting twice to one address yields two distinct targets.  This lets
/// the engine drop late callbacks that belong to a previous connection.
#[derive(Debug, Clone)]
pub struct Target {
    id: TargetId,
    address: String,
}

impl Target {
    /// Creates a fresh target identity for `address` (e.g. `"127.0.0.1:11000"`).
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: TargetId(Uuid::new_v4()),
            address: address.into(),
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Target {}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Byte-pipe primitives the engine needs from the outside world.
///
/// Implementations deliver inbound chunks and link changes by calling
/// the engine's `on_transport_*` methods, never concurrently with each other.
pub trait Transport: Send {
    /// Starts connecting to `target`.  Success here means the attempt is
    /// under way; completion is reported separately.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] if the attempt cannot start.
    fn connect(&mut self, target: &Target) -> Result<(), TransportError>;

    /// Closes the link, if any.  Must be safe to call repeatedly.
    fn disconnect(&mut self);

    /// Writes one encoded message.  Returns the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] without an established link.
    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;

    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_with_same_address_are_distinct() {
        let a = Target::new("127.0.0.1:11000");
        let b = Target::new("127.0.0.1:11000");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_target_displays_its_address() {
        assert_eq!(Target::new("devkit:4000").to_string(), "devkit:4000");
    }
}
