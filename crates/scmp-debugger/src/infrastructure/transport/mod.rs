//! Transport adapters.
//!
//! Both adapters report link changes and inbound bytes as [`TransportEvent`]s
//! on a channel; the [`driver`](crate::infrastructure::driver) feeds them into
//! the engine one at a time.

use crate::application::transport::Target;

pub mod memory;
pub mod tcp;

/// Something that happened on a transport link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The link to the target is established.
    Connected(Target),
    /// Bytes arrived.  Chunk boundaries carry no meaning.
    Data(Target, Vec<u8>),
    /// The remote side closed the link.
    Closed(Target),
    /// The link failed.
    Failed(Target, String),
}

impl TransportEvent {
    pub fn target(&self) -> &Target {
        match self {
            TransportEvent::Connected(t)
            | TransportEvent::Data(t, _)
            | TransportEvent::Closed(t)
            | TransportEvent::Failed(t, _) => t,
        }
    }
}
