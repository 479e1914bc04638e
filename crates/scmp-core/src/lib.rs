//! # scmp-core
//!
//! Shared library for the SCMP script debugger containing the wire protocol:
//! message types, byte-order negotiation, the binary codec, and receive
//! framing.
//!
//! It has zero dependencies on sockets, async runtimes, or UI frameworks, so
//! both the debugger engine and test harnesses that impersonate a remote
//! target can use it.
//!
//! # Architecture overview (for beginners)
//!
//! A script runtime embedded in a game or tool (the *target*) listens for a
//! debugger.  Once connected, the two sides exchange small binary messages:
//!
//! ```text
//! target                                debugger
//! ──────                                ────────
//! ENDIANNESS  ───────────────────────►  pick byte order
//! VERSION     ───────────────────────►  range check
//!             ◄───────────────────────  SUCCESS / FAILURE
//! AUTHENTICATED ─────────────────────►  connected
//! PLUGINS_READY ─────────────────────►
//!             ◄───────────────────────  READY
//! READY       ───────────────────────►  session ready
//! ```
//!
//! - **`protocol::messages`** – type codes, the 4-byte header, and the typed
//!   [`ScmpMessage`] enum.
//! - **`protocol::endian`** – the negotiated byte order and the handshake that
//!   determines it.
//! - **`protocol::codec`** – encode/decode between bytes and [`ScmpMessage`].
//! - **`protocol::framer`** – the bounded receive buffer that reassembles
//!   messages from arbitrarily split transport chunks.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `scmp_core::ScmpMessage` instead of `scmp_core::protocol::messages::ScmpMessage`.
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::endian::Endianness;
pub use protocol::framer::{Frame, Framer, FramingError, OverflowError};
pub use protocol::messages::{BreakpointRef, MessageType, ProtocolVersion, ScmpMessage};
