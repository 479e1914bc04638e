//! Application layer of the debugger.
//!
//! # What lives here?
//!
//! - **`run_session`** – the session engine: receive framing, message
//!   dispatch, and the connection/authentication/debugging state machine.
//! - **`handle_breakpoints`** – the Begin/Sync/End breakpoint handshake, the
//!   scoped execution freeze around it, and the local breakpoint registry.
//! - **`send_commands`** – encodes outbound messages with the negotiated byte
//!   order and writes them to the transport.
//! - **`transport`** – the byte-pipe trait the engine talks through, plus the
//!   opaque [`transport::Target`] identity.
//! - **`diagnostics`** – optional raw traffic recording.
//! - **`events`** – the typed events collaborators subscribe to.
//!
//! Nothing in this layer performs I/O directly; every side effect goes through
//! a trait object injected at construction.

pub mod diagnostics;
pub mod events;
pub mod handle_breakpoints;
pub mod run_session;
pub mod send_commands;
pub mod transport;
