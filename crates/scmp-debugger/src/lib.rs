//! scmp-debugger library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does scmp-debugger do? (for beginners)
//!
//! A game or tool embeds a script runtime that can be debugged remotely.  The
//! debugger connects to it over TCP and drives a small binary protocol:
//!
//! 1. The runtime announces its byte order, then its protocol version.  The
//!    debugger accepts or rejects the version.
//! 2. The runtime authenticates the debugger and reports when its plugins
//!    are loaded; the debugger acknowledges and the session becomes ready.
//! 3. The user starts execution, steps, or asks the runtime to stop.
//! 4. When the runtime halts it runs a three-phase breakpoint handshake
//!    (begin, any number of syncs, end).  Interactive exploration is frozen
//!    for the duration and the halt location is published to the UI.
//!
//! The `application` layer holds that logic as a synchronous state machine
//! fed by transport callbacks.  The `infrastructure` layer adapts it to
//! sockets, files, and the async runtime.

/// Application layer: session engine, breakpoint handshake, command sending.
pub mod application;

/// Infrastructure layer: TCP transport, diagnostics log, config, async driver.
pub mod infrastructure;
