//! Events published by the session engine.
//!
//! Collaborators (editor panes, call-stack views, status bars) subscribe by
//! holding the receiving half of the channel passed to
//! [`SessionEngine::new`](crate::application::run_session::SessionEngine::new).
//! The engine never blocks on delivery: if every receiver is gone, events are
//! dropped.

use scmp_core::BreakpointRef;
use tokio::sync::mpsc;
use tracing::trace;

use crate::application::transport::Target;

/// Everything the engine reports to the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    // ── Connection lifecycle ─────────────────────────────────────────────────
    /// A connection attempt is under way (also re-sent as feedback once the
    /// transport is up but the target has not authenticated yet).
    Connecting { target: Target },
    /// The target authenticated this debugger.
    Connected { target: Target },
    PluginsReady,
    /// The session is ready: commands may now be issued.
    Ready,
    Disconnected { target: Option<Target> },
    Error {
        target: Option<Target>,
        message: String,
    },
    /// A non-reserved message, forwarded untouched.
    DataReady { type_code: u16, payload: Vec<u8> },

    // ── Breakpoint handshake ─────────────────────────────────────────────────
    BreakpointHitting {
        breakpoint: BreakpointRef,
        is_user_breakpoint: bool,
    },
    /// The target is halted and collaborators should refresh.
    BreakpointHit {
        breakpoint: Option<BreakpointRef>,
        is_user_breakpoint: bool,
    },
    BreakpointContinue { breakpoint: Option<BreakpointRef> },
    UpdateBegin,
    UpdateSync { payload: Vec<u8> },
    UpdateEnd,

    // ── User intents that reached the engine ─────────────────────────────────
    DebugConnect { target: Target },
    DebugDisconnect,
    DebugStart,
    DebugStop,
    DebugStepInto,
    DebugStepOver,
    DebugStepOut,
}

/// Sending half of the event channel.
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Creates a new event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Publishes `event`, ignoring the case where nobody is listening.
pub(crate) fn emit(events: &EventSender, event: SessionEvent) {
    if let Err(dropped) = events.send(event) {
        trace!("no event subscribers; dropped {:?}", dropped.0);
    }
}
