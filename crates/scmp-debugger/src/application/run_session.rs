//! Use case: run one debugging session against a remote target.
//!
//! [`SessionEngine`] is the heart of the debugger.  It owns the receive framer,
//! the command sender and the breakpoint coordinator, and turns transport
//! callbacks and user commands into wire messages and [`SessionEvent`]s.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!  Disconnected ──connect()──► Connecting ──transport up──► Authenticating
//!                                                                │ AUTHENTICATED
//!                                                                ▼
//!               ┌─────── BREAKPOINT_END ──────┐             Idle (connected)
//!               ▼                             │                  │ start()/step_*()
//!         BreakpointHit ◄──────────────── Debugging ◄────────────┘
//!               │ start()/step_*()            ▲
//!               └─────────────────────────────┘
//! ```
//!
//! Any state falls back to `Disconnected` on a DISCONNECT message, a transport
//! close or error, a fatal framing error, or a local [`SessionEngine::disconnect`].
//!
//! # Threading
//!
//! The engine is a plain `&mut self` state machine.  It never spawns, locks or
//! awaits; the driver that owns it serialises every callback and command, so
//! one delivered chunk is always fully processed before the next is looked at.

use std::sync::Arc;

use scmp_core::protocol::{
    Frame, Framer, FramingError, HEADER_SIZE, LOCAL_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION,
};
use scmp_core::{BreakpointRef, Endianness, MessageType, ProtocolVersion, ScmpMessage};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::diagnostics::{DiagnosticsConfig, Direction};
use crate::application::events::{emit, EventSender, SessionEvent};
use crate::application::handle_breakpoints::{
    BeginOutcome, BreakpointCoordinator, BreakpointRegistry, ExecutionFreeze,
};
use crate::application::send_commands::{CommandSender, SendError};
use crate::application::transport::{Target, Transport, TransportError};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors returned by session-level operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not valid in the current state.
    #[error("operation not allowed while {status:?}")]
    InvalidState { status: SessionStatus },

    #[error("could not start connecting: {0}")]
    Connect(#[from] TransportError),
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Protocol versions this engine accepts from a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub min_version: ProtocolVersion,
    pub local_version: ProtocolVersion,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_version: MIN_PROTOCOL_VERSION,
            local_version: LOCAL_PROTOCOL_VERSION,
        }
    }
}

// ── Session state ─────────────────────────────────────────────────────────────

/// The last execution command the user issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugCommand {
    #[default]
    None,
    Start,
    StepInto,
    StepOver,
    StepOut,
    Stop,
}

impl DebugCommand {
    fn message(self) -> Option<ScmpMessage> {
        match self {
            DebugCommand::None => None,
            DebugCommand::Start => Some(ScmpMessage::DebugStart),
            DebugCommand::StepInto => Some(ScmpMessage::StepInto),
            DebugCommand::StepOver => Some(ScmpMessage::StepOver),
            DebugCommand::StepOut => Some(ScmpMessage::StepOut),
            DebugCommand::Stop => Some(ScmpMessage::DebugStop),
        }
    }

    fn event(self) -> Option<SessionEvent> {
        match self {
            DebugCommand::None => None,
            DebugCommand::Start => Some(SessionEvent::DebugStart),
            DebugCommand::StepInto => Some(SessionEvent::DebugStepInto),
            DebugCommand::StepOver => Some(SessionEvent::DebugStepOver),
            DebugCommand::StepOut => Some(SessionEvent::DebugStepOut),
            DebugCommand::Stop => Some(SessionEvent::DebugStop),
        }
    }
}

/// Flags reset as a unit on every disconnect.
#[derive(Debug, Default)]
struct Session {
    connecting: bool,
    connected: bool,
    authenticated: bool,
    debugging: bool,
    /// The transport reported the link as established.
    transport_up: bool,
    /// The first ENDIANNESS announcement has been seen.
    order_announced: bool,
    last_debug_command: DebugCommand,
}

/// Coarse session state, derived from the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    /// Waiting for the transport link.
    Connecting,
    /// Link is up; handshake with the target in progress.
    Authenticating,
    /// Connected, target running freely or waiting for a command.
    Idle,
    /// A start or step command is outstanding.
    Debugging,
    /// The target is halted at a breakpoint.
    BreakpointHit,
}

/// Point-in-time view of the session for collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub target: Option<Target>,
    pub endianness: Endianness,
    pub connecting: bool,
    pub connected: bool,
    pub authenticated: bool,
    pub debugging: bool,
    pub update_in_progress: bool,
    pub current_breakpoint: Option<BreakpointRef>,
    pub is_user_breakpoint: bool,
    pub last_debug_command: DebugCommand,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Drives one session at a time over a [`Transport`].
pub struct SessionEngine<T: Transport> {
    framer: Framer,
    sender: CommandSender<T>,
    breakpoints: BreakpointCoordinator,
    session: Session,
    target: Option<Target>,
    config: SessionConfig,
    diagnostics: DiagnosticsConfig,
    events: EventSender,
}

impl<T: Transport> SessionEngine<T> {
    /// Creates a disconnected engine.
    ///
    /// `diagnostics` is shared by the send and receive paths.
    pub fn new(
        transport: T,
        freeze: Arc<dyn ExecutionFreeze>,
        diagnostics: DiagnosticsConfig,
        config: SessionConfig,
        events: EventSender,
    ) -> Self {
        Self {
            framer: Framer::new(),
            sender: CommandSender::new(transport, diagnostics.clone()),
            breakpoints: BreakpointCoordinator::new(freeze),
            session: Session::default(),
            target: None,
            config,
            diagnostics,
            events,
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        let s = &self.session;
        if self.target.is_none() {
            SessionStatus::Disconnected
        } else if !s.connected {
            if s.transport_up {
                SessionStatus::Authenticating
            } else {
                SessionStatus::Connecting
            }
        } else if s.debugging {
            SessionStatus::Debugging
        } else if self.breakpoints.current().is_some() {
            SessionStatus::BreakpointHit
        } else {
            SessionStatus::Idle
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status(),
            target: self.target.clone(),
            endianness: self.framer.order(),
            connecting: self.session.connecting,
            connected: self.session.connected,
            authenticated: self.session.authenticated,
            debugging: self.session.debugging,
            update_in_progress: self.breakpoints.update_in_progress(),
            current_breakpoint: self.breakpoints.current().cloned(),
            is_user_breakpoint: self.breakpoints.is_user_breakpoint(),
            last_debug_command: self.session.last_debug_command,
        }
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Start and the step commands are accepted.
    pub fn can_start(&self) -> bool {
        self.session.connected && !self.session.debugging && !self.breakpoints.update_in_progress()
    }

    pub fn can_step(&self) -> bool {
        self.can_start()
    }

    pub fn can_stop(&self) -> bool {
        self.session.connected && self.session.debugging
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        self.breakpoints.registry()
    }

    pub fn breakpoints_mut(&mut self) -> &mut BreakpointRegistry {
        self.breakpoints.registry_mut()
    }

    pub fn transport(&self) -> &T {
        self.sender.transport()
    }

    // ── User commands ─────────────────────────────────────────────────────────

    /// Begins connecting to `target`.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] unless disconnected (nothing changes);
    /// [`SessionError::Connect`] if the transport refused to start, in which
    /// case an `Error` event was emitted and the engine is disconnected again.
    pub fn connect(&mut self, target: Target) -> Result<(), SessionError> {
        if self.target.is_some() {
            let status = self.status();
            warn!("connect to {target} ignored while {status:?}");
            return Err(SessionError::InvalidState { status });
        }

        self.framer.reset();
        self.breakpoints.release();
        self.session = Session {
            connecting: true,
            ..Session::default()
        };
        self.target = Some(target.clone());
        info!("connecting to {target}");
        emit(&self.events, SessionEvent::DebugConnect { target: target.clone() });
        emit(&self.events, SessionEvent::Connecting { target: target.clone() });

        if let Err(e) = self.sender.transport_mut().connect(&target) {
            self.fail(format!("could not connect to {target}: {e}"));
            return Err(SessionError::Connect(e));
        }
        Ok(())
    }

    /// Tears the session down from any state.
    ///
    /// A DISCONNECT message is sent first when the link allows it.
    pub fn disconnect(&mut self) {
        emit(&self.events, SessionEvent::DebugDisconnect);
        if self.sender.transport().is_connected() {
            if let Err(e) = self.sender.send(&ScmpMessage::Disconnect, self.framer.order()) {
                debug!("DISCONNECT not sent: {e}");
            }
        }
        self.teardown();
    }

    /// Sends DEBUG_START.  `Ok(None)` means the command was not allowed in the
    /// current state and nothing was sent.
    ///
    /// # Errors
    ///
    /// Propagates [`SendError`] from the sender.
    pub fn start(&mut self) -> Result<Option<usize>, SendError> {
        self.issue(DebugCommand::Start)
    }

    /// See [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Propagates [`SendError`] from the sender.
    pub fn step_into(&mut self) -> Result<Option<usize>, SendError> {
        self.issue(DebugCommand::StepInto)
    }

    /// See [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Propagates [`SendError`] from the sender.
    pub fn step_over(&mut self) -> Result<Option<usize>, SendError> {
        self.issue(DebugCommand::StepOver)
    }

    /// See [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Propagates [`SendError`] from the sender.
    pub fn step_out(&mut self) -> Result<Option<usize>, SendError> {
        self.issue(DebugCommand::StepOut)
    }

    /// Asks a running target to halt.  `debugging` stays set until the target
    /// actually halts with a BREAKPOINT_END.
    ///
    /// # Errors
    ///
    /// Propagates [`SendError`] from the sender.
    pub fn stop(&mut self) -> Result<Option<usize>, SendError> {
        self.issue(DebugCommand::Stop)
    }

    fn issue(&mut self, command: DebugCommand) -> Result<Option<usize>, SendError> {
        let allowed = match command {
            DebugCommand::None => false,
            DebugCommand::Stop => self.can_stop(),
            _ => self.can_step(),
        };
        let (Some(msg), Some(event)) = (command.message(), command.event()) else {
            return Ok(None);
        };
        if !allowed {
            debug!("{command:?} ignored while {:?}", self.status());
            return Ok(None);
        }

        let sent = self.sender.send(&msg, self.framer.order())?;
        if command != DebugCommand::Stop {
            self.session.debugging = true;
        }
        // Only steps and stop are remembered.
        self.session.last_debug_command = match command {
            DebugCommand::Start => DebugCommand::None,
            other => other,
        };
        emit(&self.events, event);
        Ok(Some(sent))
    }

    // ── Transport callbacks ───────────────────────────────────────────────────

    /// The link to `target` is established.
    pub fn on_transport_connected(&mut self, target: &Target) {
        if !self.is_current(target) {
            debug!("ignoring connect notification from stale target {target}");
            return;
        }
        self.session.transport_up = true;
        info!("transport connected to {target}");
        if !self.session.authenticated {
            emit(&self.events, SessionEvent::Connecting { target: target.clone() });
        }
    }

    /// A chunk of bytes arrived from `target`.  Every complete message in the
    /// buffer is dispatched before this returns.
    ///
    /// Chunks larger than the free buffer space are appended piecewise, with a
    /// drain after each piece, so only a single message too large for the
    /// buffer can overflow it.
    pub fn on_data(&mut self, target: &Target, chunk: &[u8]) {
        if !self.is_current(target) {
            debug!("dropping {} bytes from stale target {target}", chunk.len());
            return;
        }

        let mut rest = chunk;
        while !rest.is_empty() {
            // A full buffer that yielded no frame cannot make progress.
            let room = match self.framer.free_space() {
                0 => rest.len(),
                free => free.min(rest.len()),
            };
            let (piece, tail) = rest.split_at(room);
            if let Err(e) = self.framer.push(piece) {
                self.fail(e.to_string());
                return;
            }
            rest = tail;
            if !self.drain() {
                return;
            }
        }
    }

    /// Dispatches every complete buffered message.  Returns `false` once the
    /// session has been torn down.
    fn drain(&mut self) -> bool {
        loop {
            match self.framer.next_frame() {
                Ok(Some(frame)) => {
                    self.diagnostics.record(Direction::Received, &frame.bytes);
                    self.dispatch(frame);
                    if self.target.is_none() {
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    let message = match e {
                        FramingError::UndeterminedEndianness => {
                            "could not determine byte order of target".to_string()
                        }
                        other => other.to_string(),
                    };
                    self.fail(message);
                    return false;
                }
            }
        }
    }

    /// The link to `target` closed.
    pub fn on_transport_disconnected(&mut self, target: &Target) {
        if !self.is_current(target) {
            return;
        }
        info!("transport to {target} closed");
        self.teardown();
    }

    /// The link to `target` failed.
    pub fn on_transport_error(&mut self, target: &Target, message: &str) {
        if !self.is_current(target) {
            return;
        }
        self.fail(format!("transport error: {message}"));
    }

    fn is_current(&self, target: &Target) -> bool {
        self.target.as_ref() == Some(target)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    fn dispatch(&mut self, frame: Frame) {
        let order = self.framer.order();
        let msg = match frame.decode(order) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    "dropping malformed message 0x{:04X}: {e}",
                    frame.header.type_code
                );
                return;
            }
        };
        debug!("received {msg:?}");

        match msg {
            ScmpMessage::Endianness => self.on_endianness(order),
            ScmpMessage::Version(version) => self.on_version(version),
            ScmpMessage::Authenticated => self.on_authenticated(),
            ScmpMessage::PluginsReady => {
                emit(&self.events, SessionEvent::PluginsReady);
                self.reply(&ScmpMessage::Ready);
            }
            ScmpMessage::Ready => {
                info!("session ready");
                emit(&self.events, SessionEvent::Ready);
            }
            ScmpMessage::Disconnect => {
                info!("target requested disconnect");
                self.teardown();
            }
            ScmpMessage::BreakpointBegin(bp) => self.on_breakpoint_begin(bp, &frame),
            ScmpMessage::BreakpointSync(payload) => {
                self.breakpoints.sync(payload, &self.events);
                self.echo(&frame);
            }
            ScmpMessage::BreakpointEnd(_) => self.on_breakpoint_end(&frame),
            ScmpMessage::BreakpointContinue => {
                info!("target resumed");
                self.breakpoints.resume(&self.events);
                self.echo(&frame);
            }
            ScmpMessage::Data { type_code, payload } => {
                emit(&self.events, SessionEvent::DataReady { type_code, payload });
            }
            // Codes the debugger only ever sends are passed on untouched.
            other => {
                debug!("forwarding unexpected {:?}", other.message_type());
                emit(
                    &self.events,
                    SessionEvent::DataReady {
                        type_code: frame.header.type_code,
                        payload: frame.bytes[HEADER_SIZE..].to_vec(),
                    },
                );
            }
        }
    }

    fn on_endianness(&mut self, order: Endianness) {
        if self.session.order_announced {
            warn!("ignoring repeated ENDIANNESS announcement; keeping {order:?}");
            return;
        }
        self.session.order_announced = true;
        info!("target byte order is {order:?}");
    }

    fn on_version(&mut self, version: ProtocolVersion) {
        if !self.session.connecting {
            warn!("ignoring VERSION {version} outside the handshake");
            return;
        }
        let SessionConfig {
            min_version,
            local_version,
        } = self.config;
        if version.is_within(min_version, local_version) {
            info!("target protocol version {version} accepted");
            self.reply(&ScmpMessage::Success);
        } else {
            warn!(
                "target protocol version {version} outside supported range {min_version}..={local_version}"
            );
            self.reply(&ScmpMessage::Failure);
        }
    }

    fn on_authenticated(&mut self) {
        self.session.authenticated = true;
        self.session.connecting = false;
        self.session.connected = true;
        if let Some(target) = self.target.clone() {
            info!("authenticated by {target}");
            emit(&self.events, SessionEvent::Connected { target });
        }
    }

    fn on_breakpoint_begin(&mut self, bp: BreakpointRef, frame: &Frame) {
        match self.breakpoints.begin(bp, &self.events) {
            BeginOutcome::Started => self.echo(frame),
            BeginOutcome::AlreadyInProgress => {
                self.fail("BREAKPOINT_BEGIN received before the previous BREAKPOINT_END".to_string());
            }
        }
    }

    fn on_breakpoint_end(&mut self, frame: &Frame) {
        // Thaws when this handler returns, whatever happens below.
        let thaw = self.breakpoints.take_freeze();
        self.breakpoints.end(thaw.is_some(), &self.events);
        self.session.debugging = false;
        self.echo(frame);
    }

    // ── Outbound helpers ──────────────────────────────────────────────────────

    fn reply(&mut self, msg: &ScmpMessage) {
        if let Err(e) = self.sender.send(msg, self.framer.order()) {
            warn!("failed to send {:?}: {e}", msg.message_type());
        }
    }

    fn echo(&mut self, frame: &Frame) {
        let ty = MessageType::try_from(frame.header.type_code).ok();
        if let Err(e) = self.sender.send_raw(&frame.bytes) {
            warn!("failed to acknowledge {ty:?}: {e}");
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    fn fail(&mut self, message: String) {
        error!("{message}; disconnecting");
        emit(
            &self.events,
            SessionEvent::Error {
                target: self.target.clone(),
                message,
            },
        );
        self.teardown();
    }

    fn teardown(&mut self) {
        let target = self.target.take();
        self.breakpoints.release();
        self.session = Session::default();
        self.framer.reset();
        self.sender.transport_mut().disconnect();
        if let Some(target) = target {
            info!("disconnected from {target}");
            emit(
                &self.events,
                SessionEvent::Disconnected {
                    target: Some(target),
                },
            );
        }
    }
}

impl<T: Transport> std::fmt::Debug for SessionEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}
