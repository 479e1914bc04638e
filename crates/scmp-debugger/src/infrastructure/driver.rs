//! The async task that owns the session engine.
//!
//! # Why a driver? (for beginners)
//!
//! The engine is synchronous and must never see two inputs at once.  Transport
//! events come from socket tasks, and user commands come from wherever the
//! front-end reads them.  `SessionDriver` is the single place both streams
//! meet: one `tokio::select!` loop takes whichever input is ready, hands it to
//! the engine, and only then looks at the next one.
//!
//! ```text
//!  TcpTransport tasks ──TransportEvent──┐
//!                                       ├──► SessionDriver ──► SessionEngine
//!  stdin / UI        ──UserCommand──────┘
//! ```

use scmp_core::BreakpointRef;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::run_session::SessionEngine;
use crate::application::send_commands::SendError;
use crate::application::transport::{Target, Transport};
use crate::infrastructure::transport::TransportEvent;

/// A request from the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Connect to the `host:port` address.
    Connect(String),
    Disconnect,
    Start,
    StepInto,
    StepOver,
    StepOut,
    Stop,
    /// Toggles a local breakpoint.
    ToggleBreakpoint(BreakpointRef),
    ClearBreakpoints,
    /// Disconnects and ends the driver loop.
    Shutdown,
}

/// A command line the front-end could not understand.
#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

const BREAK_USAGE: &str = "break <plugin> <file> <line>";

impl UserCommand {
    /// Parses one line of front-end input.
    ///
    /// `connect` without an address connects to `default_address`.  Blank
    /// lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandParseError`] for unknown verbs or bad arguments.
    pub fn parse(line: &str, default_address: &str) -> Result<Option<Self>, CommandParseError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "connect" => UserCommand::Connect(words.next().unwrap_or(default_address).to_string()),
            "disconnect" => UserCommand::Disconnect,
            "start" | "run" => UserCommand::Start,
            "into" => UserCommand::StepInto,
            "over" => UserCommand::StepOver,
            "out" => UserCommand::StepOut,
            "stop" => UserCommand::Stop,
            "break" => {
                let plugin_id = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or(CommandParseError::Usage(BREAK_USAGE))?;
                let relative_file_path = words
                    .next()
                    .ok_or(CommandParseError::Usage(BREAK_USAGE))?
                    .to_string();
                let line = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or(CommandParseError::Usage(BREAK_USAGE))?;
                UserCommand::ToggleBreakpoint(BreakpointRef {
                    plugin_id,
                    relative_file_path,
                    line,
                })
            }
            "clear" => UserCommand::ClearBreakpoints,
            "quit" | "exit" => UserCommand::Shutdown,
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Owns the engine and feeds it one input at a time.
pub struct SessionDriver<T: Transport> {
    engine: SessionEngine<T>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<UserCommand>,
}

impl<T: Transport> SessionDriver<T> {
    pub fn new(
        engine: SessionEngine<T>,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        commands: mpsc::UnboundedReceiver<UserCommand>,
    ) -> Self {
        Self {
            engine,
            transport_events,
            commands,
        }
    }

    /// Runs until [`UserCommand::Shutdown`] arrives or the command channel
    /// closes.  Returns the engine so callers can inspect its final state.
    pub async fn run(mut self) -> SessionEngine<T> {
        info!("session driver started");
        loop {
            tokio::select! {
                Some(event) = self.transport_events.recv() => self.on_transport_event(event),
                command = self.commands.recv() => match command {
                    Some(UserCommand::Shutdown) | None => {
                        self.engine.disconnect();
                        break;
                    }
                    Some(command) => self.on_command(command),
                },
            }
        }
        info!("session driver stopped");
        self.engine
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected(target) => self.engine.on_transport_connected(&target),
            TransportEvent::Data(target, bytes) => self.engine.on_data(&target, &bytes),
            TransportEvent::Closed(target) => self.engine.on_transport_disconnected(&target),
            TransportEvent::Failed(target, message) => {
                self.engine.on_transport_error(&target, &message);
            }
        }
    }

    fn on_command(&mut self, command: UserCommand) {
        debug!("user command {command:?}");
        let result = match command {
            UserCommand::Connect(address) => {
                if let Err(e) = self.engine.connect(Target::new(address)) {
                    warn!("connect failed: {e}");
                }
                return;
            }
            UserCommand::Disconnect => {
                self.engine.disconnect();
                return;
            }
            UserCommand::ToggleBreakpoint(bp) => {
                let set = self.engine.breakpoints_mut().toggle(bp.clone());
                info!("breakpoint {bp} {}", if set { "set" } else { "cleared" });
                return;
            }
            UserCommand::ClearBreakpoints => {
                self.engine.breakpoints_mut().clear();
                return;
            }
            UserCommand::Start => self.engine.start(),
            UserCommand::StepInto => self.engine.step_into(),
            UserCommand::StepOver => self.engine.step_over(),
            UserCommand::StepOut => self.engine.step_out(),
            UserCommand::Stop => self.engine.stop(),
            UserCommand::Shutdown => return,
        };
        match result {
            Ok(Some(_)) => {}
            Ok(None) => info!("command not available while {:?}", self.engine.status()),
            Err(SendError::NotConnected) => warn!("command dropped: not connected"),
            Err(e) => warn!("command failed: {e}"),
        }
    }
}
