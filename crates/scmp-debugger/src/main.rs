//! SCMP debugger command-line entry point.
//!
//! Wires the TCP transport, freeze flag and traffic log into a
//! [`SessionEngine`], runs it under a [`SessionDriver`], and reads commands
//! from stdin.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ Cli::parse()                  -- --config, --address, --no-connect
//!  └─ load_config / load_config_from
//!  └─ SessionEngine::new(TcpTransport, FreezeFlag, DiagnosticsConfig, ...)
//!  └─ SessionDriver::run()          -- owns the engine on one task
//!  └─ event printer task            -- prints SessionEvents
//!  └─ stdin reader                  -- parses lines into UserCommands
//! ```
//!
//! Commands: `connect [host:port]`, `disconnect`, `start`, `stop`, `into`,
//! `over`, `out`, `break <plugin> <file> <line>`, `clear`, `quit`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scmp_debugger::application::diagnostics::DiagnosticsConfig;
use scmp_debugger::application::events::{event_channel, SessionEvent};
use scmp_debugger::application::run_session::SessionEngine;
use scmp_debugger::infrastructure::diagnostics::FileSink;
use scmp_debugger::infrastructure::driver::{SessionDriver, UserCommand};
use scmp_debugger::infrastructure::freeze::FreezeFlag;
use scmp_debugger::infrastructure::storage::config::{load_config, load_config_from, DebuggerConfig};
use scmp_debugger::infrastructure::transport::tcp::TcpTransport;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote debugger for SCMP script runtimes.
#[derive(Debug, Parser)]
#[command(name = "scmp-debugger", version)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, env = "SCMP_CONFIG")]
    config: Option<PathBuf>,

    /// Target `host:port`, overriding the config file.
    #[arg(long, env = "SCMP_TARGET")]
    address: Option<String>,

    /// Wait for a `connect` command instead of connecting at startup.
    #[arg(long)]
    no_connect: bool,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    fn into_config(self) -> anyhow::Result<DebuggerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => load_config().unwrap_or_else(|e| {
                eprintln!("using default configuration: {e}");
                DebuggerConfig::default()
            }),
        };
        if let Some(address) = self.address {
            config.target.address = address;
        }
        if self.no_connect {
            config.target.auto_connect = false;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    info!("SCMP debugger starting");

    let diagnostics = if config.diagnostics.enabled {
        let sink = FileSink::open(&config.diagnostics.log_path).with_context(|| {
            format!(
                "opening traffic log {}",
                config.diagnostics.log_path.display()
            )
        })?;
        info!("recording traffic to {}", sink.path().display());
        DiagnosticsConfig::new(Arc::new(sink))
    } else {
        DiagnosticsConfig::disabled()
    };

    // ── Engine and driver ─────────────────────────────────────────────────────
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (events_tx, mut events_rx) = event_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let engine = SessionEngine::new(
        TcpTransport::new(transport_tx),
        Arc::new(FreezeFlag::new()),
        diagnostics,
        config.session_config(),
        events_tx,
    );
    let driver = tokio::spawn(SessionDriver::new(engine, transport_rx, cmd_rx).run());

    // ── Event printer ─────────────────────────────────────────────────────────
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_event(&event);
        }
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let ctrl_c_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = ctrl_c_tx.send(UserCommand::Shutdown);
        }
    });

    if config.target.auto_connect {
        let _ = cmd_tx.send(UserCommand::Connect(config.target.address.clone()));
    }

    // ── Stdin command loop ────────────────────────────────────────────────────
    let stdin_tx = cmd_tx.clone();
    let default_address = config.target.address.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match UserCommand::parse(&line, &default_address) {
                    Ok(Some(command)) => {
                        let quit = command == UserCommand::Shutdown;
                        if stdin_tx.send(command).is_err() || quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{e}"),
                },
                Ok(None) => {
                    let _ = stdin_tx.send(UserCommand::Shutdown);
                    break;
                }
                Err(e) => {
                    error!("failed to read stdin: {e}");
                    let _ = stdin_tx.send(UserCommand::Shutdown);
                    break;
                }
            }
        }
    });
    drop(cmd_tx);

    let engine = driver.await.context("session driver panicked")?;
    info!("SCMP debugger stopped ({:?})", engine.status());
    // The stdin reader may still be parked in a blocking read.
    std::process::exit(0)
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connecting { target } => println!("connecting to {target}..."),
        SessionEvent::Connected { target } => println!("connected to {target}"),
        SessionEvent::Ready => println!("session ready"),
        SessionEvent::Disconnected { target: Some(target) } => println!("disconnected from {target}"),
        SessionEvent::Error { message, .. } => println!("error: {message}"),
        SessionEvent::BreakpointHitting {
            breakpoint,
            is_user_breakpoint,
        } => {
            let kind = if *is_user_breakpoint { "breakpoint" } else { "halt" };
            println!("{kind} at {breakpoint}");
        }
        SessionEvent::BreakpointHit {
            breakpoint: Some(breakpoint),
            ..
        } => println!("halted at {breakpoint}"),
        SessionEvent::BreakpointContinue { .. } => println!("running"),
        SessionEvent::DataReady { type_code, payload } => {
            println!("data 0x{type_code:04X} ({} bytes)", payload.len());
        }
        other => info!("{other:?}"),
    }
}
