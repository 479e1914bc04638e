//! TOML-based configuration for the debugger.
//!
//! Reads [`DebuggerConfig`] from the platform-appropriate file:
//! - Windows:  `%APPDATA%\ScmpDebugger\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/scmp-debugger/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/ScmpDebugger/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [general]
//! log_level = "debug"
//!
//! [target]
//! address = "192.168.1.20:11000"
//! auto_connect = true
//!
//! [protocol]
//! min_version = "4.0"
//! local_version = "5.1"
//!
//! [diagnostics]
//! enabled = true
//! log_path = "scmp-traffic.bin"
//! ```
//!
//! Every field has a `#[serde(default = ...)]`, so a missing file, a missing
//! section or a missing key all fall back to the built-in values.

use std::path::{Path, PathBuf};

use scmp_core::protocol::{LOCAL_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION};
use scmp_core::ProtocolVersion;
use serde::Deserialize;
use thiserror::Error;

use crate::application::run_session::SessionConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The accepted version range is empty.
    #[error("min_version {min} is newer than local_version {local}")]
    InvalidVersionRange {
        min: ProtocolVersion,
        local: ProtocolVersion,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level debugger configuration stored on disk.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DebuggerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsFileConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where the remote script runtime listens.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// `host:port` of the target.
    #[serde(default = "default_address")]
    pub address: String,
    /// Connect as soon as the debugger starts.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

/// Accepted remote protocol versions, written as `"major.minor"`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ProtocolConfig {
    #[serde(default = "default_min_version")]
    pub min_version: ProtocolVersion,
    #[serde(default = "default_local_version")]
    pub local_version: ProtocolVersion,
}

/// Raw traffic log settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiagnosticsFileConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Relative paths are resolved against the working directory.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_address() -> String {
    "127.0.0.1:11000".to_string()
}
fn default_true() -> bool {
    true
}
fn default_min_version() -> ProtocolVersion {
    MIN_PROTOCOL_VERSION
}
fn default_local_version() -> ProtocolVersion {
    LOCAL_PROTOCOL_VERSION
}
fn default_log_path() -> PathBuf {
    PathBuf::from("scmp-traffic.bin")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            auto_connect: default_true(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_version: default_min_version(),
            local_version: default_local_version(),
        }
    }
}

impl Default for DiagnosticsFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: default_log_path(),
        }
    }
}

impl DebuggerConfig {
    /// Checks values serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidVersionRange`] if `min_version` is newer
    /// than `local_version`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ProtocolConfig {
            min_version,
            local_version,
        } = self.protocol;
        if min_version > local_version {
            return Err(ConfigError::InvalidVersionRange {
                min: min_version,
                local: local_version,
            });
        }
        Ok(())
    }

    /// The engine-level view of the protocol settings.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            min_version: self.protocol.min_version,
            local_version: self.protocol.local_version,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from the platform location, or defaults if absent.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<DebuggerConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] for malformed TOML, and
/// [`ConfigError::InvalidVersionRange`] for an empty version range.
pub fn load_config_from(path: &Path) -> Result<DebuggerConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<DebuggerConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DebuggerConfig::default(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ScmpDebugger"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("scmp-debugger"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ScmpDebugger")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
