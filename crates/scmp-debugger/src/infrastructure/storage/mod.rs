//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the debugger's TOML settings and
//! supplies defaults when no file exists yet.

pub mod config;
