//! Infrastructure layer for the debugger.
//!
//! Contains the adapters the session engine is wired to at runtime: the TCP
//! transport, the freeze signal, traffic recording sinks, the TOML config
//! file, and the async driver that owns the engine.
//!
//! **Dependency rule**: this layer may depend on `application` and `scmp_core`,
//! but MUST NOT be imported by the `application` layer outside of tests.
//!
//! # Sub-modules
//!
//! - **`transport`** – `TcpTransport` (tokio sockets, one reader and one writer
//!   task per connection) and `MemoryTransport` for tests.
//!
//! - **`freeze`** – `FreezeFlag`, the default `ExecutionFreeze` collaborator,
//!   plus a recording mock.
//!
//! - **`diagnostics`** – `FileSink` appends raw traffic to a log file;
//!   `MemorySink` keeps it in memory for assertions.
//!
//! - **`storage`** – TOML configuration in the platform config directory.
//!
//! - **`driver`** – `SessionDriver`, the single task that serialises transport
//!   events and user commands into the engine.

pub mod diagnostics;
pub mod driver;
pub mod freeze;
pub mod storage;
pub mod transport;
