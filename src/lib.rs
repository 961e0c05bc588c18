//! igtl-relay Library
//!
//! Bidirectional OpenIGTLink relay. Each accepted client is paired with one
//! outbound connection to the destination. Two relay sessions forward
//! messages between them, decoding and logging registered types, passing
//! unknown types through untouched and draining blocked types off the wire.

pub mod config;
pub mod connection;
pub mod error;
pub mod log_sink;
pub mod protocol;
pub mod relay;
pub mod shutdown;

pub use config::Config;
pub use connection::Supervisor;
pub use error::RelayError;
pub use log_sink::{LogLine, LogSink, MemoryLog};
pub use relay::{BlacklistFilter, MessageDispatcher, RelaySession, SessionState, SessionStats, TypeRegistry};
pub use shutdown::ShutdownCoordinator;

/// Common error type for the binary and configuration layer
pub type Result<T> = anyhow::Result<T>;
