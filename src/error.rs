//! Relay Error Types

use std::io;
use thiserror::Error;

/// Errors raised by the relay engine.
///
/// Only [`RelayError::Config`] is fatal to the process. Every other variant is
/// scoped to one direction or one connection attempt. Codec failures never
/// surface here; they are reported as a dispatch outcome.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The source peer closed its end before a new header started.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The header arrived truncated.
    #[error("header size error: expected {expected} bytes, got {actual}")]
    SizeError { expected: usize, actual: usize },

    /// Writing to the destination failed.
    #[error("destination closed: {0}")]
    DestinationClosed(#[source] io::Error),

    /// The outbound connection could not be opened.
    #[error("failed to connect to {target}: {reason}")]
    ConnectFailed { target: String, reason: String },

    #[error("session is already running")]
    AlreadyRunning,

    #[error("session has already stopped")]
    AlreadyStopped,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
