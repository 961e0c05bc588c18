//! Relay Module
//!
//! The per-direction forwarding engine: frame reading, type filtering,
//! dispatch and the session state machine.

pub mod dispatcher;
pub mod engine;
pub mod filter;
pub mod frame;
pub mod session;

pub use dispatcher::{DispatchOutcome, MessageDispatcher, Route, TypeRegistry};
pub use engine::RelayEngine;
pub use filter::BlacklistFilter;
pub use frame::FrameReader;
pub use session::{RelaySession, SessionState, SessionStats};
