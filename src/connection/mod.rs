//! Connection Management Module
//!
//! Accept loop and pair supervision.

pub mod supervisor;

pub use supervisor::{PairStats, Supervisor, DOWNSTREAM, UPSTREAM};
