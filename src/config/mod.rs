//! Configuration Module
//!
//! Handles configuration loading, command line merging and validation.

pub mod manager;
pub mod types;

pub use manager::{CliOverrides, ConfigManager};
pub use types::*;
