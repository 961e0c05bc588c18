//! OpenIGTLink Protocol Implementation
//!
//! Header framing, CRC and the body codecs for the registered message types.

pub mod constants;
pub mod header;
pub mod messages;

pub use constants::*;
pub use header::{crc64, Header, Timestamp};
pub use messages::{BodyLayout, CodecError, MessageBody};
