//! OpenIGTLink Protocol Constants

// Header geometry
pub const HEADER_SIZE: usize = 58;
pub const TYPE_NAME_SIZE: usize = 12;
pub const DEVICE_NAME_SIZE: usize = 20;

// Header versions
pub const HEADER_VERSION_1: u16 = 1;
pub const HEADER_VERSION_2: u16 = 2;

// Extended header (header version 2 and later)
pub const EXTENDED_HEADER_SIZE: usize = 12;

// Chunk size used when draining or streaming a body without buffering it
pub const DRAIN_CHUNK_SIZE: usize = 256;

// Registered message types
pub const TYPE_TRANSFORM: &str = "TRANSFORM";
pub const TYPE_POSITION: &str = "POSITION";
pub const TYPE_IMAGE: &str = "IMAGE";
pub const TYPE_STATUS: &str = "STATUS";
pub const TYPE_POINT: &str = "POINT";
pub const TYPE_TRAJECTORY: &str = "TRAJ";
pub const TYPE_STRING: &str = "STRING";
pub const TYPE_BIND: &str = "BIND";
pub const TYPE_CAPABILITY: &str = "CAPABILITY";
pub const TYPE_TRACKING_DATA: &str = "TDATA";
pub const TYPE_QUATERNION_TRACKING_DATA: &str = "QTDATA";

// Default port used by 3D Slicer and most OpenIGTLink servers
pub const DEFAULT_PORT: u16 = 18944;
