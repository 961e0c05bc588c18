//! STATUS message

use bytes::{Buf, BufMut};

use super::{ensure_len, get_fixed_str, put_fixed_str, CharField, CodecError, MessageBody};
use crate::protocol::constants::TYPE_STATUS;

const FIXED_SIZE: usize = 30;
const ERROR_NAME_SIZE: usize = 20;

/// Status codes
pub const STATUS_INVALID: u16 = 0;
pub const STATUS_OK: u16 = 1;
pub const STATUS_UNKNOWN_ERROR: u16 = 2;
pub const STATUS_PANIC: u16 = 3;
pub const STATUS_NOT_FOUND: u16 = 4;
pub const STATUS_ACCESS_DENIED: u16 = 5;
pub const STATUS_BUSY: u16 = 6;
pub const STATUS_TIME_OUT: u16 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub code: u16,
    pub subcode: i64,
    pub error_name: CharField,
    /// Status text with its terminator, as sent.
    pub status: CharField,
}

impl StatusMessage {
    pub fn new(code: u16, subcode: i64, error_name: &str, status: &str) -> Self {
        Self {
            code,
            subcode,
            error_name: error_name.into(),
            status: CharField::terminated(status),
        }
    }
}

impl MessageBody for StatusMessage {
    const TYPE_NAME: &'static str = TYPE_STATUS;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        ensure_len(content, FIXED_SIZE)?;
        let mut buf = content;
        let code = buf.get_u16();
        let subcode = buf.get_i64();
        let error_name = get_fixed_str(&mut buf, ERROR_NAME_SIZE);
        let status = CharField::from_bytes(buf);

        Ok(Self {
            code,
            subcode,
            error_name,
            status,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(FIXED_SIZE + self.status.as_bytes().len());
        buf.put_u16(self.code);
        buf.put_i64(self.subcode);
        put_fixed_str(&mut buf, &self.error_name, ERROR_NAME_SIZE)?;
        buf.put_slice(self.status.as_bytes());
        Ok(buf)
    }

    fn describe(&self) -> String {
        format!(
            "Code={}, SubCode={}, ErrorName={}, Status={}",
            self.code, self.subcode, self.error_name, self.status
        )
    }
}
