//! STRING message

use bytes::{Buf, BufMut};

use super::{ensure_exact, ensure_len, CodecError, MessageBody};
use crate::protocol::constants::TYPE_STRING;

const FIXED_SIZE: usize = 4;

/// IANA MIBenum for US-ASCII
pub const ENCODING_US_ASCII: u16 = 3;
/// IANA MIBenum for UTF-8
pub const ENCODING_UTF8: u16 = 106;

/// Text payload with its character-set code. The bytes are kept as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringMessage {
    pub encoding: u16,
    pub value: Vec<u8>,
}

impl StringMessage {
    pub fn new(value: &str) -> Self {
        Self {
            encoding: ENCODING_US_ASCII,
            value: value.as_bytes().to_vec(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

impl MessageBody for StringMessage {
    const TYPE_NAME: &'static str = TYPE_STRING;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        ensure_len(content, FIXED_SIZE)?;
        let mut buf = content;
        let encoding = buf.get_u16();
        let length = buf.get_u16() as usize;
        ensure_exact(buf, length, TYPE_STRING)?;

        Ok(Self {
            encoding,
            value: buf.to_vec(),
        })
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let length = u16::try_from(self.value.len()).map_err(|_| {
            CodecError::Malformed(format!("string of {} bytes exceeds 65535", self.value.len()))
        })?;
        let mut buf = Vec::with_capacity(FIXED_SIZE + self.value.len());
        buf.put_u16(self.encoding);
        buf.put_u16(length);
        buf.put_slice(&self.value);
        Ok(buf)
    }

    fn describe(&self) -> String {
        format!("Encoding={}, String={}", self.encoding, self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_summary() {
        let message = StringMessage::new("hello world");
        let content = message.encode().unwrap();
        assert_eq!(&content[..4], &[0, 3, 0, 11]);
        let decoded = StringMessage::decode(&content).unwrap();
        assert_eq!(decoded.describe(), "Encoding=3, String=hello world");
    }

    #[test]
    fn test_length_mismatch() {
        let content = [0u8, 3, 0, 5, b'a', b'b'];
        assert!(matches!(
            StringMessage::decode(&content),
            Err(CodecError::Truncated { needed: 5, available: 2 })
        ));
    }
}
