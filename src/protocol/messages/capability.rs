//! CAPABILITY message

use super::{ensure_multiple, get_fixed_str, put_fixed_str, CharField, CodecError, MessageBody};
use crate::protocol::constants::{TYPE_CAPABILITY, TYPE_NAME_SIZE};

/// Message types a peer declares it can handle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilityMessage {
    pub types: Vec<CharField>,
}

impl MessageBody for CapabilityMessage {
    const TYPE_NAME: &'static str = TYPE_CAPABILITY;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        let count = ensure_multiple(content, TYPE_NAME_SIZE, TYPE_CAPABILITY)?;
        let mut buf = content;
        let types = (0..count)
            .map(|_| get_fixed_str(&mut buf, TYPE_NAME_SIZE))
            .collect();
        Ok(Self { types })
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.types.len() * TYPE_NAME_SIZE);
        for name in &self.types {
            put_fixed_str(&mut buf, name, TYPE_NAME_SIZE)?;
        }
        Ok(buf)
    }

    fn describe(&self) -> String {
        let types: Vec<String> = self.types.iter().map(|t| t.text().into_owned()).collect();
        format!("Types=[{}]", types.join(", "))
    }
}
