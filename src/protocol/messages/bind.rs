//! BIND message
//!
//! A bind message packs several child messages of registered types into one
//! body: a child count, a type/size table, a NUL-separated name table padded to
//! an even length, then each child body padded to an even length.

use bytes::{Buf, BufMut};

use super::{ensure_len, get_fixed_str, put_fixed_str, CharField, CodecError, MessageBody};
use crate::protocol::constants::{TYPE_BIND, TYPE_NAME_SIZE};

const TABLE_ENTRY_SIZE: usize = TYPE_NAME_SIZE + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindChild {
    pub type_name: CharField,
    pub device_name: CharField,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindMessage {
    pub children: Vec<BindChild>,
}

impl BindMessage {
    /// Summary with a per-child description supplied by `describe_child`.
    /// Children it cannot describe are listed by type and size.
    pub fn describe_with<F>(&self, describe_child: F) -> String
    where
        F: Fn(&BindChild) -> Option<String>,
    {
        let children: Vec<String> = self
            .children
            .iter()
            .map(|child| match describe_child(child) {
                Some(summary) => format!("{} {}: {}", child.type_name, child.device_name, summary),
                None => format!(
                    "{} {} ({} bytes)",
                    child.type_name,
                    child.device_name,
                    child.body.len()
                ),
            })
            .collect();
        format!("Children={} [{}]", self.children.len(), children.join("; "))
    }
}

impl MessageBody for BindMessage {
    const TYPE_NAME: &'static str = TYPE_BIND;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        ensure_len(content, 2)?;
        let mut buf = content;
        let count = buf.get_u16() as usize;

        let table_size = count
            .checked_mul(TABLE_ENTRY_SIZE)
            .and_then(|size| size.checked_add(2))
            .ok_or_else(|| CodecError::Malformed(format!("BIND child count {} overflows", count)))?;
        ensure_len(buf, table_size)?;
        let mut table = Vec::with_capacity(count);
        for _ in 0..count {
            let type_name = get_fixed_str(&mut buf, TYPE_NAME_SIZE);
            let size = buf.get_u64();
            table.push((type_name, size));
        }

        let name_table_size = buf.get_u16() as usize;
        ensure_len(buf, name_table_size)?;
        let (name_table, mut bodies) = buf.split_at(name_table_size);
        let mut names = name_table.split(|&b| b == 0);

        let mut children = Vec::with_capacity(count);
        for (type_name, size) in table {
            let device_name = names
                .next()
                .map(CharField::from_bytes)
                .ok_or_else(|| CodecError::Malformed("BIND name table is short".to_string()))?;

            let size = usize::try_from(size)
                .map_err(|_| CodecError::Malformed(format!("BIND child size {} overflows", size)))?;
            let padded = size
                .checked_add(size % 2)
                .ok_or_else(|| CodecError::Malformed(format!("BIND child size {} overflows", size)))?;
            ensure_len(bodies, padded)?;
            children.push(BindChild {
                type_name,
                device_name,
                body: bodies[..size].to_vec(),
            });
            bodies.advance(padded);
        }

        if !bodies.is_empty() {
            return Err(CodecError::Malformed(format!(
                "{} trailing bytes after BIND children",
                bodies.len()
            )));
        }

        Ok(Self { children })
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let count = u16::try_from(self.children.len())
            .map_err(|_| CodecError::Malformed("too many BIND children".to_string()))?;

        let mut name_table = Vec::new();
        for child in &self.children {
            name_table.put_slice(child.device_name.as_bytes());
            name_table.put_u8(0);
        }
        if name_table.len() % 2 != 0 {
            name_table.put_u8(0);
        }
        let name_table_size = u16::try_from(name_table.len())
            .map_err(|_| CodecError::Malformed("BIND name table too large".to_string()))?;

        let mut buf = Vec::new();
        buf.put_u16(count);
        for child in &self.children {
            put_fixed_str(&mut buf, &child.type_name, TYPE_NAME_SIZE)?;
            buf.put_u64(child.body.len() as u64);
        }
        buf.put_u16(name_table_size);
        buf.put_slice(&name_table);
        for child in &self.children {
            buf.put_slice(&child.body);
            if child.body.len() % 2 != 0 {
                buf.put_u8(0);
            }
        }
        Ok(buf)
    }

    fn describe(&self) -> String {
        self.describe_with(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BindMessage {
        BindMessage {
            children: vec![
                BindChild {
                    type_name: "STRING".into(),
                    device_name: "Note".into(),
                    body: vec![0, 3, 0, 3, b'a', b'b', b'c'],
                },
                BindChild {
                    type_name: "TRANSFORM".into(),
                    device_name: "Tool".into(),
                    body: vec![0; 48],
                },
            ],
        }
    }

    #[test]
    fn test_bind_layout() {
        let content = sample().encode().unwrap();
        // count + table + name table size + "Note\0Tool\0" + 7 (+1 pad) + 48
        assert_eq!(content.len(), 2 + 40 + 2 + 10 + 8 + 48);
        assert_eq!(BindMessage::decode(&content).unwrap(), sample());
    }

    #[test]
    fn test_describe_falls_back_to_size() {
        assert_eq!(
            sample().describe(),
            "Children=2 [STRING Note (7 bytes); TRANSFORM Tool (48 bytes)]"
        );
    }

    #[test]
    fn test_oversized_child_rejected() {
        let mut content = sample().encode().unwrap();
        // first child's size field follows the count and its type name
        content[14..22].copy_from_slice(&u64::MAX.to_be_bytes());
        assert!(BindMessage::decode(&content).is_err());

        content[14..22].copy_from_slice(&1000u64.to_be_bytes());
        assert!(matches!(
            BindMessage::decode(&content),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut content = sample().encode().unwrap();
        content.push(0);
        assert!(matches!(
            BindMessage::decode(&content),
            Err(CodecError::Malformed(_))
        ));
    }
}
