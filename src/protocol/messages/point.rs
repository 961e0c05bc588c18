//! POINT message

use bytes::{Buf, BufMut};

use super::{
    ensure_multiple, fmt_tuple, get_f32s, get_fixed_str, put_f32s, put_fixed_str, CharField,
    CodecError, MessageBody,
};
use crate::protocol::constants::TYPE_POINT;

const ELEMENT_SIZE: usize = 136;
const NAME_SIZE: usize = 64;
const GROUP_SIZE: usize = 32;
const OWNER_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct PointElement {
    pub name: CharField,
    pub group: CharField,
    pub rgba: [u8; 4],
    pub position: [f32; 3],
    pub radius: f32,
    pub owner: CharField,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointMessage {
    pub elements: Vec<PointElement>,
}

impl MessageBody for PointMessage {
    const TYPE_NAME: &'static str = TYPE_POINT;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        let count = ensure_multiple(content, ELEMENT_SIZE, TYPE_POINT)?;
        let mut buf = content;
        let mut elements = Vec::with_capacity(count);

        for _ in 0..count {
            let name = get_fixed_str(&mut buf, NAME_SIZE);
            let group = get_fixed_str(&mut buf, GROUP_SIZE);
            let rgba = [buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8()];
            let position = get_f32s::<3>(&mut buf);
            let radius = buf.get_f32();
            let owner = get_fixed_str(&mut buf, OWNER_SIZE);
            elements.push(PointElement {
                name,
                group,
                rgba,
                position,
                radius,
                owner,
            });
        }

        Ok(Self { elements })
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.elements.len() * ELEMENT_SIZE);
        for element in &self.elements {
            put_fixed_str(&mut buf, &element.name, NAME_SIZE)?;
            put_fixed_str(&mut buf, &element.group, GROUP_SIZE)?;
            buf.put_slice(&element.rgba);
            put_f32s(&mut buf, &element.position);
            buf.put_f32(element.radius);
            put_fixed_str(&mut buf, &element.owner, OWNER_SIZE)?;
        }
        Ok(buf)
    }

    fn describe(&self) -> String {
        let elements: Vec<String> = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| {
                format!(
                    "#{} Name={}, Group={}, RGBA={}, Position={}, Radius={}, Owner={}",
                    i,
                    e.name,
                    e.group,
                    fmt_tuple(&e.rgba),
                    fmt_tuple(&e.position),
                    e.radius,
                    e.owner
                )
            })
            .collect();
        format!("Points={} [{}]", self.elements.len(), elements.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_elements() {
        let message = PointMessage {
            elements: vec![
                PointElement {
                    name: "Target".into(),
                    group: "Fiducials".into(),
                    rgba: [255, 0, 0, 255],
                    position: [10.0, 20.5, -3.0],
                    radius: 2.0,
                    owner: "Planner".into(),
                },
                PointElement {
                    name: "Entry".into(),
                    group: "Fiducials".into(),
                    rgba: [0, 255, 0, 128],
                    position: [0.0, 0.0, 0.0],
                    radius: 1.0,
                    owner: CharField::default(),
                },
            ],
        };

        let content = message.encode().unwrap();
        assert_eq!(content.len(), 2 * 136);
        let decoded = PointMessage::decode(&content).unwrap();
        assert_eq!(decoded, message);
        assert!(decoded.describe().starts_with("Points=2 [#0 Name=Target, Group=Fiducials"));
    }

    #[test]
    fn test_partial_element_rejected() {
        assert!(PointMessage::decode(&[0u8; 137]).is_err());
    }
}
