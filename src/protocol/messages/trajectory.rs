//! TRAJ message

use bytes::{Buf, BufMut};

use super::{
    ensure_multiple, fmt_tuple, get_f32s, get_fixed_str, put_f32s, put_fixed_str, CharField,
    CodecError, MessageBody,
};
use crate::protocol::constants::TYPE_TRAJECTORY;

const ELEMENT_SIZE: usize = 150;
const NAME_SIZE: usize = 64;
const GROUP_SIZE: usize = 32;
const OWNER_SIZE: usize = 20;

/// Trajectory type codes
pub const TRAJECTORY_ENTRY_ONLY: i8 = 1;
pub const TRAJECTORY_TARGET_ONLY: i8 = 2;
pub const TRAJECTORY_ENTRY_TARGET: i8 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryElement {
    pub name: CharField,
    pub group: CharField,
    pub kind: i8,
    pub reserved: i8,
    pub rgba: [u8; 4],
    pub entry: [f32; 3],
    pub target: [f32; 3],
    pub radius: f32,
    pub owner: CharField,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrajectoryMessage {
    pub elements: Vec<TrajectoryElement>,
}

impl MessageBody for TrajectoryMessage {
    const TYPE_NAME: &'static str = TYPE_TRAJECTORY;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        let count = ensure_multiple(content, ELEMENT_SIZE, TYPE_TRAJECTORY)?;
        let mut buf = content;
        let mut elements = Vec::with_capacity(count);

        for _ in 0..count {
            let name = get_fixed_str(&mut buf, NAME_SIZE);
            let group = get_fixed_str(&mut buf, GROUP_SIZE);
            let kind = buf.get_i8();
            let reserved = buf.get_i8();
            let rgba = [buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8()];
            let entry = get_f32s::<3>(&mut buf);
            let target = get_f32s::<3>(&mut buf);
            let radius = buf.get_f32();
            let owner = get_fixed_str(&mut buf, OWNER_SIZE);
            elements.push(TrajectoryElement {
                name,
                group,
                kind,
                reserved,
                rgba,
                entry,
                target,
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
            buf.put_i8(element.kind);
            buf.put_i8(element.reserved);
            buf.put_slice(&element.rgba);
            put_f32s(&mut buf, &element.entry);
            put_f32s(&mut buf, &element.target);
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
                    "#{} Name={}, Group={}, Type={}, RGBA={}, Entry={}, Target={}, Radius={}, Owner={}",
                    i,
                    e.name,
                    e.group,
                    e.kind,
                    fmt_tuple(&e.rgba),
                    fmt_tuple(&e.entry),
                    fmt_tuple(&e.target),
                    e.radius,
                    e.owner
                )
            })
            .collect();
        format!("Trajectories={} [{}]", self.elements.len(), elements.join("; "))
    }
}
