//! TDATA and QTDATA messages

use bytes::{Buf, BufMut};

use super::{
    ensure_multiple, fmt_tuple, get_f32s, get_fixed_str, put_f32s, put_fixed_str, CharField,
    CodecError, MessageBody,
};
use crate::protocol::constants::{TYPE_QUATERNION_TRACKING_DATA, TYPE_TRACKING_DATA};

const NAME_SIZE: usize = 20;
const TRACKING_ELEMENT_SIZE: usize = 70;
const QUATERNION_ELEMENT_SIZE: usize = 50;

/// Tracking instrument type codes
pub const INSTRUMENT_TRACKER: u8 = 1;
pub const INSTRUMENT_6D: u8 = 2;
pub const INSTRUMENT_3D: u8 = 3;
pub const INSTRUMENT_5D: u8 = 4;

/// One tracked instrument with its transform in TRANSFORM layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingElement {
    pub name: CharField,
    pub kind: u8,
    pub reserved: u8,
    pub transform: [f32; 12],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackingMessage {
    pub elements: Vec<TrackingElement>,
}

impl MessageBody for TrackingMessage {
    const TYPE_NAME: &'static str = TYPE_TRACKING_DATA;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        let count = ensure_multiple(content, TRACKING_ELEMENT_SIZE, TYPE_TRACKING_DATA)?;
        let mut buf = content;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(TrackingElement {
                name: get_fixed_str(&mut buf, NAME_SIZE),
                kind: buf.get_u8(),
                reserved: buf.get_u8(),
                transform: get_f32s::<12>(&mut buf),
            });
        }
        Ok(Self { elements })
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.elements.len() * TRACKING_ELEMENT_SIZE);
        for element in &self.elements {
            put_fixed_str(&mut buf, &element.name, NAME_SIZE)?;
            buf.put_u8(element.kind);
            buf.put_u8(element.reserved);
            put_f32s(&mut buf, &element.transform);
        }
        Ok(buf)
    }

    fn describe(&self) -> String {
        let elements: Vec<String> = self
            .elements
            .iter()
            .map(|e| {
                format!(
                    "{} Type={}, Translation={}",
                    e.name,
                    e.kind,
                    fmt_tuple(&e.transform[9..])
                )
            })
            .collect();
        format!("Trackers={} [{}]", self.elements.len(), elements.join("; "))
    }
}

/// One tracked instrument reported as position plus quaternion.
#[derive(Debug, Clone, PartialEq)]
pub struct QuaternionTrackingElement {
    pub name: CharField,
    pub kind: u8,
    pub reserved: u8,
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuaternionTrackingMessage {
    pub elements: Vec<QuaternionTrackingElement>,
}

impl MessageBody for QuaternionTrackingMessage {
    const TYPE_NAME: &'static str = TYPE_QUATERNION_TRACKING_DATA;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        let count = ensure_multiple(content, QUATERNION_ELEMENT_SIZE, TYPE_QUATERNION_TRACKING_DATA)?;
        let mut buf = content;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(QuaternionTrackingElement {
                name: get_fixed_str(&mut buf, NAME_SIZE),
                kind: buf.get_u8(),
                reserved: buf.get_u8(),
                position: get_f32s::<3>(&mut buf),
                quaternion: get_f32s::<4>(&mut buf),
            });
        }
        Ok(Self { elements })
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.elements.len() * QUATERNION_ELEMENT_SIZE);
        for element in &self.elements {
            put_fixed_str(&mut buf, &element.name, NAME_SIZE)?;
            buf.put_u8(element.kind);
            buf.put_u8(element.reserved);
            put_f32s(&mut buf, &element.position);
            put_f32s(&mut buf, &element.quaternion);
        }
        Ok(buf)
    }

    fn describe(&self) -> String {
        let elements: Vec<String> = self
            .elements
            .iter()
            .map(|e| {
                format!(
                    "{} Type={}, Position={}, Quaternion={}",
                    e.name,
                    e.kind,
                    fmt_tuple(&e.position),
                    fmt_tuple(&e.quaternion)
                )
            })
            .collect();
        format!("Trackers={} [{}]", self.elements.len(), elements.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_data_elements() {
        let message = TrackingMessage {
            elements: vec![TrackingElement {
                name: "Stylus".into(),
                kind: INSTRUMENT_6D,
                reserved: 0,
                transform: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 5.0, 6.0, 7.0],
            }],
        };
        let content = message.encode().unwrap();
        assert_eq!(content.len(), 70);
        let decoded = TrackingMessage::decode(&content).unwrap();
        assert_eq!(decoded.describe(), "Trackers=1 [Stylus Type=2, Translation=(5, 6, 7)]");
    }

    #[test]
    fn test_quaternion_tracking_elements() {
        let message = QuaternionTrackingMessage {
            elements: vec![
                QuaternionTrackingElement {
                    name: "Probe".into(),
                    kind: INSTRUMENT_5D,
                    reserved: 0,
                    position: [1.0, 2.0, 3.0],
                    quaternion: [0.0, 0.0, 0.0, 1.0],
                },
                QuaternionTrackingElement {
                    name: "Ref".into(),
                    kind: INSTRUMENT_TRACKER,
                    reserved: 0,
                    position: [0.0, 0.0, 0.0],
                    quaternion: [0.0, 0.0, 0.0, 1.0],
                },
            ],
        };
        let content = message.encode().unwrap();
        assert_eq!(content.len(), 100);
        assert_eq!(QuaternionTrackingMessage::decode(&content).unwrap(), message);
    }
}
