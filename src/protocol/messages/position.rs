//! POSITION message

use super::{fmt_tuple, get_f32s, put_f32s, CodecError, MessageBody};
use crate::protocol::constants::TYPE_POSITION;

const POSITION_ONLY_SIZE: usize = 12;
const COMPACT_SIZE: usize = 24;
const FULL_SIZE: usize = 28;

/// How many quaternion components travel on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuaternionFormat {
    /// No orientation; the quaternion reads as identity.
    Absent,
    /// `ox, oy, oz`; `w` is recovered from the unit norm.
    Compact,
    Full,
}

/// Position plus orientation quaternion `(ox, oy, oz, w)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionMessage {
    pub position: [f32; 3],
    pub quaternion: [f32; 4],
    pub format: QuaternionFormat,
}

impl PositionMessage {
    pub fn new(position: [f32; 3], quaternion: [f32; 4]) -> Self {
        Self {
            position,
            quaternion,
            format: QuaternionFormat::Full,
        }
    }
}

impl MessageBody for PositionMessage {
    const TYPE_NAME: &'static str = TYPE_POSITION;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        let mut buf = content;
        match content.len() {
            POSITION_ONLY_SIZE => Ok(Self {
                position: get_f32s::<3>(&mut buf),
                quaternion: [0.0, 0.0, 0.0, 1.0],
                format: QuaternionFormat::Absent,
            }),
            COMPACT_SIZE => {
                let position = get_f32s::<3>(&mut buf);
                let [ox, oy, oz] = get_f32s::<3>(&mut buf);
                let w = (1.0 - (ox * ox + oy * oy + oz * oz)).max(0.0).sqrt();
                Ok(Self {
                    position,
                    quaternion: [ox, oy, oz, w],
                    format: QuaternionFormat::Compact,
                })
            }
            FULL_SIZE => Ok(Self {
                position: get_f32s::<3>(&mut buf),
                quaternion: get_f32s::<4>(&mut buf),
                format: QuaternionFormat::Full,
            }),
            other => Err(CodecError::Malformed(format!(
                "POSITION body of {} bytes (expected 12, 24 or 28)",
                other
            ))),
        }
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(FULL_SIZE);
        put_f32s(&mut buf, &self.position);
        match self.format {
            QuaternionFormat::Absent => {}
            QuaternionFormat::Compact => put_f32s(&mut buf, &self.quaternion[..3]),
            QuaternionFormat::Full => put_f32s(&mut buf, &self.quaternion),
        }
        Ok(buf)
    }

    fn describe(&self) -> String {
        format!(
            "Position={}, Quaternion={}",
            fmt_tuple(&self.position),
            fmt_tuple(&self.quaternion)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_position_summary() {
        let message = PositionMessage::new([1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0]);
        let content = message.encode().unwrap();
        assert_eq!(content.len(), 28);

        let decoded = PositionMessage::decode(&content).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(
            decoded.describe(),
            "Position=(1, 2, 3), Quaternion=(0, 0, 0, 1)"
        );
    }

    #[test]
    fn test_position_only_keeps_short_form() {
        let mut content = Vec::new();
        put_f32s(&mut content, &[4.0, 5.0, 6.0]);

        let decoded = PositionMessage::decode(&content).unwrap();
        assert_eq!(decoded.format, QuaternionFormat::Absent);
        assert_eq!(decoded.quaternion, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(decoded.encode().unwrap(), content);
    }

    #[test]
    fn test_odd_size_is_malformed() {
        assert!(matches!(
            PositionMessage::decode(&[0u8; 20]),
            Err(CodecError::Malformed(_))
        ));
    }
}
