//! TRANSFORM message

use super::{ensure_exact, get_f32s, put_f32s, CodecError, MessageBody};
use crate::protocol::constants::TYPE_TRANSFORM;

const CONTENT_SIZE: usize = 48;

/// Rigid transform as the upper 3x4 block of a homogeneous matrix.
///
/// On the wire the rotation columns come first, then the translation:
/// R11 R21 R31 R12 R22 R32 R13 R23 R33 TX TY TZ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformMessage {
    pub values: [f32; 12],
}

impl TransformMessage {
    pub fn identity() -> Self {
        Self {
            values: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        }
    }

    /// The full 4x4 matrix, row-major.
    pub fn matrix(&self) -> [[f32; 4]; 4] {
        let v = &self.values;
        [
            [v[0], v[3], v[6], v[9]],
            [v[1], v[4], v[7], v[10]],
            [v[2], v[5], v[8], v[11]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    pub fn from_matrix(matrix: &[[f32; 4]; 4]) -> Self {
        let mut values = [0f32; 12];
        for column in 0..4 {
            for row in 0..3 {
                values[column * 3 + row] = matrix[row][column];
            }
        }
        Self { values }
    }
}

impl MessageBody for TransformMessage {
    const TYPE_NAME: &'static str = TYPE_TRANSFORM;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        ensure_exact(content, CONTENT_SIZE, TYPE_TRANSFORM)?;
        let mut buf = content;
        Ok(Self {
            values: get_f32s::<12>(&mut buf),
        })
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(CONTENT_SIZE);
        put_f32s(&mut buf, &self.values);
        Ok(buf)
    }

    fn describe(&self) -> String {
        describe_matrix(&self.matrix())
    }
}

/// `Matrix=[[..], [..], [..], [..]]` with all sixteen entries.
pub(crate) fn describe_matrix(matrix: &[[f32; 4]; 4]) -> String {
    let rows: Vec<String> = matrix
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            format!("[{}]", cells.join(", "))
        })
        .collect();
    format!("Matrix=[{}]", rows.join(", "))
}
