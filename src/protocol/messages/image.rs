//! IMAGE message

use bytes::{Buf, BufMut};

use super::{ensure_len, fmt_tuple, get_f32s, put_f32s, CodecError, MessageBody};
use crate::protocol::constants::TYPE_IMAGE;

const IMAGE_HEADER_SIZE: usize = 72;

/// Scalar type codes
pub const SCALAR_INT8: u8 = 2;
pub const SCALAR_UINT8: u8 = 3;
pub const SCALAR_INT16: u8 = 4;
pub const SCALAR_UINT16: u8 = 5;
pub const SCALAR_INT32: u8 = 6;
pub const SCALAR_UINT32: u8 = 7;
pub const SCALAR_FLOAT32: u8 = 10;
pub const SCALAR_FLOAT64: u8 = 11;

/// Bytes per scalar, or `None` for an unknown code.
pub fn scalar_size(scalar_type: u8) -> Option<usize> {
    match scalar_type {
        SCALAR_INT8 | SCALAR_UINT8 => Some(1),
        SCALAR_INT16 | SCALAR_UINT16 => Some(2),
        SCALAR_INT32 | SCALAR_UINT32 | SCALAR_FLOAT32 => Some(4),
        SCALAR_FLOAT64 => Some(8),
        _ => None,
    }
}

/// Image or sub-volume of an image.
///
/// `matrix` holds the three axis vectors scaled by spacing followed by the
/// origin: tx ty tz sx sy sz nx ny nz px py pz.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMessage {
    pub image_header_version: u16,
    pub num_components: u8,
    pub scalar_type: u8,
    pub endian: u8,
    pub coordinate: u8,
    pub dimensions: [u16; 3],
    pub matrix: [f32; 12],
    pub subvolume_offset: [u16; 3],
    pub subvolume_size: [u16; 3],
    pub pixels: Vec<u8>,
}

impl ImageMessage {
    /// Spacing in mm per pixel along each axis.
    pub fn spacing(&self) -> [f32; 3] {
        let m = &self.matrix;
        let norm = |x: f32, y: f32, z: f32| (x * x + y * y + z * z).sqrt();
        [
            norm(m[0], m[1], m[2]),
            norm(m[3], m[4], m[5]),
            norm(m[6], m[7], m[8]),
        ]
    }

    /// Expected pixel payload size for the declared sub-volume.
    pub fn expected_pixel_bytes(&self) -> Option<usize> {
        let scalar = scalar_size(self.scalar_type)?;
        self.subvolume_size
            .iter()
            .try_fold(self.num_components as usize * scalar, |acc, &d| acc.checked_mul(d as usize))
    }
}

fn get_u16s(buf: &mut &[u8]) -> [u16; 3] {
    [buf.get_u16(), buf.get_u16(), buf.get_u16()]
}

impl MessageBody for ImageMessage {
    const TYPE_NAME: &'static str = TYPE_IMAGE;

    fn decode(content: &[u8]) -> Result<Self, CodecError> {
        ensure_len(content, IMAGE_HEADER_SIZE)?;
        let mut buf = content;

        let mut image = Self {
            image_header_version: buf.get_u16(),
            num_components: buf.get_u8(),
            scalar_type: buf.get_u8(),
            endian: buf.get_u8(),
            coordinate: buf.get_u8(),
            dimensions: get_u16s(&mut buf),
            matrix: get_f32s::<12>(&mut buf),
            subvolume_offset: get_u16s(&mut buf),
            subvolume_size: get_u16s(&mut buf),
            pixels: Vec::new(),
        };

        let expected = image.expected_pixel_bytes().ok_or_else(|| {
            CodecError::Malformed(format!("unknown scalar type {}", image.scalar_type))
        })?;
        if buf.len() != expected {
            return Err(CodecError::Malformed(format!(
                "IMAGE pixel data is {} bytes, sub-volume declares {}",
                buf.len(),
                expected
            )));
        }
        image.pixels = buf.to_vec();
        Ok(image)
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(IMAGE_HEADER_SIZE + self.pixels.len());
        buf.put_u16(self.image_header_version);
        buf.put_u8(self.num_components);
        buf.put_u8(self.scalar_type);
        buf.put_u8(self.endian);
        buf.put_u8(self.coordinate);
        for d in self.dimensions {
            buf.put_u16(d);
        }
        put_f32s(&mut buf, &self.matrix);
        for d in self.subvolume_offset {
            buf.put_u16(d);
        }
        for d in self.subvolume_size {
            buf.put_u16(d);
        }
        buf.put_slice(&self.pixels);
        Ok(buf)
    }

    fn describe(&self) -> String {
        format!(
            "ScalarType={}, Endian={}, Dimensions={}, Spacing={}, SubVolumeSize={}, SubVolumeOffset={}",
            self.scalar_type,
            self.endian,
            fmt_tuple(&self.dimensions),
            fmt_tuple(&self.spacing()),
            fmt_tuple(&self.subvolume_size),
            fmt_tuple(&self.subvolume_offset)
        )
    }
}
