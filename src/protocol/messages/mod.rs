//! Message Body Codecs
//!
//! Each registered message type has a content codec implementing [`MessageBody`].
//! The relay decodes a body, logs a summary of it, and re-encodes it before
//! forwarding; `encode(decode(content))` reproduces well-formed content exactly.

pub mod bind;
pub mod capability;
pub mod image;
pub mod point;
pub mod position;
pub mod status;
pub mod string;
pub mod tracking;
pub mod trajectory;
pub mod transform;

pub use bind::{BindChild, BindMessage};
pub use capability::CapabilityMessage;
pub use image::ImageMessage;
pub use point::{PointElement, PointMessage};
pub use position::PositionMessage;
pub use status::StatusMessage;
pub use string::StringMessage;
pub use tracking::{QuaternionTrackingElement, QuaternionTrackingMessage, TrackingElement, TrackingMessage};
pub use trajectory::{TrajectoryElement, TrajectoryMessage};
pub use transform::TransformMessage;

use std::borrow::Cow;
use std::fmt;

use bytes::{Buf, BufMut};
use thiserror::Error;

use super::constants::{EXTENDED_HEADER_SIZE, HEADER_VERSION_1, HEADER_VERSION_2};

/// Codec failures. None of them is fatal to a relay direction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("truncated body: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("CRC mismatch: header declares {expected:#018x}, body computes {computed:#018x}")]
    CrcMismatch { expected: u64, computed: u64 },

    #[error("malformed body: {0}")]
    Malformed(String),

    #[error("unsupported header version {0}")]
    UnsupportedVersion(u16),
}

/// Content codec for one message type.
pub trait MessageBody: Sized {
    /// Wire type name carried in the header.
    const TYPE_NAME: &'static str;

    fn decode(content: &[u8]) -> Result<Self, CodecError>;

    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    /// One-line summary of the salient fields.
    fn describe(&self) -> String;
}

/// A body split around its message content.
///
/// Version 1 bodies are all content. Later versions wrap the content in an
/// extended header and trailing metadata, both of which are carried verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout<'a> {
    pub prefix: &'a [u8],
    pub content: &'a [u8],
    pub suffix: &'a [u8],
}

impl<'a> BodyLayout<'a> {
    pub fn split(version: u16, body: &'a [u8]) -> Result<Self, CodecError> {
        match version {
            HEADER_VERSION_1 => Ok(Self {
                prefix: &[],
                content: body,
                suffix: &[],
            }),
            HEADER_VERSION_2 => {
                ensure_len(body, EXTENDED_HEADER_SIZE)?;
                let mut ext = body;
                let ext_size = ext.get_u16() as usize;
                let meta_header_size = ext.get_u16() as usize;
                let meta_size = ext.get_u32() as usize;

                if ext_size < EXTENDED_HEADER_SIZE {
                    return Err(CodecError::Malformed(format!(
                        "extended header size {} is below {}",
                        ext_size, EXTENDED_HEADER_SIZE
                    )));
                }
                let trailer = meta_header_size + meta_size;
                if ext_size + trailer > body.len() {
                    return Err(CodecError::Malformed(format!(
                        "extended header ({}) and metadata ({}) exceed body size {}",
                        ext_size,
                        trailer,
                        body.len()
                    )));
                }

                let content_end = body.len() - trailer;
                Ok(Self {
                    prefix: &body[..ext_size],
                    content: &body[ext_size..content_end],
                    suffix: &body[content_end..],
                })
            }
            other => Err(CodecError::UnsupportedVersion(other)),
        }
    }

    /// Rebuild a body around new content.
    pub fn assemble(&self, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.prefix.len() + content.len() + self.suffix.len());
        body.extend_from_slice(self.prefix);
        body.extend_from_slice(content);
        body.extend_from_slice(self.suffix);
        body
    }
}

/// Fail with `Truncated` unless `buf` holds at least `needed` bytes.
pub(crate) fn ensure_len(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        return Err(CodecError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Fail unless `buf` is exactly `size` bytes.
pub(crate) fn ensure_exact(buf: &[u8], size: usize, what: &str) -> Result<(), CodecError> {
    ensure_len(buf, size)?;
    if buf.len() > size {
        return Err(CodecError::Malformed(format!(
            "{} body is {} bytes, expected {}",
            what,
            buf.len(),
            size
        )));
    }
    Ok(())
}

/// Fail with `Malformed` unless `buf` is a whole number of `element`-sized records.
pub(crate) fn ensure_multiple(buf: &[u8], element: usize, what: &str) -> Result<usize, CodecError> {
    if buf.len() % element != 0 {
        return Err(CodecError::Malformed(format!(
            "{} body of {} bytes is not a multiple of {}",
            what,
            buf.len(),
            element
        )));
    }
    Ok(buf.len() / element)
}

/// Bytes of a character field as they appear on the wire.
///
/// OpenIGTLink character fields carry no encoding, so the bytes are kept as
/// sent and re-encode unchanged. Text is only derived for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CharField(Vec<u8>);

impl CharField {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// `value` followed by a NUL terminator.
    pub fn terminated(value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Text up to the first NUL. Bytes that are not UTF-8 show as U+FFFD.
    pub fn text(&self) -> Cow<'_, str> {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        String::from_utf8_lossy(&self.0[..end])
    }
}

impl From<&str> for CharField {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Display for CharField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Decode a NUL-padded fixed-width field. Trailing padding is dropped, any
/// bytes between the terminator and the padding are kept.
pub(crate) fn fixed_str(field: &[u8]) -> CharField {
    let end = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    CharField::from_bytes(&field[..end])
}

/// Read a fixed-width field and advance past it.
pub(crate) fn get_fixed_str(buf: &mut &[u8], width: usize) -> CharField {
    let value = fixed_str(&buf[..width]);
    buf.advance(width);
    value
}

/// Write `value` NUL-padded to `width` bytes.
pub(crate) fn put_fixed_str<B: BufMut>(buf: &mut B, value: &CharField, width: usize) -> Result<(), CodecError> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(CodecError::Malformed(format!(
            "'{}' exceeds the {}-byte field",
            value, width
        )));
    }
    buf.put_slice(bytes);
    buf.put_bytes(0, width - bytes.len());
    Ok(())
}

pub(crate) fn get_f32s<const N: usize>(buf: &mut &[u8]) -> [f32; N] {
    let mut values = [0f32; N];
    for value in values.iter_mut() {
        *value = buf.get_f32();
    }
    values
}

pub(crate) fn put_f32s<B: BufMut>(buf: &mut B, values: &[f32]) {
    for value in values {
        buf.put_f32(*value);
    }
}

/// Format a vector as `(a, b, c)`.
pub(crate) fn fmt_tuple<T: std::fmt::Display>(values: &[T]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_one_layout_is_all_content() {
        let body = [1u8, 2, 3];
        let layout = BodyLayout::split(1, &body).unwrap();
        assert!(layout.prefix.is_empty());
        assert_eq!(layout.content, &body);
        assert!(layout.suffix.is_empty());
    }

    #[test]
    fn test_version_two_layout_splits_metadata() {
        let mut body = Vec::new();
        body.put_u16(12); // extended header size
        body.put_u16(4); // metadata header size
        body.put_u32(2); // metadata size
        body.put_u32(7); // message id
        body.extend_from_slice(b"content");
        body.extend_from_slice(&[9, 9, 9, 9, 8, 8]);

        let layout = BodyLayout::split(2, &body).unwrap();
        assert_eq!(layout.prefix.len(), 12);
        assert_eq!(layout.content, b"content");
        assert_eq!(layout.suffix, &[9, 9, 9, 9, 8, 8]);
        assert_eq!(layout.assemble(layout.content), body);
    }

    #[test]
    fn test_version_two_layout_rejects_overflow() {
        let mut body = Vec::new();
        body.put_u16(12);
        body.put_u16(100);
        body.put_u32(100);
        body.put_u32(0);
        assert!(matches!(
            BodyLayout::split(2, &body),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        assert_eq!(
            BodyLayout::split(9, &[]),
            Err(CodecError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_fixed_str_stops_at_nul() {
        assert_eq!(fixed_str(b"ABC\0\0junk").text(), "ABC");
        assert_eq!(fixed_str(b"FULLWIDTH").text(), "FULLWIDTH");
        assert_eq!(fixed_str(b"Tool\0\0\0\0"), CharField::from("Tool"));
    }

    #[test]
    fn test_fixed_str_keeps_raw_bytes() {
        let field = b"Caf\xe9\0junk\0\0\0";
        let value = fixed_str(field);
        assert_eq!(value.text(), "Caf\u{fffd}");

        let mut out = Vec::new();
        put_fixed_str(&mut out, &value, field.len()).unwrap();
        assert_eq!(out, field);
    }
}
