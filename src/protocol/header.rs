//! OpenIGTLink Message Header

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut};
use crc::{Crc, CRC_64_ECMA_182};

use super::constants::*;
use super::messages::{fixed_str, put_fixed_str, CharField, CodecError};

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// CRC-64/ECMA-182 as used for OpenIGTLink body checksums.
pub fn crc64(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Message timestamp: whole seconds plus a 32-bit binary fraction of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl Timestamp {
    /// Split the 64-bit wire representation.
    pub fn from_raw(raw: u64) -> Self {
        Self {
            seconds: (raw >> 32) as u32,
            fraction: raw as u32,
        }
    }

    pub fn to_raw(self) -> u64 {
        (u64::from(self.seconds) << 32) | u64::from(self.fraction)
    }

    /// Build from seconds and nanoseconds. Nanoseconds above one second are clamped.
    pub fn from_nanos(seconds: u32, nanoseconds: u32) -> Self {
        let nanos = u64::from(nanoseconds.min(999_999_999));
        Self {
            seconds,
            fraction: ((nanos << 32) / 1_000_000_000) as u32,
        }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_nanos(elapsed.as_secs() as u32, elapsed.subsec_nanos())
    }

    pub fn nanoseconds(self) -> u32 {
        ((u64::from(self.fraction) * 1_000_000_000) >> 32) as u32
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds())
    }
}

/// A parsed message header.
///
/// The header keeps the exact bytes it was parsed from, so a message relayed
/// without decoding leaves the relay byte-identical. `body_size` is the number
/// of bytes that follow on the stream for this message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    version: u16,
    device_type: String,
    device_name: String,
    timestamp: Timestamp,
    body_size: u64,
    crc: u64,
    raw: [u8; HEADER_SIZE],
}

impl Header {
    /// Parse a header from its wire bytes. Every 58-byte input is a header;
    /// non-UTF-8 names are converted lossily.
    pub fn parse(raw: [u8; HEADER_SIZE]) -> Self {
        let mut buf = &raw[..];
        let version = buf.get_u16();
        let device_type = fixed_str(&buf[..TYPE_NAME_SIZE]).text().into_owned();
        buf.advance(TYPE_NAME_SIZE);
        let device_name = fixed_str(&buf[..DEVICE_NAME_SIZE]).text().into_owned();
        buf.advance(DEVICE_NAME_SIZE);
        let timestamp = Timestamp::from_raw(buf.get_u64());
        let body_size = buf.get_u64();
        let crc = buf.get_u64();

        Self {
            version,
            device_type,
            device_name,
            timestamp,
            body_size,
            crc,
            raw,
        }
    }

    /// Build a header describing `body`.
    pub fn new(
        version: u16,
        device_type: &str,
        device_name: &str,
        timestamp: Timestamp,
        body: &[u8],
    ) -> Result<Self, CodecError> {
        let mut raw = Vec::with_capacity(HEADER_SIZE);
        raw.put_u16(version);
        put_fixed_str(&mut raw, &CharField::from(device_type), TYPE_NAME_SIZE)?;
        put_fixed_str(&mut raw, &CharField::from(device_name), DEVICE_NAME_SIZE)?;
        raw.put_u64(timestamp.to_raw());
        raw.put_u64(body.len() as u64);
        raw.put_u64(crc64(body));

        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(&raw);
        Ok(Self::parse(bytes))
    }

    /// A header with the same version, type, device name and timestamp that
    /// describes a different body.
    pub fn for_body(&self, body: &[u8]) -> Self {
        let mut raw = self.raw;
        let size_at = HEADER_SIZE - 16;
        raw[size_at..size_at + 8].copy_from_slice(&(body.len() as u64).to_be_bytes());
        raw[size_at + 8..].copy_from_slice(&crc64(body).to_be_bytes());
        Self::parse(raw)
    }

    /// Check `body` against the header's declared size and CRC.
    pub fn verify_body(&self, body: &[u8]) -> Result<(), CodecError> {
        if body.len() as u64 != self.body_size {
            return Err(CodecError::Truncated {
                needed: self.body_size as usize,
                available: body.len(),
            });
        }
        let computed = crc64(body);
        if computed != self.crc {
            return Err(CodecError::CrcMismatch {
                expected: self.crc,
                computed,
            });
        }
        Ok(())
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    pub fn crc(&self) -> u64 {
        self.crc
    }

    /// The wire bytes this header was parsed from.
    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.raw
    }
}
