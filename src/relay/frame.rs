//! Frame Reader
//!
//! Reads headers and bodies off a byte stream. Every body operation consumes
//! exactly the declared number of bytes so the next read starts on a header
//! boundary.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::RelayError;
use crate::protocol::constants::{DRAIN_CHUNK_SIZE, HEADER_SIZE};
use crate::protocol::Header;

/// Map a read-side I/O failure to the relay taxonomy.
fn read_error(e: io::Error) -> RelayError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => RelayError::ConnectionClosed,
        _ => RelayError::Io(e),
    }
}

/// Wraps the source half of a direction.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    /// Total bytes consumed from the source so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read one fixed-size header.
    ///
    /// End of stream before the first byte is `ConnectionClosed`; end of
    /// stream part-way through is `SizeError`.
    pub async fn read_header(&mut self) -> Result<Header, RelayError> {
        let mut raw = [0u8; HEADER_SIZE];
        let mut filled = 0;

        while filled < HEADER_SIZE {
            let n = self.inner.read(&mut raw[filled..]).await.map_err(read_error)?;
            if n == 0 {
                if filled == 0 {
                    return Err(RelayError::ConnectionClosed);
                }
                return Err(RelayError::SizeError {
                    expected: HEADER_SIZE,
                    actual: filled,
                });
            }
            filled += n;
        }

        self.bytes_read += HEADER_SIZE as u64;
        Ok(Header::parse(raw))
    }

    /// Read exactly `length` body bytes into memory.
    pub async fn read_body(&mut self, length: u64) -> Result<Vec<u8>, RelayError> {
        let length = usize::try_from(length).map_err(|_| {
            RelayError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("body length {} exceeds addressable memory", length),
            ))
        })?;

        let mut body = vec![0u8; length];
        self.inner.read_exact(&mut body).await.map_err(read_error)?;
        self.bytes_read += length as u64;
        Ok(body)
    }

    /// Consume and discard exactly `length` bytes in bounded chunks.
    pub async fn drain(&mut self, length: u64) -> Result<u64, RelayError> {
        let mut chunk = [0u8; DRAIN_CHUNK_SIZE];
        let mut remaining = length;

        while remaining > 0 {
            let want = remaining.min(DRAIN_CHUNK_SIZE as u64) as usize;
            let n = self.inner.read(&mut chunk[..want]).await.map_err(read_error)?;
            if n == 0 {
                return Err(RelayError::ConnectionClosed);
            }
            remaining -= n as u64;
            self.bytes_read += n as u64;
        }

        trace!("Drained {} bytes", length);
        Ok(length)
    }

    /// Copy exactly `length` bytes to `dest` in bounded chunks.
    ///
    /// Returns a copy of the first chunk for diagnostics.
    pub async fn forward_body<W>(&mut self, length: u64, dest: &mut W) -> Result<Vec<u8>, RelayError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut chunk = [0u8; DRAIN_CHUNK_SIZE];
        let mut first_chunk = Vec::new();
        let mut remaining = length;

        while remaining > 0 {
            let want = remaining.min(DRAIN_CHUNK_SIZE as u64) as usize;
            let n = self.inner.read(&mut chunk[..want]).await.map_err(read_error)?;
            if n == 0 {
                return Err(RelayError::ConnectionClosed);
            }
            self.bytes_read += n as u64;
            remaining -= n as u64;

            if first_chunk.len() < DRAIN_CHUNK_SIZE {
                let take = n.min(DRAIN_CHUNK_SIZE - first_chunk.len());
                first_chunk.extend_from_slice(&chunk[..take]);
            }
            dest.write_all(&chunk[..n])
                .await
                .map_err(RelayError::DestinationClosed)?;
        }

        Ok(first_chunk)
    }
}
