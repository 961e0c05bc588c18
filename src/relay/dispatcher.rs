//! Message Dispatcher
//!
//! Classifies each message by its declared type and moves its body:
//! blocked types are drained, registered types are decoded, summarized and
//! re-encoded, and anything else is streamed through untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::filter::BlacklistFilter;
use super::frame::FrameReader;
use crate::error::RelayError;
use crate::protocol::constants::*;
use crate::protocol::messages::*;
use crate::protocol::Header;

/// Default ceiling for bodies buffered in memory for decoding.
pub const DEFAULT_MAX_DECODE_BODY_SIZE: u64 = 256 * 1024 * 1024;

/// Result of decoding a registered message's content.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub summary: String,
    pub content: Vec<u8>,
}

/// Decode-and-describe entry point for one message type.
pub type DecodeFn = fn(&TypeRegistry, &[u8]) -> Result<Decoded, CodecError>;

fn decode_body<M: MessageBody>(_: &TypeRegistry, content: &[u8]) -> Result<Decoded, CodecError> {
    let message = M::decode(content)?;
    Ok(Decoded {
        summary: message.describe(),
        content: message.encode()?,
    })
}

fn decode_bind(registry: &TypeRegistry, content: &[u8]) -> Result<Decoded, CodecError> {
    let bind = BindMessage::decode(content)?;
    let summary = bind.describe_with(|child| registry.describe(&child.type_name.text(), &child.body));
    Ok(Decoded {
        summary,
        content: bind.encode()?,
    })
}

/// Maps type names to their decoders.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    handlers: HashMap<String, DecodeFn>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("TypeRegistry").field("types", &types).finish()
    }
}

impl TypeRegistry {
    /// An empty registry: every type is relayed raw.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in message codec.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_body::<TransformMessage>();
        registry.register_body::<PositionMessage>();
        registry.register_body::<ImageMessage>();
        registry.register_body::<StatusMessage>();
        registry.register_body::<PointMessage>();
        registry.register_body::<TrajectoryMessage>();
        registry.register_body::<StringMessage>();
        registry.register_body::<CapabilityMessage>();
        registry.register_body::<TrackingMessage>();
        registry.register_body::<QuaternionTrackingMessage>();
        registry.register(TYPE_BIND, decode_bind);
        registry
    }

    pub fn register(&mut self, type_name: &str, handler: DecodeFn) {
        self.handlers.insert(type_name.to_string(), handler);
    }

    pub fn register_body<M: MessageBody>(&mut self) {
        self.register(M::TYPE_NAME, decode_body::<M>);
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    /// Decode content of a registered type; `None` for unregistered types.
    pub fn decode(&self, type_name: &str, content: &[u8]) -> Option<Result<Decoded, CodecError>> {
        self.handlers
            .get(type_name)
            .map(|handler| handler(self, content))
    }

    /// Summary only, for nested content such as bind children.
    pub fn describe(&self, type_name: &str, content: &[u8]) -> Option<String> {
        match self.decode(type_name, content)? {
            Ok(decoded) => Some(decoded.summary),
            Err(e) => Some(format!("undecodable ({})", e)),
        }
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// How a forwarded message was relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Decoded and re-encoded.
    Decoded,
    /// Streamed byte-for-byte.
    Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The message reached the destination. `fields` is the log summary.
    Forwarded { fields: String, route: Route },
    /// The message was blocked; `size` body bytes were drained.
    Dropped { size: u64 },
    /// The codec rejected the body; it was forwarded raw instead.
    DecodeFailed { fields: String, reason: CodecError },
    /// The source closed part-way through the body.
    ConnectionClosed,
}

impl DispatchOutcome {
    /// Type-specific log fields for this outcome.
    pub fn log_fields(&self, header: &Header) -> String {
        match self {
            DispatchOutcome::Forwarded { fields, .. } => fields.clone(),
            DispatchOutcome::Dropped { size } => {
                format!("Blocked type={} size={}", header.device_type(), size)
            }
            DispatchOutcome::DecodeFailed { fields, .. } => fields.clone(),
            DispatchOutcome::ConnectionClosed => "ConnectionClosed".to_string(),
        }
    }
}

/// Per-message classification and forwarding. Shared by both directions.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    registry: Arc<TypeRegistry>,
    filter: Arc<BlacklistFilter>,
    max_decode_body_size: u64,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<TypeRegistry>, filter: Arc<BlacklistFilter>) -> Self {
        Self {
            registry,
            filter,
            max_decode_body_size: DEFAULT_MAX_DECODE_BODY_SIZE,
        }
    }

    /// Bodies above `limit` bytes are relayed raw even for registered types.
    pub fn with_max_decode_body_size(mut self, limit: u64) -> Self {
        self.max_decode_body_size = limit;
        self
    }

    pub fn filter(&self) -> &BlacklistFilter {
        &self.filter
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Consume the body that follows `header` and act on it.
    ///
    /// Exactly `header.body_size()` bytes are read from `source` whatever the
    /// outcome, unless the source closes first. Errors are the direction-fatal
    /// cases: destination failures and unexpected I/O errors.
    pub async fn dispatch<R, W>(
        &self,
        header: &Header,
        source: &mut FrameReader<R>,
        dest: &mut W,
    ) -> Result<DispatchOutcome, RelayError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = if self.filter.should_drop(header) {
            source
                .drain(header.body_size())
                .await
                .map(|size| DispatchOutcome::Dropped { size })
        } else if self.registry.is_registered(header.device_type()) {
            if header.body_size() > self.max_decode_body_size {
                warn!(
                    "{} body of {} bytes exceeds decode limit {}, relaying raw",
                    header.device_type(),
                    header.body_size(),
                    self.max_decode_body_size
                );
                self.forward_raw(header, source, dest).await
            } else {
                self.decode_and_forward(header, source, dest).await
            }
        } else {
            self.forward_raw(header, source, dest).await
        };

        match result {
            Err(RelayError::ConnectionClosed) => Ok(DispatchOutcome::ConnectionClosed),
            other => other,
        }
    }

    async fn decode_and_forward<R, W>(
        &self,
        header: &Header,
        source: &mut FrameReader<R>,
        dest: &mut W,
    ) -> Result<DispatchOutcome, RelayError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let body = source.read_body(header.body_size()).await?;

        match self.reencode(header, &body) {
            Ok((rebuilt, rebuilt_body, summary)) => {
                write_frame(dest, &rebuilt, &rebuilt_body).await?;
                Ok(DispatchOutcome::Forwarded {
                    fields: summary,
                    route: Route::Decoded,
                })
            }
            Err(reason) => {
                warn!(
                    "Failed to decode {} from {}: {}; forwarding raw",
                    header.device_type(),
                    header.device_name(),
                    reason
                );
                write_frame(dest, header, &body).await?;
                Ok(DispatchOutcome::DecodeFailed {
                    fields: format!(
                        "DecodeFailed reason={}; forwarded raw size={}",
                        reason,
                        body.len()
                    ),
                    reason,
                })
            }
        }
    }

    /// Decode a complete body and build the header and body to forward.
    pub fn reencode(&self, header: &Header, body: &[u8]) -> Result<(Header, Vec<u8>, String), CodecError> {
        header.verify_body(body)?;
        let layout = BodyLayout::split(header.version(), body)?;
        let decoded = self
            .registry
            .decode(header.device_type(), layout.content)
            .ok_or_else(|| {
                CodecError::Malformed(format!("no codec for {}", header.device_type()))
            })??;

        let rebuilt_body = layout.assemble(&decoded.content);
        let rebuilt = header.for_body(&rebuilt_body);
        Ok((rebuilt, rebuilt_body, decoded.summary))
    }

    async fn forward_raw<R, W>(
        &self,
        header: &Header,
        source: &mut FrameReader<R>,
        dest: &mut W,
    ) -> Result<DispatchOutcome, RelayError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        debug!(
            "Relaying {} ({} bytes) without decoding",
            header.device_type(),
            header.body_size()
        );
        dest.write_all(header.as_bytes())
            .await
            .map_err(RelayError::DestinationClosed)?;
        let first_chunk = source.forward_body(header.body_size(), dest).await?;
        dest.flush().await.map_err(RelayError::DestinationClosed)?;

        Ok(DispatchOutcome::Forwarded {
            fields: format!(
                "Raw size={} hex={}",
                header.body_size(),
                hex::encode(&first_chunk)
            ),
            route: Route::Raw,
        })
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(
    dest: &mut W,
    header: &Header,
    body: &[u8],
) -> Result<(), RelayError> {
    dest.write_all(header.as_bytes())
        .await
        .map_err(RelayError::DestinationClosed)?;
    dest.write_all(body)
        .await
        .map_err(RelayError::DestinationClosed)?;
    dest.flush().await.map_err(RelayError::DestinationClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Timestamp;

    fn dispatcher(blocked: &[&str]) -> MessageDispatcher {
        MessageDispatcher::new(
            Arc::new(TypeRegistry::with_defaults()),
            Arc::new(BlacklistFilter::new(blocked.iter().copied())),
        )
    }

    fn frame(device_type: &str, body: &[u8]) -> (Header, Vec<u8>) {
        let header = Header::new(1, device_type, "dev", Timestamp::from_raw(99), body).unwrap();
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(body);
        (header, bytes)
    }

    #[test]
    fn test_default_registry_types() {
        let registry = TypeRegistry::with_defaults();
        assert_eq!(
            registry.types(),
            vec![
                "BIND", "CAPABILITY", "IMAGE", "POINT", "POSITION", "QTDATA", "STATUS", "STRING",
                "TDATA", "TRAJ", "TRANSFORM"
            ]
        );
        assert!(!registry.is_registered("SENSOR"));
    }

    #[test]
    fn test_registering_future_type() {
        fn decode_echo(_: &TypeRegistry, content: &[u8]) -> Result<Decoded, CodecError> {
            Ok(Decoded {
                summary: format!("Echo={}", content.len()),
                content: content.to_vec(),
            })
        }

        let mut registry = TypeRegistry::new();
        registry.register("ECHO", decode_echo);
        let decoded = registry.decode("ECHO", b"abc").unwrap().unwrap();
        assert_eq!(decoded.summary, "Echo=3");
    }

    #[test]
    fn test_bind_children_described_through_registry() {
        let child = StringMessage::new("hi").encode().unwrap();
        let bind = BindMessage {
            children: vec![
                BindChild {
                    type_name: "STRING".into(),
                    device_name: "Note".into(),
                    body: child,
                },
                BindChild {
                    type_name: "SENSOR".into(),
                    device_name: "Force".into(),
                    body: vec![1, 2, 3],
                },
            ],
        };
        let content = bind.encode().unwrap();

        let decoded = TypeRegistry::with_defaults().decode("BIND", &content).unwrap().unwrap();
        assert_eq!(
            decoded.summary,
            "Children=2 [STRING Note: Encoding=3, String=hi; SENSOR Force (3 bytes)]"
        );
        assert_eq!(decoded.content, content);
    }

    #[tokio::test]
    async fn test_status_is_reencoded() {
        let body = StatusMessage::new(1, 0, "OK", "Ready").encode().unwrap();
        let (header, bytes) = frame("STATUS", &body);

        let mut source = FrameReader::new(&bytes[..]);
        let parsed = source.read_header().await.unwrap();
        let mut out = Vec::new();
        let outcome = dispatcher(&[]).dispatch(&parsed, &mut source, &mut out).await.unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Forwarded {
                fields: "Code=1, SubCode=0, ErrorName=OK, Status=Ready".to_string(),
                route: Route::Decoded,
            }
        );
        assert_eq!(&out[..58], header.as_bytes());
        assert_eq!(&out[58..], &body[..]);
    }

    #[tokio::test]
    async fn test_crc_failure_forwards_raw() {
        let body = StatusMessage::new(1, 0, "OK", "Ready").encode().unwrap();
        let (_, mut bytes) = frame("STATUS", &body);
        let last = bytes.len() - 2;
        bytes[last] ^= 0xFF;

        let mut source = FrameReader::new(&bytes[..]);
        let parsed = source.read_header().await.unwrap();
        let mut out = Vec::new();
        let outcome = dispatcher(&[]).dispatch(&parsed, &mut source, &mut out).await.unwrap();

        assert!(matches!(
            outcome,
            DispatchOutcome::DecodeFailed { reason: CodecError::CrcMismatch { .. }, .. }
        ));
        assert_eq!(out, bytes);
    }

    #[tokio::test]
    async fn test_malformed_bind_forwards_raw_and_continues() {
        let bind = BindMessage {
            children: vec![BindChild {
                type_name: "STRING".into(),
                device_name: "Note".into(),
                body: StringMessage::new("hi").encode().unwrap(),
            }],
        };
        let mut body = bind.encode().unwrap();
        body[14..22].copy_from_slice(&u64::MAX.to_be_bytes());
        let (_, mut bytes) = frame("BIND", &body);
        let (_, status) = frame("STATUS", &StatusMessage::new(1, 0, "OK", "Ready").encode().unwrap());
        bytes.extend_from_slice(&status);

        let dispatcher = dispatcher(&[]);
        let mut source = FrameReader::new(&bytes[..]);
        let mut out = Vec::new();

        let parsed = source.read_header().await.unwrap();
        let outcome = dispatcher.dispatch(&parsed, &mut source, &mut out).await.unwrap();
        assert!(matches!(
            outcome,
            DispatchOutcome::DecodeFailed { reason: CodecError::Malformed(_), .. }
        ));

        let parsed = source.read_header().await.unwrap();
        let outcome = dispatcher.dispatch(&parsed, &mut source, &mut out).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Forwarded { route: Route::Decoded, .. }));
        assert_eq!(out, bytes);
    }

    #[tokio::test]
    async fn test_non_utf8_text_is_reencoded_unchanged() {
        let mut status = StatusMessage::new(1, 0, "OK", "").encode().unwrap();
        status.truncate(30);
        status.extend_from_slice(b"Caf\xe9\0");

        let point = PointMessage {
            elements: vec![PointElement {
                name: CharField::from_bytes(&b"M\xfcller"[..]),
                group: "Fiducials".into(),
                rgba: [255, 0, 0, 255],
                position: [1.0, 2.0, 3.0],
                radius: 1.5,
                owner: CharField::default(),
            }],
        }
        .encode()
        .unwrap();

        for (device_type, body) in [("STATUS", status), ("POINT", point)] {
            let (_, bytes) = frame(device_type, &body);
            let mut source = FrameReader::new(&bytes[..]);
            let parsed = source.read_header().await.unwrap();
            let mut out = Vec::new();
            let outcome = dispatcher(&[]).dispatch(&parsed, &mut source, &mut out).await.unwrap();

            assert!(matches!(outcome, DispatchOutcome::Forwarded { route: Route::Decoded, .. }));
            assert_eq!(out, bytes, "{} was altered", device_type);
        }
    }

    #[tokio::test]
    async fn test_blocked_message_drained() {
        let (_, bytes) = frame("IMAGE", &vec![0u8; 4096]);

        let mut source = FrameReader::new(&bytes[..]);
        let parsed = source.read_header().await.unwrap();
        let mut out = Vec::new();
        let outcome = dispatcher(&["IMAGE"]).dispatch(&parsed, &mut source, &mut out).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Dropped { size: 4096 });
        assert_eq!(outcome.log_fields(&parsed), "Blocked type=IMAGE size=4096");
        assert!(out.is_empty());
        assert_eq!(source.bytes_read(), bytes.len() as u64);
    }

    #[tokio::test]
    async fn test_unknown_type_is_byte_identical() {
        let body: Vec<u8> = (0..1000u32).map(|i| (i * 7) as u8).collect();
        let (_, bytes) = frame("SENSOR", &body);

        let mut source = FrameReader::new(&bytes[..]);
        let parsed = source.read_header().await.unwrap();
        let mut out = Vec::new();
        let outcome = dispatcher(&[]).dispatch(&parsed, &mut source, &mut out).await.unwrap();

        assert_eq!(out, bytes);
        match outcome {
            DispatchOutcome::Forwarded { fields, route } => {
                assert_eq!(route, Route::Raw);
                assert_eq!(
                    fields,
                    format!("Raw size=1000 hex={}", hex::encode(&body[..DRAIN_CHUNK_SIZE]))
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_known_type_streams_raw() {
        let body = TransformMessage::identity().encode().unwrap();
        let (_, bytes) = frame("TRANSFORM", &body);

        let mut source = FrameReader::new(&bytes[..]);
        let parsed = source.read_header().await.unwrap();
        let mut out = Vec::new();
        let outcome = dispatcher(&[])
            .with_max_decode_body_size(16)
            .dispatch(&parsed, &mut source, &mut out)
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Forwarded { route: Route::Raw, .. }));
        assert_eq!(out, bytes);
    }

    #[tokio::test]
    async fn test_truncated_body_reports_close() {
        let (_, mut bytes) = frame("STRING", &StringMessage::new("truncated").encode().unwrap());
        bytes.truncate(bytes.len() - 3);

        let mut source = FrameReader::new(&bytes[..]);
        let parsed = source.read_header().await.unwrap();
        let mut out = Vec::new();
        let outcome = dispatcher(&[]).dispatch(&parsed, &mut source, &mut out).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::ConnectionClosed);
        assert!(out.is_empty());
    }
}
