//! Tests for a single relay direction

use std::sync::Arc;
use std::time::Duration;

use bytes::BufMut;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use igtl_relay::protocol::messages::{MessageBody, StatusMessage, TransformMessage};
use igtl_relay::protocol::{Header, Timestamp};
use igtl_relay::{
    BlacklistFilter, LogSink, MemoryLog, MessageDispatcher, RelayError, RelaySession,
    SessionState, TypeRegistry,
};

fn frame(version: u16, device_type: &str, device_name: &str, body: &[u8]) -> Vec<u8> {
    let header = Header::new(
        version,
        device_type,
        device_name,
        Timestamp::from_nanos(1_700_000_000, 250_000_000),
        body,
    )
    .unwrap();
    let mut bytes = header.as_bytes().to_vec();
    bytes.extend_from_slice(body);
    bytes
}

fn status_body() -> Vec<u8> {
    StatusMessage::new(1, 0, "OK", "Ready").encode().unwrap()
}

struct Harness {
    client: DuplexStream,
    server: DuplexStream,
    session: RelaySession<DuplexStream, DuplexStream>,
    log: MemoryLog,
}

fn harness(blocked: &[&str]) -> Harness {
    let (client, source) = duplex(16 * 1024);
    let (destination, server) = duplex(16 * 1024);
    let (sink, log) = LogSink::memory();
    let dispatcher = MessageDispatcher::new(
        Arc::new(TypeRegistry::with_defaults()),
        Arc::new(BlacklistFilter::new(blocked.iter().copied())),
    );
    let mut session = RelaySession::new("upstream", source, destination, dispatcher, Arc::new(sink));
    session.start().unwrap();

    Harness {
        client,
        server,
        session,
        log,
    }
}

/// Send `input`, close the source and collect everything the destination saw.
async fn relay_all(harness: &mut Harness, input: &[u8]) -> Vec<u8> {
    let Harness { client, server, .. } = harness;
    let writer = async {
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();
    };
    let reader = async {
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        received
    };
    let (_, received) = timeout(Duration::from_secs(5), async { tokio::join!(writer, reader) })
        .await
        .expect("relay did not finish");
    received
}

#[tokio::test]
async fn test_blocked_image_is_drained_exactly() {
    let mut h = harness(&["IMAGE"]);

    let status = frame(1, "STATUS", "Robot", &status_body());
    let mut input = frame(1, "IMAGE", "Camera", &vec![0xAB; 65536]);
    input.extend_from_slice(&status);

    let received = relay_all(&mut h, &input).await;

    // nothing of the image reaches the destination, and the next header is
    // read exactly after its body
    assert_eq!(received, status);

    let lines = h.log.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("[upstream] "));
    assert!(lines[0].ends_with(" 1700000000.250000000 Camera IMAGE Blocked type=IMAGE size=65536"));
    assert!(lines[1].ends_with(" Robot STATUS Code=1, SubCode=0, ErrorName=OK, Status=Ready"));

    let stats = h.session.join().await.unwrap();
    assert_eq!(stats.messages_blocked, 1);
    assert_eq!(stats.messages_decoded, 1);
    assert_eq!(stats.bytes_in, input.len() as u64);
    assert_eq!(stats.bytes_out, status.len() as u64);
}

#[tokio::test]
async fn test_blacklist_is_case_sensitive() {
    let mut h = harness(&["image"]);

    let input = frame(1, "IMAGE", "Camera", &[0u8; 10]);
    let received = relay_all(&mut h, &input).await;

    // the IMAGE body is not a valid image, so it goes through raw
    assert_eq!(received, input);
    assert!(h.log.lines()[0].contains("DecodeFailed reason="));
}

#[tokio::test]
async fn test_unknown_type_is_transparent() {
    let mut h = harness(&[]);

    let body: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    let input = frame(1, "SENSOR", "Force", &body);
    let received = relay_all(&mut h, &input).await;

    assert_eq!(received, input);
    let lines = h.log.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with(&format!(
        " Force SENSOR Raw size=3000 hex={}",
        hex::encode(&body[..256])
    )));
}

#[tokio::test]
async fn test_crc_failure_is_forwarded_raw() {
    let mut h = harness(&[]);

    let mut input = frame(1, "STATUS", "Robot", &status_body());
    let last = input.len() - 1;
    input[last - 2] ^= 0x55;
    let mut next = frame(1, "TRANSFORM", "Tool", &TransformMessage::identity().encode().unwrap());
    input.append(&mut next);

    let received = relay_all(&mut h, &input).await;

    assert_eq!(received, input);
    let lines = h.log.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(" Robot STATUS DecodeFailed reason=CRC mismatch"));
    assert!(lines[0].ends_with(&format!("; forwarded raw size={}", status_body().len())));
    assert!(lines[1].contains(" Tool TRANSFORM Matrix=[[1, 0, 0, 0]"));

    let stats = h.session.join().await.unwrap();
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.messages_forwarded, 2);
}

#[tokio::test]
async fn test_version_two_metadata_survives() {
    let mut h = harness(&[]);

    let content = status_body();
    let mut body = Vec::new();
    body.put_u16(12);
    body.put_u16(10);
    body.put_u32(4);
    body.put_u32(77);
    body.extend_from_slice(&content);
    body.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0, 0, 4]);
    body.extend_from_slice(b"meta");

    let input = frame(2, "STATUS", "Robot", &body);
    let received = relay_all(&mut h, &input).await;

    assert_eq!(received, input);
    assert!(h.log.lines()[0].ends_with("Status=Ready"));
}

#[tokio::test]
async fn test_truncated_header_stops_direction() {
    let mut h = harness(&[]);

    let received = relay_all(&mut h, &[1u8; 20]).await;

    assert!(received.is_empty());
    assert!(h.log.lines().is_empty());
    timeout(Duration::from_secs(5), h.session.wait_stopped())
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let mut h = harness(&[]);

    assert!(h.session.is_running());
    assert!(matches!(h.session.start(), Err(RelayError::AlreadyRunning)));

    relay_all(&mut h, &[]).await;
    timeout(Duration::from_secs(5), h.session.wait_stopped())
        .await
        .unwrap();
    assert!(matches!(h.session.start(), Err(RelayError::AlreadyStopped)));
}

#[tokio::test]
async fn test_stop_between_messages() {
    let mut h = harness(&[]);

    let input = frame(1, "STATUS", "Robot", &status_body());
    h.client.write_all(&input).await.unwrap();
    let mut received = vec![0u8; input.len()];
    h.server.read_exact(&mut received).await.unwrap();
    assert_eq!(received, input);

    h.session.stop();
    timeout(Duration::from_secs(5), h.session.wait_stopped())
        .await
        .expect("session ignored stop");

    // the destination is shut down once the worker exits
    let mut rest = Vec::new();
    h.server.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_destination_closed_ends_direction() {
    let Harness {
        mut client,
        server,
        mut session,
        ..
    } = harness(&[]);
    drop(server);

    let input = frame(1, "STATUS", "Robot", &status_body());
    client.write_all(&input).await.unwrap();

    timeout(Duration::from_secs(5), session.wait_stopped())
        .await
        .expect("session kept running with a closed destination");
    let stats = session.join().await.unwrap();
    assert_eq!(stats.messages_forwarded, 0);
}
