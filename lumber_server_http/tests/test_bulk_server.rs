use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use lumber_core::{BatchReceiver, batch_channel};
use lumber_protocol::{AckFrame, JsonFrameReader, PROTOCOL_VERSION, encode_batch};
use lumber_server_http::{BulkServer, BulkServerOptions, CONTENT_TYPE_LUMBERJACK, VERSION_HEADER};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_events() -> Vec<Value> {
    vec![
        json!({"message": "first", "offset": 1}),
        json!({"message": "second", "offset": 2}),
        json!({"message": "third", "offset": 3}),
    ]
}

async fn encoded_body(events: &[Value]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_batch(&mut buf, events).await.expect("encode");
    buf
}

fn bulk_request(version: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/");
    if let Some(version) = version {
        builder = builder.header(VERSION_HEADER, version);
    }
    builder.body(Body::from(body)).expect("request")
}

/// Acknowledge batches as they arrive, handing the received events
/// back for assertions.
fn spawn_consumer(mut rx: BatchReceiver, delay: Duration) -> tokio::sync::mpsc::UnboundedReceiver<Vec<Value>> {
    let (tx, received) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            tokio::time::sleep(delay).await;
            let _ = tx.send(batch.events().to_vec());
            batch.ack();
        }
    });
    received
}

async fn read_ack_frames(body: axum::body::Body) -> Vec<AckFrame> {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.expect("body");
    let mut reader = JsonFrameReader::new(bytes.as_ref());
    let mut frames = Vec::new();
    while let Some(frame) = reader.read_frame::<AckFrame>().await.expect("frame") {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_missing_version_is_rejected() {
    let (tx, mut rx) = batch_channel(4);
    let router = BulkServer::with_channel(BulkServerOptions::default(), tx).into_router();

    let body = encoded_body(&test_events()).await;
    let response = router
        .oneshot(bulk_request(None, body))
        .await
        .expect("response");

    assert_eq!(StatusCode::BAD_REQUEST, response.status());
    // No side effects: nothing was enqueued.
    assert!(rx.try_recv().is_none());
}

#[tokio::test]
async fn test_unknown_version_is_rejected() {
    let (tx, mut rx) = batch_channel(4);
    let router = BulkServer::with_channel(BulkServerOptions::default(), tx).into_router();

    let body = encoded_body(&test_events()).await;
    let response = router
        .oneshot(bulk_request(Some("9.9"), body))
        .await
        .expect("response");

    assert_eq!(StatusCode::BAD_REQUEST, response.status());
    assert!(rx.try_recv().is_none());
}

#[tokio::test]
async fn test_head_is_liveness_probe() {
    let (tx, _rx) = batch_channel(4);
    let router = BulkServer::with_channel(BulkServerOptions::default(), tx).into_router();

    let request = Request::builder()
        .method("HEAD")
        .uri("/")
        .body(Body::empty())
        .expect("request");
    let response = router.oneshot(request).await.expect("response");

    assert_eq!(StatusCode::OK, response.status());
}

#[tokio::test]
async fn test_malformed_body_is_service_unavailable() {
    let (tx, mut rx) = batch_channel(4);
    let router = BulkServer::with_channel(BulkServerOptions::default(), tx).into_router();

    let response = router
        .oneshot(bulk_request(
            Some(PROTOCOL_VERSION),
            b"not a frame\n".to_vec(),
        ))
        .await
        .expect("response");

    assert_eq!(StatusCode::SERVICE_UNAVAILABLE, response.status());
    assert!(rx.try_recv().is_none());

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert!(!bytes.is_empty());
}

#[tokio::test]
async fn test_batch_round_trip() {
    let (tx, rx) = batch_channel(4);
    let router = BulkServer::with_channel(BulkServerOptions::default(), tx).into_router();
    let mut received = spawn_consumer(rx, Duration::ZERO);

    let events = test_events();
    let body = encoded_body(&events).await;
    let response = router
        .oneshot(bulk_request(Some(PROTOCOL_VERSION), body))
        .await
        .expect("response");

    assert_eq!(StatusCode::OK, response.status());
    assert_eq!(
        CONTENT_TYPE_LUMBERJACK,
        response.headers()[header::CONTENT_TYPE]
    );
    assert_eq!(PROTOCOL_VERSION, response.headers()[VERSION_HEADER]);

    // Decoding reconstructs the events with identical content and order.
    let processed = received.recv().await.expect("consumer");
    assert_eq!(events, processed);

    let frames = read_ack_frames(response.into_body()).await;
    assert_eq!(Some(&AckFrame { ack: 3 }), frames.last());
}

#[tokio::test]
async fn test_keepalive_frames_before_final_ack() {
    let options = BulkServerOptions {
        keepalive: Duration::from_millis(100),
        ..Default::default()
    };
    let (tx, rx) = batch_channel(4);
    let router = BulkServer::with_channel(options, tx).into_router();

    // Consumer completion artificially delayed past three keepalive
    // intervals.
    let _received = spawn_consumer(rx, Duration::from_millis(350));

    let events = test_events();
    let body = encoded_body(&events).await;
    let response = router
        .oneshot(bulk_request(Some(PROTOCOL_VERSION), body))
        .await
        .expect("response");
    assert_eq!(StatusCode::OK, response.status());

    let frames = read_ack_frames(response.into_body()).await;
    let keepalives = frames.iter().filter(|frame| frame.ack == 0).count();
    assert!(
        keepalives >= 2,
        "expected at least 2 keepalive frames, saw {keepalives}"
    );
    assert_eq!(Some(&AckFrame { ack: 3 }), frames.last());
}

#[tokio::test]
async fn test_keepalive_disabled_sends_single_ack() {
    let options = BulkServerOptions {
        keepalive: Duration::ZERO,
        ..Default::default()
    };
    let (tx, rx) = batch_channel(4);
    let router = BulkServer::with_channel(options, tx).into_router();
    let _received = spawn_consumer(rx, Duration::from_millis(50));

    let events = test_events();
    let body = encoded_body(&events).await;
    let response = router
        .oneshot(bulk_request(Some(PROTOCOL_VERSION), body))
        .await
        .expect("response");

    let frames = read_ack_frames(response.into_body()).await;
    assert_eq!(vec![AckFrame { ack: 3 }], frames);
}
