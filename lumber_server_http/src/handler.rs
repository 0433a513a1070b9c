use std::io;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use lumber_core::{AckGate, Batch};
use lumber_protocol::{AckWriter, BatchReader, Result as ProtocolResult};
use snafu::ResultExt;
use tracing::debug;

use crate::BulkState;
use crate::connection::HttpConnection;

/// Required version header of the custom bulk protocol.
pub const VERSION_HEADER: &str = "x-lumberjack-version";
/// Content type of batch payloads and acknowledgment streams.
pub const CONTENT_TYPE_LUMBERJACK: &str = "application/lumberjack";

/// Handler for `HEAD /`: liveness probe.
pub(crate) async fn ping_handler() -> StatusCode {
    StatusCode::OK
}

/// Handler for `POST /`: decode exactly one batch, enqueue it, and
/// acknowledge the producer once the consumer has processed it.
pub(crate) async fn bulk_handler(State(state): State<BulkState>, request: Request) -> Response {
    let Some(version) = request
        .headers()
        .get(VERSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let Some(codec) = state.versions.get(version.as_str()).copied() else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let (parts, request_body) = request.into_parts();
    let (conn, response_body) = HttpConnection::new(&parts, request_body);

    let (mut reader, writer) = match codec(Box::new(conn)) {
        Ok(halves) => halves,
        Err(err) => return service_unavailable(&err),
    };

    let batch = match read_batch(reader.as_mut(), state.options.timeout).await {
        Ok(batch) => batch,
        Err(err) => return service_unavailable(&err),
    };

    let events = batch.len();
    let gate = batch.gate();
    // Backpressure: blocks while the ingestion channel is full.
    if let Err(err) = state.channel.send(batch).await {
        return service_unavailable(&err);
    }

    let mut writer = writer;
    let has_keepalive = !state.options.keepalive.is_zero() && writer.supports_keepalive();
    if has_keepalive {
        writer = Box::new(ChunkedAckWriter::new(writer));
    }

    tokio::spawn(await_and_ack(
        gate,
        writer,
        events,
        has_keepalive.then_some(state.options.keepalive),
    ));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE.as_str(), CONTENT_TYPE_LUMBERJACK.to_string()),
            (VERSION_HEADER, version),
        ],
        response_body,
    )
        .into_response()
}

async fn read_batch(
    reader: &mut dyn BatchReader,
    timeout: Duration,
) -> ProtocolResult<Batch> {
    if timeout.is_zero() {
        return reader.read_batch().await;
    }

    match tokio::time::timeout(timeout, reader.read_batch()).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "batch read timed out"))
            .context(lumber_protocol::error::TransportSnafu),
    }
}

/// Wait for the consumer to close the gate, emitting keepalive frames
/// at the configured interval, then write the final acknowledgment
/// carrying the full event count of the batch.
async fn await_and_ack(
    gate: AckGate,
    mut writer: Box<dyn AckWriter>,
    events: usize,
    keepalive: Option<Duration>,
) {
    if let Some(interval) = keepalive {
        loop {
            tokio::select! {
                _ = gate.acked() => break,
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = writer.keepalive(0).await {
                        debug!(error = %err, "client went away while waiting for acknowledgment");
                        return;
                    }
                }
            }
        }
    } else {
        gate.acked().await;
    }

    if let Err(err) = writer.ack(events).await {
        debug!(error = %err, "failed to write final acknowledgment");
    }
}

fn service_unavailable(err: &dyn std::fmt::Display) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, "text/plain")],
        err.to_string(),
    )
        .into_response()
}

/// Decorator forcing a flush after every keepalive frame.
///
/// HTTP responses buffer output: without the flush the client would
/// only observe keepalive frames once the response completes, which
/// defeats their purpose.
pub struct ChunkedAckWriter {
    inner: Box<dyn AckWriter>,
}

impl ChunkedAckWriter {
    pub fn new(inner: Box<dyn AckWriter>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AckWriter for ChunkedAckWriter {
    async fn ack(&mut self, events: usize) -> ProtocolResult<()> {
        self.inner.ack(events).await?;
        self.inner.flush().await
    }

    async fn keepalive(&mut self, events: usize) -> ProtocolResult<()> {
        self.inner.keepalive(events).await?;
        self.inner.flush().await
    }

    async fn flush(&mut self) -> ProtocolResult<()> {
        self.inner.flush().await
    }

    fn supports_keepalive(&self) -> bool {
        self.inner.supports_keepalive()
    }
}
