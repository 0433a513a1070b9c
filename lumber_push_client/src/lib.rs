//! HTTP client for pushing batches to a lumber bulk server.
//!
//! One request carries one encoded batch; the call blocks until the
//! server's wire acknowledgment covers every event of the batch,
//! skipping over keepalive frames the server may emit while the
//! application consumer is still processing.

use std::io;
use std::time::Duration;

use futures::TryStreamExt;
use lumber_core::Event;
use lumber_protocol::{AckFrame, JsonFrameReader, PROTOCOL_VERSION, ProtocolError, encode_batch};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use snafu::{ResultExt, Snafu, ensure};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

const VERSION_HEADER: &str = "x-lumberjack-version";
const CONTENT_TYPE_LUMBERJACK: &str = "application/lumberjack";

/// Push client options.
#[derive(Debug, Clone)]
pub struct PushClientOptions {
    /// Bound on how long a single read of the acknowledgment stream
    /// may stall. Keepalive frames from the server reset it.
    pub timeout: Duration,
}

impl Default for PushClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// A client pushing batches to a bulk endpoint over HTTP.
///
/// A single client supports at most one outstanding request at a
/// time; concurrent pushes must be externally serialized.
#[derive(Debug)]
pub struct HttpPushClient {
    client: reqwest::Client,
    url: String,
    buffer: Vec<u8>,
    cancel: CancellationToken,
}

#[derive(Debug, Snafu)]
pub enum HttpPushClientError {
    #[snafu(display("Request error"))]
    Request { source: reqwest::Error },
    #[snafu(display("Response error: status={status}"))]
    Response { status: StatusCode },
    #[snafu(display("Protocol error"))]
    Protocol { source: ProtocolError },
    #[snafu(display("Acknowledgment stream ended early: {acked}/{expected} events acknowledged"))]
    Incomplete { acked: usize, expected: usize },
    #[snafu(display("Request cancelled"))]
    Cancelled,
}

pub type Result<T, E = HttpPushClientError> = std::result::Result<T, E>;

impl HttpPushClient {
    /// Create a new push client for the given endpoint URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            buffer: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a push client with explicit options.
    pub fn with_options(url: impl Into<String>, options: PushClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .read_timeout(options.timeout)
            .build()
            .context(RequestSnafu)?;

        Ok(Self {
            client,
            url: url.into(),
            buffer: Vec::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Push one batch and block for the wire acknowledgment.
    ///
    /// Returns the acknowledged event count. Any non-200 response
    /// status is a failure.
    pub async fn push(&mut self, events: &[Event]) -> Result<usize> {
        self.buffer.clear();
        encode_batch(&mut self.buffer, events)
            .await
            .context(ProtocolSnafu)?;

        let request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, CONTENT_TYPE_LUMBERJACK)
            .header(ACCEPT, CONTENT_TYPE_LUMBERJACK)
            .header(VERSION_HEADER, PROTOCOL_VERSION)
            .body(self.buffer.clone());

        let response = tokio::select! {
            response = request.send() => response.context(RequestSnafu)?,
            _ = self.cancel.cancelled() => return CancelledSnafu {}.fail(),
        };

        let status = response.status();
        ensure!(status == StatusCode::OK, ResponseSnafu { status });

        self.await_acks(response, events.len()).await
    }

    /// Read acknowledgment frames until the batch is covered.
    async fn await_acks(&self, response: reqwest::Response, expected: usize) -> Result<usize> {
        let stream = response.bytes_stream().map_err(io::Error::other);
        let mut reader = JsonFrameReader::new(StreamReader::new(stream));

        let mut acked = 0;
        loop {
            let frame = tokio::select! {
                frame = reader.read_frame::<AckFrame>() => frame.context(ProtocolSnafu)?,
                _ = self.cancel.cancelled() => return CancelledSnafu {}.fail(),
            };

            match frame {
                // End of the response body is a normal terminal condition.
                None => break,
                Some(AckFrame { ack }) => {
                    acked = ack;
                    if acked >= expected {
                        break;
                    }
                }
            }
        }

        ensure!(acked >= expected, IncompleteSnafu { acked, expected });
        Ok(acked)
    }

    /// Cancel the in-flight request, if any.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}
