//! HTTP server for the custom bulk protocol.
//!
//! Each `POST` request carries exactly one batch, framed by the codec
//! selected through the `X-Lumberjack-Version` header. The handler
//! decodes the batch, enqueues it onto the ingestion channel and only
//! acknowledges the producer once the application consumer has closed
//! the batch's gate, optionally emitting keepalive frames while the
//! consumer works.

pub mod body;
pub mod connection;
pub mod error;
pub mod handler;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::post;
use lumber_core::{BatchReceiver, BatchSender, DEFAULT_CHANNEL_CAPACITY, batch_channel};
use lumber_protocol::{CodecFactory, PROTOCOL_VERSION, json_frame_codec};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use connection::HttpConnection;
pub use error::{BulkServerError, Result};
pub use handler::{CONTENT_TYPE_LUMBERJACK, ChunkedAckWriter, VERSION_HEADER};

use crate::error::{BindSnafu, ServeSnafu};
use crate::handler::{bulk_handler, ping_handler};

/// Bulk server options.
#[derive(Debug, Clone)]
pub struct BulkServerOptions {
    /// Bound on reading one batch from a request body; zero disables it.
    pub timeout: Duration,
    /// Interval between keepalive frames; zero disables keepalive.
    pub keepalive: Duration,
}

impl Default for BulkServerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(3),
        }
    }
}

/// HTTP server receiving batches over the custom bulk protocol.
pub struct BulkServer {
    options: BulkServerOptions,
    channel: BatchSender,
    versions: HashMap<&'static str, CodecFactory>,
}

#[derive(Clone)]
pub(crate) struct BulkState {
    pub(crate) options: BulkServerOptions,
    pub(crate) channel: BatchSender,
    pub(crate) versions: Arc<HashMap<&'static str, CodecFactory>>,
}

impl BulkServer {
    /// Create a server owning its own ingestion channel.
    ///
    /// The returned receiver is the consumer side of the channel.
    pub fn new(options: BulkServerOptions) -> (Self, BatchReceiver) {
        let (tx, rx) = batch_channel(DEFAULT_CHANNEL_CAPACITY);
        (Self::with_channel(options, tx), rx)
    }

    /// Create a server sharing an externally constructed channel, so a
    /// single consumer can drain several listeners.
    pub fn with_channel(options: BulkServerOptions, channel: BatchSender) -> Self {
        Self {
            options,
            channel,
            versions: default_versions(),
        }
    }

    /// Register an additional codec for a protocol version.
    pub fn with_codec(mut self, version: &'static str, codec: CodecFactory) -> Self {
        self.versions.insert(version, codec);
        self
    }

    pub fn into_router(self) -> Router {
        let state = BulkState {
            options: self.options,
            channel: self.channel,
            versions: Arc::new(self.versions),
        };

        Router::new()
            .route("/", post(bulk_handler).head(ping_handler))
            .with_state(state)
    }

    /// Bind and serve until the token is cancelled.
    pub async fn serve(self, addr: SocketAddr, ct: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context(BindSnafu { address: addr })?;
        info!(%addr, "bulk server listening");

        axum::serve(
            listener,
            self.into_router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(ct.cancelled_owned())
        .await
        .context(ServeSnafu)
    }
}

fn default_versions() -> HashMap<&'static str, CodecFactory> {
    HashMap::from([(PROTOCOL_VERSION, json_frame_codec as CodecFactory)])
}
