//! Elasticsearch bulk compatibility server.
//!
//! Accepts NDJSON bulk payloads (alternating action-metadata and
//! source lines), fragments them into size-bounded sub-batches and
//! streams a JSON array of per-item statuses as each sub-batch is
//! acknowledged by the application consumer. Gzip is supported on
//! both directions through content negotiation.

pub mod bulk;
pub mod error;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::post;
use lumber_core::{BatchReceiver, BatchSender, DEFAULT_CHANNEL_CAPACITY, batch_channel};
use snafu::{ResultExt, ensure};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::{EsServerError, Result};

use crate::bulk::{bulk_handler, ping_handler};
use crate::error::{BindSnafu, InvalidOptionsSnafu, ServeSnafu};

/// ES compatibility server options.
#[derive(Debug, Clone)]
pub struct EsServerOptions {
    /// Maximum number of events per sub-batch.
    pub split: usize,
    /// Suppress per-item status entries in the response.
    ///
    /// Sub-batches are still enqueued and awaited one by one, so
    /// backpressure is preserved.
    pub silent: bool,
    /// Bound on reading one line of the bulk payload; zero disables it.
    ///
    /// A stalled producer trips the bound, which ends decoding the
    /// same way a malformed line does: accepted events are flushed
    /// and the response is closed validly.
    pub timeout: Duration,
}

impl Default for EsServerOptions {
    fn default() -> Self {
        Self {
            split: 2048,
            silent: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP server receiving batches over the ES bulk protocol.
pub struct EsServer {
    state: EsState,
}

#[derive(Clone)]
pub(crate) struct EsState {
    pub(crate) split: usize,
    pub(crate) silent: bool,
    pub(crate) timeout: Duration,
    pub(crate) channel: BatchSender,
}

impl EsServer {
    /// Create a server owning its own ingestion channel.
    pub fn new(options: EsServerOptions) -> Result<(Self, BatchReceiver)> {
        let (tx, rx) = batch_channel(DEFAULT_CHANNEL_CAPACITY);
        Ok((Self::with_channel(options, tx)?, rx))
    }

    /// Create a server sharing an externally constructed channel.
    pub fn with_channel(options: EsServerOptions, channel: BatchSender) -> Result<Self> {
        ensure!(
            options.split > 0,
            InvalidOptionsSnafu {
                message: "split threshold must be at least 1",
            }
        );

        Ok(Self {
            state: EsState {
                split: options.split,
                silent: options.silent,
                timeout: options.timeout,
                channel,
            },
        })
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/", post(bulk_handler).head(ping_handler))
            .route("/_bulk", post(bulk_handler))
            .with_state(self.state)
    }

    /// Bind and serve until the token is cancelled.
    pub async fn serve(self, addr: SocketAddr, ct: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context(BindSnafu { address: addr })?;
        info!(%addr, "es bulk server listening");

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(ct.cancelled_owned())
            .await
            .context(ServeSnafu)
    }
}
