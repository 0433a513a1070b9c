use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;
use lumber_core::{BatchReceiver, batch_channel};
use lumber_server_es::{EsServer, EsServerOptions};
use lumber_server_http::{BulkServer, BulkServerOptions};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{BulkServerSnafu, EsServerSnafu, InvalidBindAddressSnafu, Result};

/// Run bulk servers and acknowledge every received batch.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address of the custom bulk protocol server.
    #[arg(long, default_value = "127.0.0.1:5044")]
    bind: String,
    /// Also serve the ES bulk compatibility endpoint on this address.
    #[arg(long)]
    es_bind: Option<String>,
    /// Keepalive interval in milliseconds; 0 disables keepalive.
    #[arg(long, default_value = "3000")]
    keepalive_ms: u64,
    /// Bound on reading one batch, in milliseconds; 0 disables it.
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,
    /// Batch split limit for ES bulk events.
    #[arg(long, default_value = "2048")]
    split: usize,
    /// Respond to ES bulk requests without per-item statuses.
    #[arg(long)]
    silent: bool,
    /// Capacity of the shared ingestion channel.
    #[arg(long, default_value = "256")]
    capacity: usize,
    /// Maximum batches acknowledged per second.
    #[arg(long)]
    rate: Option<u32>,
    /// Do not log received batches.
    #[arg(short, long)]
    quiet: bool,
}

impl ServeArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let bind = self
            .bind
            .parse::<SocketAddr>()
            .context(InvalidBindAddressSnafu)?;
        let es_bind = self
            .es_bind
            .as_deref()
            .map(str::parse::<SocketAddr>)
            .transpose()
            .context(InvalidBindAddressSnafu)?;

        // Both listeners drain into the same channel so one consumer
        // loop acknowledges everything.
        let (tx, rx) = batch_channel(self.capacity);

        let bulk = BulkServer::with_channel(
            BulkServerOptions {
                timeout: Duration::from_millis(self.timeout_ms),
                keepalive: Duration::from_millis(self.keepalive_ms),
            },
            tx.clone(),
        );

        let es = es_bind
            .map(|_| {
                EsServer::with_channel(
                    EsServerOptions {
                        split: self.split,
                        silent: self.silent,
                        timeout: Duration::from_millis(self.timeout_ms),
                    },
                    tx.clone(),
                )
            })
            .transpose()
            .context(EsServerSnafu)?;
        drop(tx);

        let rate = self.rate.filter(|rate| *rate > 0);
        let consumer_fut = consume(rx, rate, self.quiet, ct.clone());

        info!(%bind, "starting bulk server");
        match (es, es_bind) {
            (Some(es), Some(es_addr)) => {
                info!(%es_addr, "starting es bulk server");
                tokio::select! {
                    result = bulk.serve(bind, ct.clone()) => result.context(BulkServerSnafu),
                    result = es.serve(es_addr, ct.clone()) => result.context(EsServerSnafu),
                    _ = consumer_fut => Ok(()),
                }
            }
            _ => {
                tokio::select! {
                    result = bulk.serve(bind, ct.clone()) => result.context(BulkServerSnafu),
                    _ = consumer_fut => Ok(()),
                }
            }
        }
    }
}

/// Drain the shared channel, acknowledging batches as they arrive.
async fn consume(
    mut rx: BatchReceiver,
    rate: Option<u32>,
    quiet: bool,
    ct: CancellationToken,
) {
    let mut ticker = rate.map(|rate| {
        tokio::time::interval(Duration::from_secs(1) / rate)
    });

    loop {
        tokio::select! {
            _ = ct.cancelled() => break,
            batch = rx.recv() => {
                let Some(batch) = batch else {
                    break;
                };
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }
                if !quiet {
                    info!(events = batch.len(), "received batch");
                }
                batch.ack();
            }
        }
    }
}
