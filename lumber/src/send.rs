use std::time::Duration;

use clap::Args;
use lumber_core::Event;
use lumber_push_client::{HttpPushClient, PushClientOptions};
use rand::Rng;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{PushClientSnafu, Result};

/// Push generated batches of events to a bulk endpoint.
#[derive(Debug, Args)]
pub struct SendArgs {
    /// Bulk endpoint URL.
    #[arg(long, default_value = "http://127.0.0.1:5044/")]
    url: String,
    /// Events per batch.
    #[arg(long, default_value = "2048")]
    batch_size: usize,
    /// Number of batches to push; unlimited when omitted.
    #[arg(long)]
    count: Option<u64>,
    /// Read timeout in milliseconds.
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,
}

impl SendArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let mut client = HttpPushClient::with_options(
            &self.url,
            PushClientOptions {
                timeout: Duration::from_millis(self.timeout_ms),
            },
        )
        .context(PushClientSnafu)?;

        let events: Vec<Event> = (0..self.batch_size).map(|_| make_event()).collect();
        info!(url = %self.url, batch_size = self.batch_size, "pushing batches");

        let mut batches = 0u64;
        let mut acked_events = 0u64;
        loop {
            if let Some(count) = self.count {
                if batches >= count {
                    break;
                }
            }

            let acked = tokio::select! {
                result = client.push(&events) => result.context(PushClientSnafu)?,
                _ = ct.cancelled() => break,
            };

            batches += 1;
            acked_events += acked as u64;
            debug!(batch = batches, events = acked, "batch acknowledged");
        }

        info!(batches, events = acked_events, "done");
        Ok(())
    }
}

const LOREM: &[&str] = &[
    "Lorem ipsum dolor sit amet, consetetur sadipscing elitr,",
    "sed diam nonumy eirmod tempor invidunt ut labore et dolore magna aliquyam erat,",
    "sed diam voluptua. At vero eos et accusam et justo duo dolores et ea rebum. Stet",
    "clita kasd gubergren, no sea takimata sanctus est Lorem ipsum dolor sit amet.",
];

fn make_event() -> Event {
    let line = LOREM[rand::rng().random_range(0..LOREM.len())];
    serde_json::json!({
        "@timestamp": chrono::Utc::now().to_rfc3339(),
        "type": "filebeat",
        "message": line,
        "offset": 1000,
    })
}
