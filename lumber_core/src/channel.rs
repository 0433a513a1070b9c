use tokio::sync::mpsc;

use crate::batch::Batch;
use crate::error::{ChannelClosedSnafu, Result};

/// Capacity used by servers that construct their own channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Create a bounded FIFO of batch ownership transfers.
///
/// The capacity is fixed for the lifetime of the channel. Sending
/// blocks while the channel is full; this is the sole backpressure
/// mechanism of the transport: a slow consumer stalls every in-flight
/// handler, which stalls the wire acknowledgment, which stalls the
/// remote producer.
pub fn batch_channel(capacity: usize) -> (BatchSender, BatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (BatchSender { tx }, BatchReceiver { rx })
}

/// Producer half of the ingestion channel.
///
/// Cloned into every listener that shares the channel, so a single
/// application consumer can drain several servers.
#[derive(Debug, Clone)]
pub struct BatchSender {
    tx: mpsc::Sender<Batch>,
}

impl BatchSender {
    /// Enqueue a batch, blocking while the channel is full.
    ///
    /// The wait is intentionally unbounded; callers needing a bounded
    /// wait must apply an external timeout.
    pub async fn send(&self, batch: Batch) -> Result<()> {
        self.tx
            .send(batch)
            .await
            .or_else(|_| ChannelClosedSnafu {}.fail())
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half of the ingestion channel.
///
/// Batches come out in arrival order across all senders. The
/// consumer's only contractual obligation is to call [`Batch::ack`]
/// exactly once per batch after finishing processing.
#[derive(Debug)]
pub struct BatchReceiver {
    rx: mpsc::Receiver<Batch>,
}

impl BatchReceiver {
    /// Blocking pull; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Batch> {
        self.rx.recv().await
    }

    /// Non-blocking pull.
    pub fn try_recv(&mut self) -> Option<Batch> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    fn batch_of(n: usize) -> Batch {
        Batch::new((0..n).map(|i| json!({"n": i})).collect())
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = batch_channel(4);

        for n in 1..=3 {
            tx.send(batch_of(n)).await.expect("send");
        }

        for n in 1..=3 {
            let batch = rx.recv().await.expect("recv");
            assert_eq!(n, batch.len());
        }
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_full_channel_blocks_sender() {
        let capacity = 2;
        let (tx, mut rx) = batch_channel(capacity);

        for n in 0..capacity {
            tx.send(batch_of(n)).await.expect("send");
        }

        // The (C+1)th send stays pending until a pull frees a slot.
        let mut blocked = std::pin::pin!(tx.send(batch_of(capacity)));
        assert!(blocked.as_mut().now_or_never().is_none());

        rx.recv().await.expect("recv");
        blocked.await.expect("unblocked send");
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (tx, rx) = batch_channel(1);
        drop(rx);

        let err = tx.send(batch_of(1)).await.unwrap_err();
        assert!(matches!(err, crate::ChannelError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_shared_senders_drain_into_one_receiver() {
        let (tx, mut rx) = batch_channel(8);
        let other = tx.clone();

        tx.send(batch_of(1)).await.expect("send");
        other.send(batch_of(2)).await.expect("send");

        assert_eq!(1, rx.recv().await.expect("recv").len());
        assert_eq!(2, rx.recv().await.expect("recv").len());
    }
}
