use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// An opaque structured record.
///
/// The transport never interprets event contents; only the ES
/// compatibility adapter reads per-event metadata.
pub type Event = serde_json::Value;

/// One-shot completion signal attached to a [`Batch`].
///
/// The gate transitions from open to closed exactly once. Waiting on a
/// closed gate returns immediately, forever.
#[derive(Debug, Clone)]
pub struct AckGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    closed: AtomicBool,
    signal: CancellationToken,
}

impl AckGate {
    fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                closed: AtomicBool::new(false),
                signal: CancellationToken::new(),
            }),
        }
    }

    /// Close the gate, waking every waiter.
    ///
    /// Must be called exactly once, by whoever owns downstream
    /// processing of the batch. Completing an already-closed gate is a
    /// consumer bug that would corrupt acknowledgment semantics, so it
    /// panics.
    pub fn complete(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            panic!("acknowledgment gate completed twice");
        }
        self.inner.signal.cancel();
    }

    /// Wait until the gate has closed.
    pub async fn acked(&self) {
        self.inner.signal.cancelled().await
    }

    pub fn is_acked(&self) -> bool {
        self.inner.signal.is_cancelled()
    }
}

/// Ordered group of events transported and acknowledged as a unit.
///
/// The event sequence is fixed at creation. A batch is consumed by at
/// most one downstream processor, which calls [`Batch::ack`] once it
/// has finished; the handler that enqueued the batch keeps only a
/// cloned [`AckGate`] to wait on.
#[derive(Debug)]
pub struct Batch {
    events: Vec<Event>,
    gate: AckGate,
}

impl Batch {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            gate: AckGate::new(),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Signal that downstream processing of this batch has finished.
    pub fn ack(&self) {
        self.gate.complete();
    }

    /// Handle for waiting on this batch's completion.
    pub fn gate(&self) -> AckGate {
        self.gate.clone()
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_gate_not_ready_before_completion() {
        let batch = Batch::new(vec![json!({"message": "a"})]);
        let gate = batch.gate();

        assert!(!gate.is_acked());
        assert!(gate.acked().now_or_never().is_none());
        // A second wait before completion is still pending.
        assert!(gate.acked().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_gate_permanently_ready_after_completion() {
        let batch = Batch::new(vec![json!({"message": "a"}), json!({"message": "b"})]);
        let gate = batch.gate();

        batch.ack();

        assert!(gate.is_acked());
        gate.acked().await;
        // Repeated waits after closing return immediately.
        assert!(gate.acked().now_or_never().is_some());
        assert!(gate.acked().now_or_never().is_some());
    }

    #[tokio::test]
    async fn test_gate_wakes_concurrent_waiter() {
        let batch = Batch::new(vec![json!({"message": "a"})]);
        let gate = batch.gate();

        let waiter = tokio::spawn(async move { gate.acked().await });
        tokio::task::yield_now().await;

        batch.ack();
        waiter.await.expect("waiter");
    }

    #[tokio::test]
    #[should_panic(expected = "completed twice")]
    async fn test_double_ack_panics() {
        let batch = Batch::new(vec![json!({"message": "a"})]);
        batch.ack();
        batch.ack();
    }

    #[test]
    fn test_batch_preserves_event_order() {
        let events = vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})];
        let batch = Batch::new(events.clone());

        assert_eq!(3, batch.len());
        assert_eq!(events, batch.events());
    }
}
