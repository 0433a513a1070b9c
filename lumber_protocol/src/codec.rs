use async_trait::async_trait;
use lumber_core::Batch;

use crate::connection::Connection;
use crate::error::Result;

/// Decodes batches from the underlying connection.
#[async_trait]
pub trait BatchReader: Send {
    /// Read exactly one batch.
    async fn read_batch(&mut self) -> Result<Batch>;
}

/// Writes acknowledgment frames back to the producer.
#[async_trait]
pub trait AckWriter: Send {
    /// Write an acknowledgment carrying the number of processed events.
    async fn ack(&mut self, events: usize) -> Result<()>;

    /// Write a zero-progress acknowledgment so the producer's read does
    /// not time out while the real acknowledgment is pending.
    async fn keepalive(&mut self, events: usize) -> Result<()>;

    /// Force buffered frames onto the wire.
    async fn flush(&mut self) -> Result<()>;

    /// Whether this codec has a keepalive frame at all.
    fn supports_keepalive(&self) -> bool {
        false
    }
}

/// Builds the codec halves for one negotiated protocol version.
///
/// Entries of the server's version dispatch table have this shape;
/// construction may fail, for example when the codec cannot negotiate
/// its parameters from the first bytes of the stream.
pub type CodecFactory =
    fn(Box<dyn Connection>) -> Result<(Box<dyn BatchReader>, Box<dyn AckWriter>)>;
