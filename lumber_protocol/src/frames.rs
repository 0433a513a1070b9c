//! Newline-delimited JSON framing for the bulk transport.
//!
//! Every frame is a single JSON document terminated by `\n`. A batch
//! is a window frame (`{"window": N}`) followed by `N` event frames;
//! the receiver answers with acknowledgment frames (`{"ack": N}`),
//! where an acknowledgment of zero is a keepalive.

use async_trait::async_trait;
use lumber_core::{Batch, Event};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::codec::{AckWriter, BatchReader};
use crate::connection::Connection;
use crate::error::{ConnectionClosedSnafu, MalformedFrameSnafu, Result, TransportSnafu};

/// Version marker of the JSON frame codec.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Upper bound on the event capacity reserved up front for a batch.
///
/// The window count comes from the wire and cannot be trusted for
/// allocation sizing; larger batches grow the vector as events
/// actually arrive.
const MAX_EVENTS_PREALLOC: usize = 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WindowFrame {
    window: usize,
}

/// Acknowledgment frame: `ack` events of the batch have been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckFrame {
    pub ack: usize,
}

/// Codec constructor registered in the version dispatch table.
pub fn json_frame_codec(
    conn: Box<dyn Connection>,
) -> Result<(Box<dyn BatchReader>, Box<dyn AckWriter>)> {
    let (reader, writer) = tokio::io::split(conn);
    Ok((
        Box::new(JsonFrameReader::new(reader)),
        Box::new(JsonFrameWriter::new(writer)),
    ))
}

/// Encode a batch body: a window frame followed by one frame per event.
pub async fn encode_batch<W>(writer: &mut W, events: &[Event]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(
        writer,
        &WindowFrame {
            window: events.len(),
        },
    )
    .await?;
    for event in events {
        write_frame(writer, event).await?;
    }
    writer.flush().await.context(TransportSnafu)?;
    Ok(())
}

async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame).context(MalformedFrameSnafu)?;
    line.push(b'\n');
    writer.write_all(&line).await.context(TransportSnafu)?;
    Ok(())
}

/// Reads JSON frames from the read half of a connection.
pub struct JsonFrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R> JsonFrameReader<R>
where
    R: AsyncRead + Send + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: String::new(),
        }
    }

    /// Read the next frame; `None` at end of input.
    ///
    /// Blank lines are skipped so a trailing newline never produces a
    /// spurious decode error.
    pub async fn read_frame<T>(&mut self) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .context(TransportSnafu)?;
            if read == 0 {
                return Ok(None);
            }

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            return serde_json::from_str(line)
                .map(Some)
                .context(MalformedFrameSnafu);
        }
    }
}

#[async_trait]
impl<R> BatchReader for JsonFrameReader<R>
where
    R: AsyncRead + Send + Unpin,
{
    async fn read_batch(&mut self) -> Result<Batch> {
        let window: WindowFrame = self
            .read_frame()
            .await?
            .ok_or_else(|| ConnectionClosedSnafu {}.build())?;

        let mut events = Vec::with_capacity(window.window.min(MAX_EVENTS_PREALLOC));
        for _ in 0..window.window {
            let event: Event = self
                .read_frame()
                .await?
                .ok_or_else(|| ConnectionClosedSnafu {}.build())?;
            events.push(event);
        }

        Ok(Batch::new(events))
    }
}

/// Writes acknowledgment frames to the write half of a connection.
pub struct JsonFrameWriter<W> {
    writer: W,
}

impl<W> JsonFrameWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> AckWriter for JsonFrameWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn ack(&mut self, events: usize) -> Result<()> {
        write_frame(&mut self.writer, &AckFrame { ack: events }).await
    }

    async fn keepalive(&mut self, events: usize) -> Result<()> {
        write_frame(&mut self.writer, &AckFrame { ack: events }).await
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await.context(TransportSnafu)
    }

    fn supports_keepalive(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ProtocolError;

    #[tokio::test]
    async fn test_batch_round_trip() {
        let events = vec![
            json!({"message": "first", "offset": 1}),
            json!({"message": "second", "offset": 2}),
            json!({"message": "third", "offset": 3}),
        ];

        let mut body = Vec::new();
        encode_batch(&mut body, &events).await.expect("encode");

        let mut reader = JsonFrameReader::new(body.as_slice());
        let batch = reader.read_batch().await.expect("read batch");

        assert_eq!(events, batch.events());
    }

    #[tokio::test]
    async fn test_empty_input_is_end_of_stream() {
        let mut reader = JsonFrameReader::new(&b""[..]);
        let frame: Option<AckFrame> = reader.read_frame().await.expect("read");
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_truncated_batch_is_connection_closed() {
        let mut body = Vec::new();
        encode_batch(&mut body, &[json!({"n": 1}), json!({"n": 2})])
            .await
            .expect("encode");
        // Drop the last event line.
        let cut = body[..body.len() - 1]
            .iter()
            .rposition(|b| *b == b'\n')
            .expect("newline");
        body.truncate(cut + 1);

        let mut reader = JsonFrameReader::new(body.as_slice());
        let err = reader.read_batch().await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_hostile_window_count_is_an_error() {
        // A window count chosen to exhaust memory must not panic or
        // allocate; the truncated stream surfaces as a decode error.
        let input = format!("{{\"window\": {}}}\n", usize::MAX);
        let mut reader = JsonFrameReader::new(input.as_bytes());
        let err = reader.read_batch().await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_malformed_frame() {
        let mut reader = JsonFrameReader::new(&b"{\"window\": oops}\n"[..]);
        let err = reader.read_batch().await.unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFrame { .. }));
    }

    #[tokio::test]
    async fn test_ack_and_keepalive_frames() {
        let mut buf = Vec::new();
        {
            let mut writer = JsonFrameWriter::new(&mut buf);
            assert!(writer.supports_keepalive());
            writer.keepalive(0).await.expect("keepalive");
            writer.ack(42).await.expect("ack");
            writer.flush().await.expect("flush");
        }

        let mut reader = JsonFrameReader::new(buf.as_slice());
        assert_eq!(
            Some(AckFrame { ack: 0 }),
            reader.read_frame().await.expect("frame")
        );
        assert_eq!(
            Some(AckFrame { ack: 42 }),
            reader.read_frame().await.expect("frame")
        );
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let input = b"\n{\"ack\": 7}\n\n";
        let mut reader = JsonFrameReader::new(&input[..]);
        assert_eq!(
            Some(AckFrame { ack: 7 }),
            reader.read_frame().await.expect("frame")
        );
        let next: Option<AckFrame> = reader.read_frame().await.expect("frame");
        assert!(next.is_none());
    }
}
