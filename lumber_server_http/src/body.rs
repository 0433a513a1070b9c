use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use axum::body::Body;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

/// Response chunks buffered before writers block.
const RESPONSE_CHUNK_BUFFER: usize = 16;

/// Create the write side of a streamed response body.
///
/// Bytes written to the [`ResponseWriter`] become chunks of the
/// returned [`Body`]; the HTTP layer forwards every chunk as soon as
/// it is produced, which is what keepalive frames and streamed item
/// statuses rely on. Shutting the writer down ends the body stream.
pub fn response_channel() -> (ResponseWriter, Body) {
    let (tx, rx) = mpsc::channel(RESPONSE_CHUNK_BUFFER);
    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    (
        ResponseWriter {
            tx: PollSender::new(tx),
        },
        body,
    )
}

/// [`AsyncWrite`] half feeding a streamed response body.
pub struct ResponseWriter {
    tx: PollSender<Bytes>,
}

impl AsyncWrite for ResponseWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if ready!(this.tx.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(response_closed()));
        }
        if this.tx.send_item(Bytes::copy_from_slice(buf)).is_err() {
            return Poll::Ready(Err(response_closed()));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Chunks are handed to the HTTP layer as soon as they are written.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().tx.close();
        Poll::Ready(Ok(()))
    }
}

fn response_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response body closed")
}
