use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header;
use axum::http::request::Parts;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use lumber_protocol::Connection;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::io::StreamReader;

use crate::body::{ResponseWriter, response_channel};

/// Adapts one HTTP request/response exchange into a [`Connection`].
///
/// The read side is the request body; bytes written become chunks of
/// the streamed response body, so a wire codec written against a raw
/// socket runs unmodified over HTTP. Shutting the connection down
/// closes the body stream; status line and headers stay with the
/// handler, never with the adapter.
pub struct HttpConnection {
    reader: StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>,
    writer: ResponseWriter,
    local_addr: String,
    remote_addr: String,
}

impl HttpConnection {
    /// Adapt the exchange, returning the connection and the response
    /// body fed by its write side.
    pub fn new(parts: &Parts, body: Body) -> (Self, Body) {
        let (writer, response_body) = response_channel();
        let stream = body
            .into_data_stream()
            .map_err(io::Error::other)
            .boxed();

        let local_addr = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.to_string())
            .unwrap_or_default();

        (
            Self {
                reader: StreamReader::new(stream),
                writer,
                local_addr,
                remote_addr,
            },
            response_body,
        )
    }
}

impl AsyncRead for HttpConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for HttpConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

impl Connection for HttpConnection {
    fn local_addr(&self) -> String {
        self.local_addr.clone()
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.clone()
    }
}
