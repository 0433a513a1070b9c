use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

/// Transport-agnostic duplex byte stream.
///
/// Codecs read batches from and write acknowledgments to a
/// `Connection` without knowing whether the other side is a TCP
/// socket or an HTTP exchange. Address accessors return opaque
/// endpoint identifiers. Deadline setters default to no-ops for
/// transports whose timeouts are governed elsewhere, as is the case
/// for HTTP where the surrounding server owns them.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {
    /// Opaque identifier for the local endpoint.
    fn local_addr(&self) -> String;

    /// Opaque identifier for the remote endpoint.
    fn remote_addr(&self) -> String;

    fn set_read_deadline(&mut self, _deadline: Option<Duration>) {}

    fn set_write_deadline(&mut self, _deadline: Option<Duration>) {}
}
