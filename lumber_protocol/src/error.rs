use snafu::Snafu;

/// Protocol error types.
///
/// The message associated with an error is forwarded to the remote
/// producer in the response body, so it should be descriptive.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    /// The requested protocol version has no registered codec.
    #[snafu(display("unsupported protocol version {version}"))]
    UnsupportedVersion { version: String },
    /// The stream ended before a full unit of input was read.
    #[snafu(display("connection closed mid-frame"))]
    ConnectionClosed,
    /// A frame failed to decode.
    #[snafu(display("malformed frame"))]
    MalformedFrame { source: serde_json::Error },
    /// I/O failure on the underlying transport.
    #[snafu(display("transport error"))]
    Transport { source: std::io::Error },
}

pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;
