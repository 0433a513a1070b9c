use std::net::SocketAddr;

use snafu::Snafu;

/// Bulk server error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BulkServerError {
    #[snafu(display("failed to bind {address}"))]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("server error"))]
    Serve { source: std::io::Error },
}

pub type Result<T, E = BulkServerError> = std::result::Result<T, E>;
