use std::net::SocketAddr;

use snafu::Snafu;

/// ES compatibility server error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EsServerError {
    #[snafu(display("invalid server options: {message}"))]
    InvalidOptions { message: &'static str },
    #[snafu(display("failed to bind {address}"))]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("server error"))]
    Serve { source: std::io::Error },
}

pub type Result<T, E = EsServerError> = std::result::Result<T, E>;
