use std::net::AddrParseError;

use snafu::Snafu;

/// CLI error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Invalid bind address"))]
    InvalidBindAddress { source: AddrParseError },
    #[snafu(display("Bulk server error"))]
    BulkServer {
        source: lumber_server_http::BulkServerError,
    },
    #[snafu(display("ES server error"))]
    EsServer {
        source: lumber_server_es::EsServerError,
    },
    #[snafu(display("Push client error"))]
    PushClient {
        source: lumber_push_client::HttpPushClientError,
    },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;
