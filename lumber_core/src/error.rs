use snafu::Snafu;

/// Ingestion channel error types.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum ChannelError {
    /// Every receiver has been dropped; the batch cannot be delivered.
    #[snafu(display("ingestion channel closed"))]
    ChannelClosed,
}

pub type Result<T, E = ChannelError> = std::result::Result<T, E>;
