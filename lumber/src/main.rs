use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::{error::Result, send::SendArgs, serve::ServeArgs};

mod error;
mod observability;
mod send;
mod serve;

#[derive(Parser)]
#[command(name = "lumber")]
#[command(about = "Lumber bulk transport CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run bulk servers, acknowledging every received batch
    Serve {
        #[clap(flatten)]
        inner: ServeArgs,
    },
    /// Push generated batches of events to a bulk endpoint
    Send {
        #[clap(flatten)]
        inner: SendArgs,
    },
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<()> {
    observability::init_observability();

    let cli = Cli::parse();

    let ct = CancellationToken::new();
    tokio::spawn({
        let ct = ct.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            ct.cancel();
        }
    });

    match cli.command {
        Commands::Serve { inner } => inner.run(ct).await,
        Commands::Send { inner } => inner.run(ct).await,
    }
}
