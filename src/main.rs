use clap::Parser;
use anyhow::Result;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod bridge;
mod fedi;
mod relay;
mod retry;
mod sanitize;
mod sync;
mod telemetry;
mod util;
mod watermark;

#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(name = "twt2toot", about = "Mirror tweets from an RSS-Bridge feed to a Fediverse account")]
struct Cli {
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(flatten)]
    sync: sync::SyncCmd,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // initialize logging/tracing (stderr). Respect RUST_LOG and TWT2TOOT_LOG_FORMAT
    telemetry::config::init_tracing();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    sync::run(cli.sync, cancel).await
}
