mod config;
mod console;
mod ffplay;
mod generator;
mod history_db;
mod prompt;
mod startup;
mod tts;
mod ytdlp;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "radio-hub")]
pub(crate) struct Args {
    /// Optional hub config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Channel to control (overrides config)
    #[arg(long)]
    channel: Option<String>,

    /// Name recorded as the requester of console commands
    #[arg(long, default_value = "console")]
    requester: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info,radio_core=info,radio_hub=info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    startup::run(args).await?;
    // The stdin reader thread never returns on its own.
    std::process::exit(0)
}
