mod auth;
mod cli;
mod collector;
mod config;
mod error;
mod metrics;
mod output;
mod providers;
mod sinks;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting buildkite-metrics");
    cli.execute().await?;

    Ok(())
}
