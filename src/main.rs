mod auth;
mod cli;
mod client;
mod config;
mod error;
mod obfuscate;
mod output;
mod persist;
mod resource;
mod scheduler;
mod types;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting extractor");
    cli.execute().await?;

    Ok(())
}
