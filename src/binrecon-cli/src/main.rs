//! `binrecon`: terminal front end driving the core analysis crates.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Map { file } => commands::map(&file),
        Command::Scan { file, pattern, name, json } => commands::scan(&file, &pattern, &name, json),
        Command::Detect { file, json } => commands::detect(&file, json).await,
        Command::Run { file, script } => commands::run(&file, &script),
        Command::Watch { file, script } => commands::watch(file, script).await,
    }
}
