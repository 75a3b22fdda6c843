mod bootstrap;
mod cli;
mod commands;
mod config;
mod error;
mod ipc;
mod response;
mod session;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use config::Config;
use session::SessionManager;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout is reserved for the response envelope, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load();
    let manager = Arc::new(SessionManager::new(config.clone()));
    manager.spawn_background_tasks();

    cli.run(&config, manager).await
}
