//! tether - CLI for inspecting and exercising a persisted session.
//!
//! Stores credentials, shows their claims, refreshes them, sends
//! authenticated requests and follows a chat thread over the resilient
//! channel.

mod cli;
mod commands;
mod output;
mod session;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::Cli;

/// Crates whose logs `-v` turns up; dependencies stay at `warn`.
const LOG_TARGETS: [&str; 4] = ["tether", "tether_core", "tether_file", "tether_http"];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    commands::handle(cli.command, &cli.global).await
}

fn log_directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => return "warn".to_string(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    LOG_TARGETS
        .iter()
        .fold("warn".to_string(), |acc, target| format!("{acc},{target}={level}"))
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(verbosity: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directives(verbosity)));
    let layer = fmt::layer().with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_target(false))
            .init();
    }
}
