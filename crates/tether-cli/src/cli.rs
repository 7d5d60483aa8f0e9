//! CLI argument definitions.

use anyhow::{Context, Result};
use clap::{Args, Parser};

use tether_core::Endpoint;

use crate::commands::Commands;

/// Path under the API endpoint where chat threads are served.
const DEFAULT_CHANNEL_PATH: &str = "/api/v1/ws/chat";

/// Session and transport toolbox.
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Application API base URL
    #[arg(long, env = "TETHER_API_URL", default_value = "http://localhost:8000", global = true)]
    pub api_url: String,

    /// Chat channel base URL (defaults to the API URL with a ws scheme)
    #[arg(long, env = "TETHER_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Refresh URL for the external identity provider credential
    #[arg(long, env = "TETHER_EXTERNAL_REFRESH_URL", global = true)]
    pub external_refresh_url: Option<String>,
}

impl GlobalArgs {
    pub fn api(&self) -> Result<Endpoint> {
        Endpoint::new(&self.api_url).context("Invalid API URL")
    }

    pub fn channel(&self) -> Result<Endpoint> {
        match &self.ws_url {
            Some(url) => Endpoint::new(url).context("Invalid channel URL"),
            None => Endpoint::new(self.api()?.websocket_url(DEFAULT_CHANNEL_PATH))
                .context("Invalid channel URL"),
        }
    }
}
