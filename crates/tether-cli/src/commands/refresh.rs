//! Refresh command implementation.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;

use tether_core::DEFAULT_THRESHOLD_MINUTES;
use tether_http::PRIMARY_SERVICE;

use crate::cli::GlobalArgs;
use crate::output;
use crate::session::Session;

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Refresh credentials expiring within this many minutes
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_MINUTES)]
    pub threshold: u64,

    /// Refresh the application credential even if it is not expiring
    #[arg(long)]
    pub force: bool,
}

pub async fn run(args: RefreshArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    session.require_login()?;

    if !session.registry.check_all_services() {
        bail!("Session expired");
    }

    eprintln!("{}", "Refreshing session...".dimmed());

    if args.force {
        session
            .registry
            .refresh(PRIMARY_SERVICE)
            .await
            .context("Failed to refresh session")?;
    } else if !session.registry.refresh_expiring_soon(args.threshold).await {
        bail!("Failed to refresh session");
    }

    let credential = session.require_login()?;
    output::success("Session is valid");
    output::field("Services", &session.registry.services().join(", "));
    output::field("Expires in", &output::duration(credential.remaining_seconds()));

    Ok(())
}
