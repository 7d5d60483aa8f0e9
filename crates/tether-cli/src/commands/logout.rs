//! Logout command implementation.

use anyhow::Result;
use clap::Args;

use crate::cli::GlobalArgs;
use crate::output;
use crate::session::Session;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(_args: LogoutArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    session.store.clear_all();
    output::success("Logged out");
    Ok(())
}
