//! Subcommand implementations.

mod login;
mod logout;
mod refresh;
mod request;
mod subscribe;
mod whoami;

use anyhow::Result;
use clap::Subcommand;

use crate::cli::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store credentials obtained from a login flow
    Login(login::LoginArgs),

    /// Display the stored session and credential expiry
    Whoami(whoami::WhoamiArgs),

    /// Refresh credentials that are close to expiry
    Refresh(refresh::RefreshArgs),

    /// Send an authenticated request to the API
    Request(request::RequestArgs),

    /// Follow a chat thread over the real-time channel
    Subscribe(subscribe::SubscribeArgs),

    /// Clear all stored credentials
    Logout(logout::LogoutArgs),
}

pub async fn handle(command: Commands, global: &GlobalArgs) -> Result<()> {
    match command {
        Commands::Login(args) => login::run(args, global).await,
        Commands::Whoami(args) => whoami::run(args, global).await,
        Commands::Refresh(args) => refresh::run(args, global).await,
        Commands::Request(args) => request::run(args, global).await,
        Commands::Subscribe(args) => subscribe::run(args, global).await,
        Commands::Logout(args) => logout::run(args, global).await,
    }
}
