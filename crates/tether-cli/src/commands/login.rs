//! Login command implementation.

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

use tether_core::Credential;

use crate::cli::GlobalArgs;
use crate::output;
use crate::session::Session;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Application session credential
    #[arg(long)]
    pub token: String,

    /// Credential issued by the external identity provider
    #[arg(long)]
    pub external_token: Option<String>,

    /// Email of the signed-in user
    #[arg(long)]
    pub email: Option<String>,

    /// How the user signed in
    #[arg(long, default_value = "password")]
    pub method: String,
}

pub async fn run(args: LoginArgs, global: &GlobalArgs) -> Result<()> {
    let credential = Credential::new(args.token);
    if credential.claims().is_none() {
        eprintln!(
            "{}",
            "Credential has no readable claims; it will be treated as expired.".yellow()
        );
    } else if credential.is_expired() {
        bail!("Credential is already expired");
    }

    let session = Session::open(global)?;
    session.store.clear_all();
    session.store.set_auth_token(&credential);
    session.store.set_login_method(&args.method);

    if let Some(token) = args.external_token {
        session.store.set_external_token(&Credential::new(token));
    }
    if let Some(email) = &args.email {
        session.store.set_user_email(email);
    }

    output::success("Credentials stored");
    println!();
    output::field("Method", &args.method);
    if let Some(email) = &args.email {
        output::field("Email", email);
    }
    output::field("Expires in", &output::duration(credential.remaining_seconds()));

    Ok(())
}
