//! Whoami command implementation.

use anyhow::Result;
use chrono::DateTime;
use clap::Args;
use serde_json::json;

use tether_core::Credential;

use crate::cli::GlobalArgs;
use crate::output::{self, CredentialStatus};
use crate::session::Session;

#[derive(Args, Debug)]
pub struct WhoamiArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: WhoamiArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let credential = session.require_login()?;
    let email = session.store.user_email();
    let method = session.store.login_method();
    let external = session.store.external_token();

    if args.json {
        return output::json_pretty(&json!({
            "email": email,
            "login_method": method,
            "subject": credential.claims().and_then(|c| c.sub),
            "expires_at": expires_at(&credential),
            "remaining_seconds": credential.remaining_seconds(),
            "status": CredentialStatus::of(&credential).as_str(),
            "external": external.as_ref().map(|t| json!({
                "remaining_seconds": t.remaining_seconds(),
                "status": CredentialStatus::of(t).as_str(),
            })),
        }));
    }

    output::field("Email", email.as_deref().unwrap_or("-"));
    output::field("Method", method.as_deref().unwrap_or("-"));
    output::field(
        "Subject",
        credential
            .claims()
            .and_then(|c| c.sub)
            .as_deref()
            .unwrap_or("-"),
    );
    output::field("Expires", expires_at(&credential).as_deref().unwrap_or("-"));
    output::field("Remaining", &output::duration(credential.remaining_seconds()));
    output::field("Status", &CredentialStatus::of(&credential).colored().to_string());

    if let Some(external) = external {
        output::field(
            "External",
            &CredentialStatus::of(&external).colored().to_string(),
        );
    }

    Ok(())
}

fn expires_at(credential: &Credential) -> Option<String> {
    let exp = credential.claims()?.exp?;
    DateTime::from_timestamp(exp as i64, 0).map(|at| at.to_rfc3339())
}
