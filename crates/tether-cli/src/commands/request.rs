//! Request command implementation.

use anyhow::{Context, Result, bail};
use clap::Args;

use tether_http::{Method, RequestOptions};

use crate::cli::GlobalArgs;
use crate::output;
use crate::session::Session;

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    pub method: String,

    /// Path relative to the API URL, or an absolute URL
    pub path: String,

    /// JSON request body
    #[arg(long)]
    pub data: Option<String>,

    /// Send without the stored credential
    #[arg(long)]
    pub anonymous: bool,

    /// Do not refresh and retry after a 401
    #[arg(long)]
    pub no_retry: bool,
}

pub async fn run(args: RequestArgs, global: &GlobalArgs) -> Result<()> {
    let method: Method = args
        .method
        .to_uppercase()
        .parse()
        .context("Invalid HTTP method")?;

    let url = if args.path.starts_with("http://") || args.path.starts_with("https://") {
        args.path.clone()
    } else {
        global.api()?.join(&args.path)
    };

    let session = Session::open(global)?;

    let mut options = RequestOptions::new();
    if args.anonymous {
        options = options.skip_auth();
    } else {
        session.require_login()?;
    }
    if args.no_retry {
        options = options.skip_retry();
    }

    let response = match &args.data {
        Some(data) => {
            let body: serde_json::Value =
                serde_json::from_str(data).context("--data must be valid JSON")?;
            if method == Method::POST {
                session.client.post(&url, Some(&body), options).await
            } else if method == Method::PUT {
                session.client.put(&url, Some(&body), options).await
            } else if method == Method::PATCH {
                session.client.patch(&url, Some(&body), options).await
            } else {
                bail!("{method} does not take a request body");
            }
        }
        None => session.client.request(&url, options.method(method)).await,
    }
    .context("Request failed")?;

    let status = response.status();
    output::status_line(status);

    let body = response.text().await.context("Failed to read response body")?;
    output::body(&body)?;

    if !status.is_success() {
        bail!("Request failed with {status}");
    }

    Ok(())
}
