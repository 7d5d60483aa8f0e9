//! Subscribe command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tether_http::channel::NEW_MESSAGE;
use tether_http::{ChannelConfig, ChannelState, ChatMessage, Envelope, ResilientChannel, Sender};

use crate::cli::GlobalArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// Chat thread to follow
    pub thread_id: String,

    /// Output envelopes as JSON
    #[arg(long)]
    pub json: bool,

    /// Reconnects attempted before giving up
    #[arg(long, default_value_t = 10)]
    pub max_attempts: u32,
}

pub async fn run(args: SubscribeArgs, global: &GlobalArgs) -> Result<()> {
    let endpoint = global.channel()?;
    let config = ChannelConfig::new(endpoint.clone()).with_max_attempts(args.max_attempts);

    eprintln!(
        "{} {}",
        "Connecting to".dimmed(),
        endpoint.join(&args.thread_id).dimmed()
    );
    eprintln!("{}", "Press Ctrl+C to stop.".dimmed());
    eprintln!();

    let json_output = args.json;
    let channel = ResilientChannel::new(config, move |envelope| {
        handle_envelope(&envelope, json_output)
    });

    let mut states = channel.watch_state();
    channel.connect(args.thread_id).await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                report_state(state, channel.reconnect_attempts());
            }
        }
    }

    channel.disconnect().await;
    Ok(())
}

fn report_state(state: ChannelState, attempts: u32) {
    match state {
        ChannelState::Open => eprintln!("{}", "CONNECTED".green()),
        ChannelState::Connecting if attempts > 0 => {
            eprintln!("{} attempt {}", "RECONNECTING".yellow(), attempts)
        }
        ChannelState::Connecting => {}
        ChannelState::Closed => eprintln!("{}", "DISCONNECTED".red()),
        ChannelState::Idle => {}
    }
}

fn handle_envelope(envelope: &Envelope, json_output: bool) {
    if json_output {
        if let Err(e) = output::json(envelope) {
            tracing::warn!(error = %e, "Failed to print envelope");
        }
        return;
    }

    match envelope.data_as::<ChatMessage>() {
        Ok(Some(message)) if envelope.kind == NEW_MESSAGE => {
            let sender = match message.sender {
                Sender::User => "USER".cyan(),
                Sender::Official => "OFFICIAL".magenta(),
            };
            let unread = if message.is_read { "" } else { " *" };
            println!("{} {} {}{}", message.time.dimmed(), sender, message.text, unread);
        }
        _ => {
            let data = envelope
                .data
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default();
            println!("{} {}", envelope.kind.to_uppercase().dimmed(), data);
        }
    }
}
