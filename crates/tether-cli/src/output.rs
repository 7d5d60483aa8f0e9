//! Terminal rendering of credentials, responses and status lines.

use anyhow::Result;
use colored::{ColoredString, Colorize};
use serde::Serialize;

use tether_core::{Credential, DEFAULT_THRESHOLD_MINUTES};
use tether_http::StatusCode;

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// `label: value`, with the label dimmed.
pub fn field(label: &str, value: &str) {
    println!("{}: {}", label.dimmed(), value);
}

pub fn json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Where a credential stands relative to the default refresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    ExpiringSoon,
    Expired,
}

impl CredentialStatus {
    pub fn of(credential: &Credential) -> Self {
        if credential.is_expired() {
            Self::Expired
        } else if credential.is_expiring_soon(DEFAULT_THRESHOLD_MINUTES) {
            Self::ExpiringSoon
        } else {
            Self::Valid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::ExpiringSoon => "expiring soon",
            Self::Expired => "expired",
        }
    }

    pub fn colored(&self) -> ColoredString {
        match self {
            Self::Valid => self.as_str().green(),
            Self::ExpiringSoon => self.as_str().yellow(),
            Self::Expired => self.as_str().red(),
        }
    }
}

/// Response status on stderr: green for success, red otherwise.
pub fn status_line(status: StatusCode) {
    let label = status.to_string();
    if status.is_success() {
        eprintln!("{}", label.green());
    } else {
        eprintln!("{}", label.red());
    }
}

/// Print a response body, pretty-printing it when it is JSON.
pub fn body(body: &str) -> Result<()> {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => json_pretty(&value),
        Err(_) if body.is_empty() => Ok(()),
        Err(_) => {
            println!("{body}");
            Ok(())
        }
    }
}

/// Render a number of seconds as `1h 02m 03s`.
pub fn duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m {s:02}s"),
        _ => format!("{h}h {m:02}m {s:02}s"),
    }
}
