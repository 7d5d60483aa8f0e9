//! Remote endpoint URL type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, InvalidInputError};

/// A validated base URL for an API or real-time channel.
///
/// Secure schemes (`https`, `wss`) are accepted for any host; plain `http` and
/// `ws` are accepted only for loopback hosts.
///
/// # Example
///
/// ```
/// use tether_core::Endpoint;
///
/// let api = Endpoint::new("https://api.example.com/").unwrap();
/// assert_eq!(api.join("/api/v1/auth/refresh"),
///            "https://api.example.com/api/v1/auth/refresh");
/// assert_eq!(api.websocket_url("ws/chat/42"), "wss://api.example.com/ws/chat/42");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Create a new endpoint from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not valid or uses an insecure scheme
    /// for a non-loopback host.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let url = Url::parse(s).map_err(|e| InvalidInputError::Endpoint {
            value: s.to_string(),
            reason: e.to_string(),
        })?;

        Self::validate(&url, s)?;

        // Normalize: remove trailing slash
        let normalized = if url.path() == "/" {
            let mut u = url.clone();
            u.set_path("");
            u
        } else {
            url
        };

        Ok(Self(normalized))
    }

    /// Append a path to the base URL.
    pub fn join(&self, path: &str) -> String {
        // The URL crate always adds a trailing slash to root paths
        let base = self.0.as_str().trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    /// Append a path and map `http(s)` to `ws(s)`.
    pub fn websocket_url(&self, path: &str) -> String {
        let joined = self.join(path);
        if let Some(rest) = joined.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = joined.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            joined
        }
    }

    /// Returns the base URL as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the inner URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns the host string.
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    /// Returns the URL scheme.
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    fn validate(url: &Url, original: &str) -> Result<(), Error> {
        if url.cannot_be_a_base() {
            return Err(InvalidInputError::Endpoint {
                value: original.to_string(),
                reason: "must be an absolute URL".to_string(),
            }
            .into());
        }

        let Some(host) = url.host_str() else {
            return Err(InvalidInputError::Endpoint {
                value: original.to_string(),
                reason: "must have a host".to_string(),
            }
            .into());
        };

        let is_loopback = matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]");

        match url.scheme() {
            "https" | "wss" => Ok(()),
            "http" | "ws" if is_loopback => Ok(()),
            "http" | "ws" => Err(InvalidInputError::Endpoint {
                value: original.to_string(),
                reason: "plain http/ws allowed only for localhost".to_string(),
            }
            .into()),
            other => Err(InvalidInputError::Endpoint {
                value: original.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            }
            .into()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Endpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Endpoint::new(&s).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}
