//! tether-http - Authenticated HTTP and resilient real-time transport.
//!
//! - [`AuthenticatedClient`] injects the primary credential, refreshes it
//!   ahead of expiry and retries exactly once on a 401.
//! - [`EndpointService`] is a [`TokenService`](tether_core::TokenService)
//!   refreshed against an HTTP endpoint.
//! - [`ResilientChannel`] keeps a WebSocket open for one resource at a time,
//!   with heartbeats and bounded exponential backoff.

pub mod channel;
mod client;
mod config;
mod error;
mod service;

pub use channel::{
    Backoff, ChannelState, ChatMessage, Envelope, MessageHandler, MessageId, ResilientChannel,
    Sender,
};
pub use client::{AuthenticatedClient, RequestOptions};
pub use config::{ChannelConfig, ClientConfig};
pub use service::{EndpointService, PRIMARY_SERVICE, REFRESH_PATH};

pub use reqwest::{Method, Response, StatusCode};
