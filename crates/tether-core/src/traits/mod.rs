//! Core traits for credential domains.

mod service;

pub use service::TokenService;
