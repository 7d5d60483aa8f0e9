//! tether-core - Credential storage and refresh coordination.
//!
//! The pieces in this crate are transport-agnostic:
//!
//! - [`CredentialStore`] owns every persisted credential and label.
//! - [`claims`] reads the expiry out of a credential without verifying it.
//! - [`ServiceRegistry`] coordinates one [`TokenService`] per credential
//!   domain, coalescing concurrent refreshes and funnelling terminal
//!   failures through a single logout callback.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tether_core::{CredentialStore, LogoutHandler, MemoryStorage, ServiceRegistry};
//!
//! let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
//! let registry = ServiceRegistry::new(store, LogoutHandler::new(|| {
//!     eprintln!("session ended");
//! }));
//! assert!(registry.services().is_empty());
//! ```

pub mod claims;
pub mod credential;
pub mod error;
pub mod registry;
pub mod storage;
pub mod store;
pub mod traits;
pub mod types;

pub use claims::Claims;
pub use credential::Credential;
pub use error::Error;
pub use registry::{DEFAULT_THRESHOLD_MINUTES, LogoutHandler, ServiceRegistry};
pub use storage::{MemoryStorage, Storage};
pub use store::{CredentialKey, CredentialStore};
pub use traits::TokenService;
pub use types::Endpoint;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
