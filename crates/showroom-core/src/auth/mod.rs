//! Credential storage for the backend API key.
//!
//! The key is kept in the OS keychain via `CredentialStore`, indexed by
//! backend URL so several projects can coexist.

pub mod credentials;

pub use credentials::{resolve_api_key, CredentialStore};
