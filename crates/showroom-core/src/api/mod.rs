//! Client module for the hosted relational backend.
//!
//! The backend exposes each table over a PostgREST-style HTTP interface.
//! `ApiClient` talks to it directly; everything else depends on the
//! `Backend` trait so resources can be exercised against fakes.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::Backend;
pub use client::ApiClient;
pub use error::ApiError;
