//! Showroom core - backend client, models and the data cache for the
//! furniture back office.
//!
//! The cache layer sits between consumers and the hosted backend:
//! [`cache::CacheStore`] persists entries with per-entry expiry,
//! [`cache::CacheManager`] is the process-wide handle on it,
//! [`resource::CachedResource`] runs the fetch-or-serve cycle for one named
//! resource, [`backoffice::BackOffice`] configures one per dataset, and
//! [`cache::CacheAdmin`] exposes stats and bulk invalidation.

pub mod api;
pub mod auth;
pub mod backoffice;
pub mod cache;
pub mod config;
pub mod models;
pub mod resource;
pub mod utils;
