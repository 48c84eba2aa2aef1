//! Cached resources: one named backend resource kept in sync with the cache.
//!
//! A `CachedResource` decides between serving a fresh cache entry and
//! calling its fetcher, tracks the request lifecycle in a `ResourceState`,
//! and can refresh itself on an interval. Closing it (or dropping it)
//! stops the timer and discards the results of fetches still in flight.

pub mod cached;
pub mod options;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};

pub use cached::CachedResource;
pub use options::{ErrorCallback, ResourceOptions, SuccessCallback};
pub use state::{ResourceState, ResourceStatus};

/// Values a resource can hold: cloneable, cacheable, and shareable across tasks.
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Zero-argument async function that loads a resource from the backend.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Wrap an async closure as a `Fetcher`.
pub fn fetcher<T, F, Fut>(f: F) -> Fetcher<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}
