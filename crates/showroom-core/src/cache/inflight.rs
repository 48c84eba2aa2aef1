//! Single-flight registry: concurrent fetches of one key share a future.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

/// Type-erased fetch result. Joiners downcast it to the type they expect.
pub type SharedValue = Arc<dyn Any + Send + Sync>;

pub type SharedOutcome = Result<SharedValue, Arc<anyhow::Error>>;

pub type SharedFetch = Shared<BoxFuture<'static, SharedOutcome>>;

#[derive(Default)]
pub struct InFlight {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, (u64, SharedFetch)>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the fetch already running for `key`, or register the one built
    /// by `start`. The flag is true when this call started it.
    ///
    /// A registered fetch unregisters itself as it completes, so a finished
    /// result is never handed to a later caller.
    pub fn join_or_start<F>(self: &Arc<Self>, key: &str, start: F) -> (SharedFetch, bool)
    where
        F: FnOnce() -> BoxFuture<'static, SharedOutcome>,
    {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, fetch)) = pending.get(key) {
            return (fetch.clone(), false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(self);
        let owned_key = key.to_string();
        let inner = start();
        let fetch = async move {
            let outcome = inner.await;
            registry.finish(&owned_key, id);
            outcome
        }
        .boxed()
        .shared();

        pending.insert(key.to_string(), (id, fetch.clone()));
        (fetch, true)
    }

    fn finish(&self, key: &str, id: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.get(key).is_some_and(|(current, _)| *current == id) {
            pending.remove(key);
        }
    }

    /// Number of keys with a fetch in progress.
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let registry = Arc::new(InFlight::new());
        let starts = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let s = Arc::clone(&starts);
        let (first, started_first) = registry.join_or_start("k", move || {
            s.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = release_rx.await;
                Ok(Arc::new(42_i32) as SharedValue)
            }
            .boxed()
        });
        let s = Arc::clone(&starts);
        let (second, started_second) = registry.join_or_start("k", move || {
            s.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Arc::new(0_i32) as SharedValue) }.boxed()
        });

        assert!(started_first);
        assert!(!started_second);
        assert_eq!(registry.len(), 1);

        release_tx.send(()).unwrap();
        let (a, b) = tokio::join!(first, second);

        assert_eq!(*a.unwrap().downcast::<i32>().unwrap(), 42);
        assert_eq!(*b.unwrap().downcast::<i32>().unwrap(), 42);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty(), "completed fetch unregisters itself");
    }

    #[tokio::test]
    async fn test_completed_fetch_is_not_reused() {
        let registry = Arc::new(InFlight::new());

        let (first, _) = registry.join_or_start("k", || async { Ok(Arc::new(1_i32) as SharedValue) }.boxed());
        assert_eq!(*first.await.unwrap().downcast::<i32>().unwrap(), 1);

        let (second, started) = registry.join_or_start("k", || async { Ok(Arc::new(2_i32) as SharedValue) }.boxed());
        assert!(started);
        assert_eq!(*second.await.unwrap().downcast::<i32>().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let registry = Arc::new(InFlight::new());
        let (fetch, _) = registry.join_or_start("k", || {
            async { Err(Arc::new(anyhow::anyhow!("backend down"))) }.boxed()
        });

        let err = fetch.await.err().expect("should fail");
        assert_eq!(err.to_string(), "backend down");
        assert!(registry.is_empty());
    }
}
