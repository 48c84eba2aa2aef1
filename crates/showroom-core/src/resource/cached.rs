use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::options::ResourceOptions;
use super::state::ResourceState;
use super::{Cacheable, Fetcher};
use crate::cache::inflight::SharedValue;
use crate::cache::CacheManager;

/// What the resource currently points at. Changing any of it restarts the
/// cycle.
struct Target<T> {
    key: String,
    fetcher: Fetcher<T>,
    enabled: bool,
}

struct Inner<T: Cacheable> {
    manager: CacheManager,
    options: ResourceOptions<T>,
    target: Mutex<Target<T>>,
    state: watch::Sender<ResourceState<T>>,
    /// Bumped by every cycle; a result is applied only if its cycle is
    /// still the latest one.
    generation: AtomicU64,
    closed: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Set while a refresh started by the timer is still running.
    timer_refresh: AtomicBool,
}

/// One named backend resource synchronised through the cache.
///
/// `load` serves a fresh cache entry when there is one and fetches
/// otherwise; `refresh` always fetches. Successful fetches are written
/// through to the cache with the configured TTL. When a fetch fails the
/// error is recorded and, if no data is present, the fallback is shown.
///
/// Dropping the resource closes it: the auto-refresh timer stops and
/// fetches still running finish without touching this resource's state or
/// callbacks (their cache write still happens).
pub struct CachedResource<T: Cacheable> {
    inner: Arc<Inner<T>>,
}

impl<T: Cacheable> CachedResource<T> {
    /// Create a resource without loading it.
    pub fn new(
        manager: CacheManager,
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        options: ResourceOptions<T>,
    ) -> Self {
        let (state, _) = watch::channel(ResourceState::default());
        let target = Target {
            key: key.into(),
            fetcher,
            enabled: options.enabled,
        };

        Self {
            inner: Arc::new(Inner {
                manager,
                options,
                target: Mutex::new(target),
                state,
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                timer: Mutex::new(None),
                timer_refresh: AtomicBool::new(false),
            }),
        }
    }

    /// Create a resource, run its first load and start auto-refresh.
    pub async fn mount(
        manager: CacheManager,
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        options: ResourceOptions<T>,
    ) -> Self {
        Self::new(manager, key, fetcher, options).start().await
    }

    /// Run the first load and start auto-refresh on a resource built with
    /// [`CachedResource::new`].
    pub async fn start(self) -> Self {
        self.load().await;
        self.start_auto_refresh();
        self
    }

    pub fn key(&self) -> String {
        self.inner.key()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.target().enabled
    }

    pub fn options(&self) -> &ResourceOptions<T> {
        &self.inner.options
    }

    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.inner.state.borrow().data.clone()
    }

    /// Watch every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.inner.state.subscribe()
    }

    /// Serve from the cache when fresh, fetch otherwise.
    pub async fn load(&self) {
        self.inner.load().await
    }

    /// Fetch regardless of what the cache holds.
    pub async fn refresh(&self) {
        self.inner.refresh().await
    }

    /// Drop this resource's cache entry. The data already shown stays.
    pub fn clear_cache(&self) {
        let key = self.key();
        self.inner.manager.remove(&key);
        if !self.is_closed() {
            self.inner.state.send_modify(|state| {
                state.is_from_cache = false;
                state.last_updated = None;
            });
        }
        debug!(key = %key, "Resource cache cleared");
    }

    /// Enable or disable the resource. Disabling resets it to idle and
    /// stops the timer; enabling loads it and restarts the timer.
    pub async fn set_enabled(&self, enabled: bool) {
        {
            let mut target = self.inner.target_mut();
            if target.enabled == enabled {
                return;
            }
            target.enabled = enabled;
        }
        self.stop_auto_refresh();
        self.inner.load().await;
        if enabled {
            self.start_auto_refresh();
        }
    }

    /// Point the resource at another key (and the fetcher for it), then
    /// run a fresh cycle. Results still in flight for the old key are
    /// discarded.
    pub async fn retarget(&self, key: impl Into<String>, fetcher: Fetcher<T>) {
        {
            let mut target = self.inner.target_mut();
            target.key = key.into();
            target.fetcher = fetcher;
        }
        self.stop_auto_refresh();
        self.inner.load().await;
        self.start_auto_refresh();
    }

    /// Start the auto-refresh timer if the options ask for one. Each tick
    /// refreshes when the cache says the entry is at least one interval old.
    ///
    /// Returns whether a timer is now running.
    pub fn start_auto_refresh(&self) -> bool {
        let Some(interval) = self.inner.options.active_refresh_interval() else {
            return false;
        };
        if self.is_closed() || !self.is_enabled() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key(), "No async runtime; auto-refresh not started");
            return false;
        };

        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let key = inner.key();
                if !inner.manager.should_refresh(&key, interval) {
                    continue;
                }
                if inner.timer_refresh.swap(true, Ordering::SeqCst) {
                    debug!(key = %key, "Previous auto-refresh still running, skipping tick");
                    continue;
                }
                debug!(key = %key, "Auto-refresh due");
                // Detached so stopping the timer never cancels a fetch.
                let task_inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    task_inner.refresh().await;
                    task_inner.timer_refresh.store(false, Ordering::SeqCst);
                });
            }
        });

        if let Some(previous) = self.inner.timer_slot().replace(handle) {
            previous.abort();
        }
        true
    }

    pub fn stop_auto_refresh(&self) {
        if let Some(handle) = self.inner.timer_slot().take() {
            handle.abort();
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.inner
            .timer_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the timer and ignore every result that arrives from now on.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.stop_auto_refresh();
        debug!(key = %self.key(), "Resource closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl<T: Cacheable> Drop for CachedResource<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Cacheable> Inner<T> {
    fn target_mut(&self) -> MutexGuard<'_, Target<T>> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn target(&self) -> Target<T> {
        let target = self.target_mut();
        Target {
            key: target.key.clone(),
            fetcher: Arc::clone(&target.fetcher),
            enabled: target.enabled,
        }
    }

    fn key(&self) -> String {
        self.target_mut().key.clone()
    }

    fn timer_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_cycle(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Apply `update` if `generation` is still the live cycle.
    fn apply(&self, generation: u64, update: impl FnOnce(&mut ResourceState<T>)) -> bool {
        let mut applied = false;
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            update(state);
            applied = true;
            true
        });
        applied
    }

    async fn load(&self) {
        let Target { key, fetcher, enabled } = self.target();
        let generation = self.begin_cycle();

        if !enabled {
            self.apply(generation, |state| *state = ResourceState::default());
            return;
        }

        if let Some(data) = self.manager.get::<T>(&key) {
            debug!(key = %key, "Serving resource from cache");
            let now = self.manager.store().now();
            self.apply(generation, |state| {
                state.data = Some(data);
                state.loading = false;
                state.error = None;
                state.is_from_cache = true;
                state.last_updated = Some(now);
            });
            return;
        }

        debug!(key = %key, "Cache miss");
        self.fetch(generation, key, fetcher).await;
    }

    async fn refresh(&self) {
        let Target { key, fetcher, enabled } = self.target();
        if !enabled {
            debug!(key = %key, "Refresh skipped, resource disabled");
            return;
        }
        let generation = self.begin_cycle();
        self.fetch(generation, key, fetcher).await;
    }

    async fn fetch(&self, generation: u64, key: String, fetcher: Fetcher<T>) {
        self.apply(generation, |state| {
            state.loading = true;
            state.is_from_cache = false;
        });
        info!(key = %key, "Fetching resource");

        match self.run_fetch(&key, fetcher).await {
            Ok(data) => {
                let now = self.manager.store().now();
                let applied = self.apply(generation, |state| {
                    state.data = Some(data.clone());
                    state.loading = false;
                    state.error = None;
                    state.is_from_cache = false;
                    state.last_updated = Some(now);
                });
                if !applied {
                    debug!(key = %key, generation, "Discarding superseded result");
                    return;
                }
                if let Some(ref on_success) = self.options.on_success {
                    run_callback(&key, "on_success", || on_success(&data));
                }
            }
            Err(err) => {
                error!(key = %key, error = %err, "Resource fetch failed");
                let message = format!("{:#}", err);
                let fallback = self.options.fallback.clone();
                let applied = self.apply(generation, |state| {
                    state.loading = false;
                    state.error = Some(message);
                    if state.data.is_none() {
                        state.data = fallback;
                    }
                });
                if !applied {
                    debug!(key = %key, generation, "Discarding superseded failure");
                    return;
                }
                if let Some(ref on_error) = self.options.on_error {
                    run_callback(&key, "on_error", || on_error(&*err));
                }
            }
        }
    }

    /// Run the fetcher (or join the fetch already running for this key) and
    /// write the result through to the cache.
    async fn run_fetch(&self, key: &str, fetcher: Fetcher<T>) -> Result<T, Arc<anyhow::Error>> {
        if !self.options.dedupe {
            return self.fetch_direct(key, fetcher).await;
        }

        let manager = self.manager.clone();
        let owned_key = key.to_string();
        let ttl = self.options.ttl;
        let leader_fetcher = Arc::clone(&fetcher);
        let (shared, started) = self.manager.inflight().join_or_start(key, move || {
            async move {
                let data = leader_fetcher().await.map_err(Arc::new)?;
                manager.set(&owned_key, &data, ttl);
                Ok(Arc::new(data) as SharedValue)
            }
            .boxed()
        });
        if !started {
            debug!(key, "Joining in-flight fetch");
        }

        let value = shared.await?;
        match value.downcast::<T>() {
            Ok(data) => Ok((*data).clone()),
            Err(_) => {
                warn!(key, "In-flight fetch for this key holds another type, fetching separately");
                self.fetch_direct(key, fetcher).await
            }
        }
    }

    async fn fetch_direct(&self, key: &str, fetcher: Fetcher<T>) -> Result<T, Arc<anyhow::Error>> {
        let data = fetcher().await.map_err(Arc::new)?;
        self.manager.set(key, &data, self.options.ttl);
        Ok(data)
    }
}

/// Run a user callback; a panic inside it is logged and swallowed.
fn run_callback(key: &str, name: &str, callback: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!(key, callback = name, panic = %message, "Resource callback panicked");
    }
}
