use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// How a `CachedResource` fetches, caches and refreshes.
pub struct ResourceOptions<T> {
    /// Lifetime of the cache entry written after a fetch. `None` never expires.
    pub ttl: Option<Duration>,
    /// Auto-refresh period; `None` or zero disables the timer.
    pub refresh_interval: Option<Duration>,
    /// A disabled resource neither reads the cache nor fetches.
    pub enabled: bool,
    /// Shown when a fetch fails and there is no data to keep showing.
    pub fallback: Option<T>,
    /// Share one fetch between concurrent loads of the same key.
    pub dedupe: bool,
    pub on_success: Option<SuccessCallback<T>>,
    pub on_error: Option<ErrorCallback>,
}

impl<T> Default for ResourceOptions<T> {
    fn default() -> Self {
        Self {
            ttl: None,
            refresh_interval: None,
            enabled: true,
            fallback: None,
            dedupe: true,
            on_success: None,
            on_error: None,
        }
    }
}

impl<T: Clone> Clone for ResourceOptions<T> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            refresh_interval: self.refresh_interval,
            enabled: self.enabled,
            fallback: self.fallback.clone(),
            dedupe: self.dedupe,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> fmt::Debug for ResourceOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOptions")
            .field("ttl", &self.ttl)
            .field("refresh_interval", &self.refresh_interval)
            .field("enabled", &self.enabled)
            .field("has_fallback", &self.fallback.is_some())
            .field("dedupe", &self.dedupe)
            .finish()
    }
}

impl<T> ResourceOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Every load fetches on its own; concurrent writers race, last one wins.
    pub fn without_dedupe(mut self) -> Self {
        self.dedupe = false;
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&anyhow::Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// The active refresh period, if the timer should run at all.
    pub fn active_refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval.filter(|interval| !interval.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options: ResourceOptions<u32> = ResourceOptions::default();
        assert!(options.enabled);
        assert!(options.dedupe);
        assert_eq!(options.ttl, None);
        assert_eq!(options.active_refresh_interval(), None);
    }

    #[test]
    fn test_zero_interval_disables_timer() {
        let options: ResourceOptions<u32> =
            ResourceOptions::new().with_refresh_interval(Duration::ZERO);
        assert_eq!(options.active_refresh_interval(), None);

        let options: ResourceOptions<u32> =
            ResourceOptions::new().with_refresh_interval(Duration::from_secs(5));
        assert_eq!(options.active_refresh_interval(), Some(Duration::from_secs(5)));
    }
}
