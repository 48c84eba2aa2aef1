use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::error::{CacheError, ErrorReporter, TracingReporter};
use super::storage::{FileStorage, MemoryStorage, StorageBackend};
use crate::utils::{format_age, format_bytes};

/// One persisted cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub key: String,
    pub value: Value,
    pub stored_at: DateTime<Utc>,
    /// Time-to-live in milliseconds; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl StoredEntry {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    /// Time since the entry was written. Entries from the future are age zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.ttl() {
            Some(ttl) => self.age(now) < ttl,
            None => true,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl()?).ok()?;
        self.stored_at.checked_add_signed(ttl)
    }
}

/// Read-only summary of what the store holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    /// Entries still on disk whose TTL has passed.
    pub expired_count: usize,
    /// Entries that could not be parsed.
    pub corrupted_count: usize,
    /// Serialized size of every readable entry.
    pub total_size_bytes: usize,
    pub oldest_entry_age: Option<Duration>,
    pub newest_entry_age: Option<Duration>,
    pub keys: Vec<String>,
}

impl CacheStats {
    pub fn fresh_count(&self) -> usize {
        self.entry_count
            .saturating_sub(self.expired_count)
            .saturating_sub(self.corrupted_count)
    }

    pub fn oldest_display(&self) -> String {
        self.oldest_entry_age
            .map(format_age)
            .unwrap_or_else(|| "never".to_string())
    }

    pub fn newest_display(&self) -> String {
        self.newest_entry_age
            .map(format_age)
            .unwrap_or_else(|| "never".to_string())
    }

    pub fn size_display(&self) -> String {
        format_bytes(self.total_size_bytes)
    }
}

/// Key/value store with per-entry expiry over a storage medium.
///
/// Storage problems never reach callers: reads degrade to a miss, writes
/// are skipped, and each failure goes to the configured `ErrorReporter`.
/// Every operation runs under one lock, so a check and the mutation that
/// follows it are atomic with respect to other callers of this store.
pub struct CacheStore {
    backend: Box<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ErrorReporter>,
    op_lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingReporter),
            op_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// File-backed store rooted at `dir`, created if missing.
    pub fn open(dir: PathBuf) -> io::Result<Self> {
        Ok(Self::new(FileStorage::new(dir)?))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.op_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raw entry regardless of freshness. Unreadable entries count as absent;
    /// corrupted ones are deleted.
    fn read_entry(&self, key: &str) -> Option<StoredEntry> {
        let contents = match self.backend.read(key) {
            Ok(contents) => contents?,
            Err(source) => {
                self.reporter.report(&CacheError::StorageRead {
                    key: key.to_string(),
                    source,
                });
                return None;
            }
        };

        match serde_json::from_str::<StoredEntry>(&contents) {
            Ok(entry) => Some(entry),
            Err(source) => {
                self.reporter.report(&CacheError::Corrupted {
                    key: key.to_string(),
                    source,
                });
                self.remove_unlocked(key);
                None
            }
        }
    }

    fn fresh_entry(&self, key: &str) -> Option<StoredEntry> {
        let entry = self.read_entry(key)?;
        if entry.is_fresh(self.now()) {
            Some(entry)
        } else {
            debug!(key, "Dropping expired cache entry");
            self.remove_unlocked(key);
            None
        }
    }

    fn remove_unlocked(&self, key: &str) -> bool {
        match self.backend.remove(key) {
            Ok(()) => true,
            Err(source) => {
                self.reporter.report(&CacheError::StorageRemove {
                    key: key.to_string(),
                    source,
                });
                false
            }
        }
    }

    /// The fresh entry for `key` with its metadata.
    pub fn entry(&self, key: &str) -> Option<StoredEntry> {
        let _guard = self.lock();
        self.fresh_entry(key)
    }

    /// The value stored under `key` if it is present and fresh.
    ///
    /// Stale entries are deleted on the way out. A value that no longer
    /// decodes as `T` is reported and treated as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entry(key)?;
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(source) => {
                self.reporter.report(&CacheError::Decode {
                    key: key.to_string(),
                    source,
                });
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// Returns whether the entry was written; failures are reported, not
    /// returned.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(source) => {
                self.reporter.report(&CacheError::Serialize {
                    key: key.to_string(),
                    source,
                });
                return false;
            }
        };

        let entry = StoredEntry {
            key: key.to_string(),
            value,
            stored_at: self.now(),
            ttl_ms: ttl.map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
        };

        let contents = match serde_json::to_string(&entry) {
            Ok(contents) => contents,
            Err(source) => {
                self.reporter.report(&CacheError::Serialize {
                    key: key.to_string(),
                    source,
                });
                return false;
            }
        };

        let _guard = self.lock();
        match self.backend.write(key, &contents) {
            Ok(()) => {
                debug!(key, bytes = contents.len(), "Cache entry written");
                true
            }
            Err(source) => {
                self.reporter.report(&CacheError::StorageWrite {
                    key: key.to_string(),
                    source,
                });
                false
            }
        }
    }

    pub fn remove(&self, key: &str) {
        let _guard = self.lock();
        self.remove_unlocked(key);
    }

    fn list_keys(&self) -> Vec<String> {
        match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                self.reporter.report(&CacheError::StorageList(e));
                Vec::new()
            }
        }
    }

    /// Remove every key containing `pattern`, or every key when `None`.
    /// Returns how many entries were removed.
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        let _guard = self.lock();
        let mut removed = 0;
        for key in self.list_keys() {
            let matches = pattern.map_or(true, |p| key.contains(p));
            if matches && self.remove_unlocked(&key) {
                removed += 1;
            }
        }
        debug!(pattern = ?pattern, removed, "Cache cleared");
        removed
    }

    /// Whether `key` is due a refresh: nothing is stored, or the stored entry
    /// is at least `interval` old. TTL is not consulted.
    pub fn should_refresh(&self, key: &str, interval: Duration) -> bool {
        let _guard = self.lock();
        match self.read_entry(key) {
            Some(entry) => entry.age(self.now()) >= interval,
            None => true,
        }
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let _guard = self.lock();
        let now = self.now();
        let mut removed = 0;
        for key in self.list_keys() {
            if let Some(entry) = self.read_entry(&key) {
                if !entry.is_fresh(now) && self.remove_unlocked(&key) {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Summarise the store without modifying it.
    pub fn stats(&self) -> CacheStats {
        let _guard = self.lock();
        let now = self.now();
        let mut stats = CacheStats::default();

        for key in self.list_keys() {
            let contents = match self.backend.read(&key) {
                Ok(Some(contents)) => contents,
                Ok(None) => continue,
                Err(source) => {
                    self.reporter.report(&CacheError::StorageRead { key, source });
                    continue;
                }
            };

            stats.entry_count += 1;
            stats.keys.push(key);

            let Ok(entry) = serde_json::from_str::<StoredEntry>(&contents) else {
                stats.corrupted_count += 1;
                continue;
            };

            stats.total_size_bytes += contents.len();
            if !entry.is_fresh(now) {
                stats.expired_count += 1;
            }
            let age = entry.age(now);
            stats.oldest_entry_age = Some(stats.oldest_entry_age.map_or(age, |a| a.max(age)));
            stats.newest_entry_age = Some(stats.newest_entry_age.map_or(age, |a| a.min(age)));
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::error::{CacheErrorKind, RecordingReporter};
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    fn data(name: &str, value: i32) -> TestData {
        TestData {
            name: name.to_string(),
            value,
        }
    }

    fn create_test_store() -> (CacheStore, ManualClock, Arc<RecordingReporter>) {
        let clock = ManualClock::starting_now();
        let reporter = Arc::new(RecordingReporter::new());
        let store = CacheStore::in_memory()
            .with_clock(Arc::new(clock.clone()))
            .with_reporter(reporter.clone());
        (store, clock, reporter)
    }

    /// Storage whose every operation fails.
    struct BrokenStorage;

    impl StorageBackend for BrokenStorage {
        fn read(&self, _key: &str) -> io::Result<Option<String>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
        fn write(&self, _key: &str, _contents: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "quota exceeded"))
        }
        fn remove(&self, _key: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
        fn keys(&self) -> io::Result<Vec<String>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    #[test]
    fn test_get_returns_fresh_value() {
        let (store, _clock, _reporter) = create_test_store();
        assert!(store.set("products_a", &data("sofa", 1), Some(Duration::from_secs(60))));

        assert_eq!(store.get::<TestData>("products_a"), Some(data("sofa", 1)));
    }

    #[test]
    fn test_get_missing_key_is_none_without_report() {
        let (store, _clock, reporter) = create_test_store();
        assert_eq!(store.get::<TestData>("missing"), None);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_expired_entry_is_not_returned_and_is_deleted() {
        let (store, clock, _reporter) = create_test_store();
        store.set("k", &data("a", 1), Some(Duration::from_millis(1000)));

        clock.advance(Duration::from_millis(999));
        assert!(store.get::<TestData>("k").is_some());

        clock.advance(Duration::from_millis(1));
        assert_eq!(store.get::<TestData>("k"), None);
        assert_eq!(store.stats().entry_count, 0, "stale entry should be pruned lazily");
    }

    #[test]
    fn test_zero_ttl_is_immediately_stale() {
        let (store, _clock, _reporter) = create_test_store();
        store.set("k", &1, Some(Duration::ZERO));
        assert_eq!(store.get::<i32>("k"), None);
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let (store, clock, _reporter) = create_test_store();
        store.set("k", &7, None);
        clock.advance(Duration::from_secs(60 * 60 * 24 * 365));
        assert_eq!(store.get::<i32>("k"), Some(7));
    }

    #[test]
    fn test_second_set_restarts_freshness() {
        let (store, clock, _reporter) = create_test_store();
        let ttl = Some(Duration::from_secs(10));
        store.set("k", &data("v", 1), ttl);
        clock.advance(Duration::from_secs(8));
        store.set("k", &data("v", 1), ttl);
        clock.advance(Duration::from_secs(8));

        assert_eq!(store.get::<TestData>("k"), Some(data("v", 1)));
    }

    #[test]
    fn test_remove_and_remove_missing() {
        let (store, _clock, reporter) = create_test_store();
        store.set("k", &1, None);
        store.remove("k");
        store.remove("k");
        assert_eq!(store.get::<i32>("k"), None);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_clear_pattern_is_selective() {
        let (store, _clock, _reporter) = create_test_store();
        store.set("products_a", &1, None);
        store.set("products_b", &2, None);
        store.set("customers_a", &3, None);

        assert_eq!(store.clear(Some("products")), 2);

        assert_eq!(store.get::<i32>("products_a"), None);
        assert_eq!(store.get::<i32>("products_b"), None);
        assert_eq!(store.get::<i32>("customers_a"), Some(3));
    }

    #[test]
    fn test_clear_without_pattern_removes_everything() {
        let (store, _clock, _reporter) = create_test_store();
        store.set("a", &1, None);
        store.set("b", &2, None);
        assert_eq!(store.clear(None), 2);
        assert_eq!(store.stats().entry_count, 0);
    }

    #[test]
    fn test_should_refresh_tracks_interval_not_ttl() {
        let (store, clock, _reporter) = create_test_store();
        let interval = Duration::from_secs(30);
        assert!(store.should_refresh("k", interval), "missing entry needs refresh");

        store.set("k", &1, Some(Duration::from_secs(3600)));
        assert!(!store.should_refresh("k", interval));

        clock.advance(Duration::from_secs(29));
        assert!(!store.should_refresh("k", interval));

        clock.advance(Duration::from_secs(1));
        assert!(store.should_refresh("k", interval));
        assert_eq!(store.get::<i32>("k"), Some(1), "entry itself is still fresh");
    }

    #[test]
    fn test_corrupted_entry_is_a_reported_miss() {
        let clock = ManualClock::starting_now();
        let reporter = Arc::new(RecordingReporter::new());
        let backend = MemoryStorage::new();
        backend.write("k", "{not json").unwrap();
        let store = CacheStore::new(backend)
            .with_clock(Arc::new(clock))
            .with_reporter(reporter.clone());

        assert_eq!(store.get::<i32>("k"), None);
        assert_eq!(reporter.kinds(), vec![CacheErrorKind::Corrupted]);
        assert_eq!(store.stats().entry_count, 0, "corrupted entry is removed");
    }

    #[test]
    fn test_type_mismatch_is_a_reported_miss() {
        let (store, _clock, reporter) = create_test_store();
        store.set("k", &"text", None);

        assert_eq!(store.get::<TestData>("k"), None);
        assert_eq!(reporter.kinds(), vec![CacheErrorKind::Decode]);
    }

    #[test]
    fn test_broken_storage_degrades_to_miss() {
        let reporter = Arc::new(RecordingReporter::new());
        let store = CacheStore::new(BrokenStorage).with_reporter(reporter.clone());

        assert!(!store.set("k", &1, None));
        assert_eq!(store.get::<i32>("k"), None);
        assert!(store.should_refresh("k", Duration::from_secs(1)));
        assert_eq!(store.clear(None), 0);
        assert_eq!(store.stats(), CacheStats::default());

        let kinds = reporter.kinds();
        assert!(kinds.contains(&CacheErrorKind::Write));
        assert!(kinds.contains(&CacheErrorKind::Read));
        assert!(kinds.contains(&CacheErrorKind::List));
    }

    #[test]
    fn test_unserializable_value_is_skipped() {
        use std::collections::HashMap;

        let (store, _clock, reporter) = create_test_store();
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys are not valid JSON object keys");

        assert!(!store.set("k", &map, None));
        assert_eq!(reporter.kinds(), vec![CacheErrorKind::Serialize]);
        assert_eq!(store.get::<i32>("k"), None);
    }

    #[test]
    fn test_stats_do_not_prune() {
        let (store, clock, _reporter) = create_test_store();
        store.set("old", &1, Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(20));
        store.set("new", &2, None);

        let stats = store.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.expired_count, 1);
        assert_eq!(stats.fresh_count(), 1);
        assert_eq!(stats.oldest_entry_age, Some(Duration::from_secs(20)));
        assert_eq!(stats.newest_entry_age, Some(Duration::ZERO));
        assert_eq!(stats.keys, vec!["new".to_string(), "old".to_string()]);
        assert!(stats.total_size_bytes > 0);

        assert_eq!(store.stats().entry_count, 2, "stats must not remove expired entries");
    }

    #[test]
    fn test_prune_expired_removes_only_stale() {
        let (store, clock, _reporter) = create_test_store();
        store.set("short", &1, Some(Duration::from_secs(1)));
        store.set("long", &2, Some(Duration::from_secs(100)));
        clock.advance(Duration::from_secs(5));

        assert_eq!(store.prune_expired(), 1);
        assert_eq!(store.stats().keys, vec!["long".to_string()]);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        {
            let store = CacheStore::open(temp_dir.path().to_path_buf()).unwrap();
            store.set("branches", &data("main", 1), Some(Duration::from_secs(3600)));
        }

        let reopened = CacheStore::open(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.get::<TestData>("branches"), Some(data("main", 1)));
    }

    #[test]
    fn test_entry_expires_at() {
        let (store, _clock, _reporter) = create_test_store();
        store.set("k", &1, Some(Duration::from_secs(90)));
        let entry = store.entry("k").unwrap();
        assert_eq!(entry.expires_at(), Some(entry.stored_at + chrono::Duration::seconds(90)));

        store.set("forever", &1, None);
        assert_eq!(store.entry("forever").unwrap().expires_at(), None);
    }
}
