//! Local caching module for backend data.
//!
//! `CacheStore` keeps serialized values with a per-entry TTL in a storage
//! medium (a cache directory by default). `CacheManager` is the shared
//! handle the rest of the crate uses, and `CacheAdmin` adds statistics and
//! bulk invalidation on top of it.
//!
//! Storage failures are never surfaced to callers. Reads degrade to a miss,
//! writes are skipped, and the failure goes to an `ErrorReporter`.

pub mod admin;
pub mod clock;
pub mod error;
pub mod inflight;
pub mod manager;
pub mod storage;
pub mod store;

pub use admin::CacheAdmin;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, CacheErrorKind, ErrorReporter, RecordingReporter, TracingReporter};
pub use manager::CacheManager;
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use store::{CacheStats, CacheStore, StoredEntry};
