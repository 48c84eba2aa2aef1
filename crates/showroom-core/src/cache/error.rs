//! Storage failures the cache swallows, and where they are reported.
//!
//! None of these reach callers of the store: reads degrade to a miss and
//! writes are skipped. They are handed to an `ErrorReporter` instead.

use std::io;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read cache entry {key}: {source}")]
    StorageRead {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write cache entry {key}: {source}")]
    StorageWrite {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove cache entry {key}: {source}")]
    StorageRemove {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to list cache entries: {0}")]
    StorageList(#[source] io::Error),

    #[error("Failed to serialize value for {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corrupted cache entry {key}: {source}")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cached value for {key} does not match the requested type: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Coarse classification of a `CacheError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheErrorKind {
    Read,
    Write,
    Remove,
    List,
    Serialize,
    Corrupted,
    Decode,
}

impl CacheError {
    pub fn kind(&self) -> CacheErrorKind {
        match self {
            CacheError::StorageRead { .. } => CacheErrorKind::Read,
            CacheError::StorageWrite { .. } => CacheErrorKind::Write,
            CacheError::StorageRemove { .. } => CacheErrorKind::Remove,
            CacheError::StorageList(_) => CacheErrorKind::List,
            CacheError::Serialize { .. } => CacheErrorKind::Serialize,
            CacheError::Corrupted { .. } => CacheErrorKind::Corrupted,
            CacheError::Decode { .. } => CacheErrorKind::Decode,
        }
    }
}

/// Receives every storage failure the store degrades around.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &CacheError);
}

/// Default reporter: one structured `warn!` event per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &CacheError) {
        warn!(kind = ?error.kind(), error = %error, "Cache storage degraded");
    }
}

/// Reporter that keeps what it was given, for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(CacheErrorKind, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(CacheErrorKind, String)> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn kinds(&self) -> Vec<CacheErrorKind> {
        self.reports().into_iter().map(|(kind, _)| kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &CacheError) {
        TracingReporter.report(error);
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((error.kind(), error.to_string()));
    }
}
