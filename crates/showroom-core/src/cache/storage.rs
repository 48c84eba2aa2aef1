//! Storage media the cache store persists entries into.
//!
//! A medium maps string keys to serialized entries. It knows nothing about
//! expiry; that lives in `CacheStore`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Extension of entry files written by `FileStorage`.
const ENTRY_EXTENSION: &str = "json";

/// Extension of in-progress writes; never listed as keys.
const TEMP_EXTENSION: &str = "tmp";

/// Prefix of every entry file name, so even the empty key gets a visible,
/// non-empty name.
const ENTRY_PREFIX: &str = "k_";

pub trait StorageBackend: Send + Sync {
    /// Contents stored under `key`, or `None` if nothing is.
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    /// Replace whatever is stored under `key`.
    fn write(&self, key: &str, contents: &str) -> io::Result<()>;

    /// Delete `key`. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> io::Result<()>;

    fn keys(&self) -> io::Result<Vec<String>>;
}

// ============================================================================
// File storage
// ============================================================================

/// One JSON file per key inside a cache directory.
///
/// Keys are escaped into file names (`products_b1` becomes
/// `k_products_b1.json`; uppercase letters and other bytes become `%XX`), so
/// any key round-trips through `keys()` and keys differing only by case stay
/// distinct on case-insensitive filesystems.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    write_seq: AtomicU64,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the entry for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            ENTRY_PREFIX,
            escape_key(key),
            ENTRY_EXTENSION
        ))
    }
}

impl StorageBackend for FileStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.entry_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write aside and rename so readers never see a partial entry.
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp = self.dir.join(format!(
            ".{}.{}.{}.{}",
            escape_key(key),
            std::process::id(),
            seq,
            TEMP_EXTENSION
        ));
        fs::write(&temp, contents)?;
        if let Err(e) = fs::rename(&temp, self.entry_path(key)) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Some(stem) = name
                .strip_prefix(ENTRY_PREFIX)
                .and_then(|rest| rest.strip_suffix(&format!(".{}", ENTRY_EXTENSION)))
            else {
                continue;
            };
            if let Some(key) = unescape_key(stem) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn unescape_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

// ============================================================================
// Memory storage
// ============================================================================

/// Process-local storage; contents are gone when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (FileStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).expect("storage");
        (storage, temp_dir)
    }

    #[test]
    fn test_escape_roundtrip_for_unusual_keys() {
        for key in ["products_b1", "a/b c", "ключ", "100%", ""] {
            assert_eq!(unescape_key(&escape_key(key)).as_deref(), Some(key));
        }
        assert_eq!(escape_key("products_branch-1"), "products_branch-1");
        assert_eq!(escape_key("a/b"), "a%2Fb");
    }

    #[test]
    fn test_keys_differing_by_case_get_distinct_files() {
        assert_eq!(escape_key("B1"), "%421");
        for (upper, lower) in [("A", "a"), ("products_B1", "products_b1")] {
            assert_ne!(
                escape_key(upper).to_lowercase(),
                escape_key(lower).to_lowercase()
            );
        }

        let (storage, _temp_dir) = create_test_storage();
        storage.write("products_B1", "upper").unwrap();
        storage.write("products_b1", "lower").unwrap();

        assert_eq!(storage.read("products_B1").unwrap().as_deref(), Some("upper"));
        assert_eq!(storage.read("products_b1").unwrap().as_deref(), Some("lower"));
        assert_eq!(storage.keys().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_key_is_listed_and_removable() {
        let (storage, temp_dir) = create_test_storage();
        storage.write("", "1").unwrap();

        assert!(temp_dir.path().join("k_.json").exists());
        assert_eq!(storage.keys().unwrap(), vec![String::new()]);

        storage.remove("").unwrap();
        assert_eq!(storage.read("").unwrap(), None);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_unescape_rejects_malformed_names() {
        assert_eq!(unescape_key("bad%2"), None);
        assert_eq!(unescape_key("bad%zz"), None);
    }

    #[test]
    fn test_file_write_then_read() {
        let (storage, temp_dir) = create_test_storage();

        storage.write("customers", "{\"n\":1}").unwrap();

        assert!(temp_dir.path().join("k_customers.json").exists());
        assert_eq!(storage.entry_path("customers"), temp_dir.path().join("k_customers.json"));
        assert_eq!(storage.read("customers").unwrap().as_deref(), Some("{\"n\":1}"));
    }

    #[test]
    fn test_file_read_missing_is_none() {
        let (storage, _temp_dir) = create_test_storage();
        assert_eq!(storage.read("nope").unwrap(), None);
    }

    #[test]
    fn test_file_remove_missing_is_ok() {
        let (storage, _temp_dir) = create_test_storage();
        storage.remove("nope").unwrap();
    }

    #[test]
    fn test_file_keys_skip_foreign_and_temp_files() {
        let (storage, temp_dir) = create_test_storage();
        storage.write("b key", "1").unwrap();
        storage.write("a", "2").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("legacy.json"), "x").unwrap();
        fs::write(temp_dir.path().join(".a.1.2.tmp"), "x").unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["a".to_string(), "b key".to_string()]);
    }

    #[test]
    fn test_file_write_recreates_missing_directory() {
        let (storage, temp_dir) = create_test_storage();
        fs::remove_dir_all(temp_dir.path()).unwrap();

        storage.write("k", "v").unwrap();

        assert_eq!(storage.read("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_memory_storage_overwrites() {
        let storage = MemoryStorage::new();
        storage.write("k", "1").unwrap();
        storage.write("k", "2").unwrap();
        assert_eq!(storage.read("k").unwrap().as_deref(), Some("2"));
        assert_eq!(storage.keys().unwrap(), vec!["k".to_string()]);
        storage.remove("k").unwrap();
        assert_eq!(storage.read("k").unwrap(), None);
    }
}
