//! Key-value stores the cache regions sit on.
//!
//! Backends deal in opaque bytes; expiry and payload encoding live in
//! [`crate::cache`]. Every call returns [`BackendError`] on failure and the
//! cache layer decides what to do with it. An implementation that talks to a
//! remote store must bound each call with a short I/O timeout.

use crate::config::BackendConfig;
use crate::error::BackendError;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Store `value`, replacing whatever was there.
    fn set(&self, key: &str, value: Vec<u8>) -> BackendResult<()>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> BackendResult<bool>;

    /// Delete `key` only if it still holds `expected`. Used for lazy expiry
    /// so a concurrent overwrite is never thrown away.
    fn delete_if_eq(&self, key: &str, expected: &[u8]) -> BackendResult<bool>;

    /// Delete every key starting with `prefix`; returns how many went.
    fn delete_prefix(&self, prefix: &str) -> BackendResult<usize>;

    fn ping(&self) -> BackendResult<()>;
}

/// Sharded in-process map. Operations on different keys rarely contend.
#[derive(Default)]
pub struct MemoryBackend {
    map: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.map.len() }

    pub fn is_empty(&self) -> bool { self.map.is_empty() }
}

impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str { "memory" }

    fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.map.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: Vec<u8>) -> BackendResult<()> {
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> BackendResult<bool> {
        Ok(self.map.remove(key).is_some())
    }

    fn delete_if_eq(&self, key: &str, expected: &[u8]) -> BackendResult<bool> {
        Ok(self.map.remove_if(key, |_, v| v.as_slice() == expected).is_some())
    }

    fn delete_prefix(&self, prefix: &str) -> BackendResult<usize> {
        let before = self.map.len();
        self.map.retain(|k, _| !k.starts_with(prefix));
        Ok(before.saturating_sub(self.map.len()))
    }

    fn ping(&self) -> BackendResult<()> { Ok(()) }
}

/// Embedded on-disk store. Entries survive a restart but the index does
/// not; `SearchEngine` clears every region when it is built.
pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> BackendResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// A throwaway database removed when dropped.
    pub fn temporary() -> BackendResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl CacheBackend for SledBackend {
    fn name(&self) -> &'static str { "sled" }

    fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: Vec<u8>) -> BackendResult<()> {
        self.db.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> BackendResult<bool> {
        Ok(self.db.remove(key.as_bytes())?.is_some())
    }

    fn delete_if_eq(&self, key: &str, expected: &[u8]) -> BackendResult<bool> {
        let swapped = self.db.compare_and_swap(key.as_bytes(), Some(expected), None as Option<&[u8]>)?;
        Ok(swapped.is_ok())
    }

    fn delete_prefix(&self, prefix: &str) -> BackendResult<usize> {
        let mut removed = 0;
        for item in self.db.scan_prefix(prefix.as_bytes()).keys() {
            let key = item?;
            if self.db.remove(key)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn ping(&self) -> BackendResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Stand-in used when the configured backend could not be opened. Every
/// call fails, so the cache degrades to all misses.
pub struct DisconnectedBackend {
    reason: String,
}

impl DisconnectedBackend {
    pub fn new<S: Into<String>>(reason: S) -> Self { Self { reason: reason.into() } }

    fn err<T>(&self) -> BackendResult<T> { Err(BackendError::Unavailable(self.reason.clone())) }
}

impl CacheBackend for DisconnectedBackend {
    fn name(&self) -> &'static str { "disconnected" }
    fn get(&self, _key: &str) -> BackendResult<Option<Vec<u8>>> { self.err() }
    fn set(&self, _key: &str, _value: Vec<u8>) -> BackendResult<()> { self.err() }
    fn delete(&self, _key: &str) -> BackendResult<bool> { self.err() }
    fn delete_if_eq(&self, _key: &str, _expected: &[u8]) -> BackendResult<bool> { self.err() }
    fn delete_prefix(&self, _prefix: &str) -> BackendResult<usize> { self.err() }
    fn ping(&self) -> BackendResult<()> { self.err() }
}

/// Open the configured backend. Failure to open is not fatal: the error is
/// logged and a [`DisconnectedBackend`] is returned in its place.
pub fn open_backend(config: &BackendConfig) -> Arc<dyn CacheBackend> {
    let opened = match config {
        BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new()) as Arc<dyn CacheBackend>),
        BackendConfig::Sled { path: Some(path) } => {
            SledBackend::open(path).map(|b| Arc::new(b) as Arc<dyn CacheBackend>)
        }
        BackendConfig::Sled { path: None } => SledBackend::temporary().map(|b| Arc::new(b) as Arc<dyn CacheBackend>),
    };
    match opened {
        Ok(backend) => {
            tracing::info!(backend = backend.name(), "cache backend ready");
            backend
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to open cache backend, caching will miss");
            Arc::new(DisconnectedBackend::new(e.to_string()))
        }
    }
}
