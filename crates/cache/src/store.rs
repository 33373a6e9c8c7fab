//! Storage backends for cached provider statuses
//!
//! Entries are CBOR-encoded [`CachedProviderStatus`] records. Reads never
//! fail: a missing or unreadable entry is a cache miss.

use crate::{CachedProviderStatus, Error, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Subdirectory of the project's garden dir holding provider statuses.
pub const PROVIDER_STATUS_DIR: &str = "cache/provider-statuses";

/// Persistent key/value storage for provider statuses.
pub trait ProviderStatusStore: Send + Sync + Debug {
    /// Load an entry; `None` when absent or unreadable.
    fn get(&self, key: &str) -> Option<CachedProviderStatus>;

    /// Persist an entry, replacing any previous one.
    fn set(&self, key: &str, entry: &CachedProviderStatus) -> Result<()>;

    /// File backing `key`, for stores that keep entries on disk.
    fn location(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

/// Cache key for a provider in an environment.
#[must_use]
pub fn provider_status_key(provider: &str, environment: &str) -> String {
    format!("{provider}.{environment}")
}

/// Encode an entry as CBOR.
pub fn encode_entry(entry: &CachedProviderStatus) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(entry, &mut buf)
        .map_err(|e| Error::serialization(format!("Failed to encode provider status: {e}")))?;
    Ok(buf)
}

/// Decode a CBOR entry.
pub fn decode_entry(key: &str, bytes: &[u8]) -> Result<CachedProviderStatus> {
    ciborium::from_reader(bytes).map_err(|e| Error::corrupt(key, e.to_string()))
}

/// Filesystem store: one `<key>.cbor` file per entry.
#[derive(Debug, Clone)]
pub struct FsStatusStore {
    root: PathBuf,
}

impl FsStatusStore {
    /// Store rooted at an explicit directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under `<garden_dir>/cache/provider-statuses`.
    #[must_use]
    pub fn for_garden_dir(garden_dir: &Path) -> Self {
        Self::new(garden_dir.join(PROVIDER_STATUS_DIR))
    }

    /// Directory holding the entries.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `key`. Path separators in the key are escaped so every
    /// entry stays directly under [`FsStatusStore::root`].
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.cbor", file_stem(key)))
    }

    fn read(&self, key: &str) -> Result<Option<CachedProviderStatus>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(e, &path, "read")),
        };
        decode_entry(key, &bytes).map(Some)
    }
}

impl ProviderStatusStore for FsStatusStore {
    fn get(&self, key: &str) -> Option<CachedProviderStatus> {
        match self.read(key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable provider status cache entry");
                None
            }
        }
    }

    fn set(&self, key: &str, entry: &CachedProviderStatus) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| Error::io(e, &self.root, "create_dir_all"))?;

        let bytes = encode_entry(entry)?;
        let path = self.path_for(key);
        // Write then rename so concurrent readers never see a partial entry.
        let tmp = self.root.join(format!(
            ".{}.{}.{}.tmp",
            file_stem(key),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, &bytes).map_err(|e| Error::io(e, &tmp, "write"))?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(e, &path, "rename"))?;

        tracing::debug!(key, path = %path.display(), "Stored provider status");
        Ok(())
    }

    fn location(&self, key: &str) -> Option<PathBuf> {
        Some(self.path_for(key))
    }
}

fn file_stem(key: &str) -> String {
    key.replace(['/', '\\'], "_")
}

/// In-memory store, used when no garden dir is available and in tests.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStatusStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProviderStatusStore for MemoryStatusStore {
    fn get(&self, key: &str) -> Option<CachedProviderStatus> {
        let bytes = self.entries.lock().ok()?.get(key).cloned()?;
        match decode_entry(key, &bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable provider status cache entry");
                None
            }
        }
    }

    fn set(&self, key: &str, entry: &CachedProviderStatus) -> Result<()> {
        let bytes = encode_entry(entry)?;
        self.entries
            .lock()
            .map_err(|_| Error::serialization("provider status store lock poisoned"))?
            .insert(key.to_string(), bytes);
        Ok(())
    }
}
