/*!
 * Time-to-live content caching.
 *
 * This module provides a small persistent key/value store used to avoid
 * redundant provider and image-search calls. Each instance owns one JSON
 * document on disk which is rewritten atomically on every change.
 */

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::errors::GenerationError;

/// Version tag written into every persisted document
pub const CACHE_FORMAT_VERSION: &str = "1.0";

/// File name of the term-list cache inside the cache directory
pub const TERMS_CACHE_FILE: &str = "word_pairs_cache.json";

/// File name of the image URL cache inside the cache directory
pub const IMAGE_CACHE_FILE: &str = "image_cache.json";

/// One cached payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// SHA-256 hex digest of the normalized lookup key
    pub key: String,
    /// Cached value
    pub payload: T,
    /// When the entry was written
    pub written_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// An entry is valid while `now < written_at + ttl`
    pub fn is_valid(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.written_at).to_std() {
            Ok(age) => age < ttl,
            // written in the future (clock skew)
            Err(_) => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CacheDocument<T> {
    version: String,
    created_at: DateTime<Utc>,
    entries: Vec<CacheEntry<T>>,
}

#[derive(Serialize)]
struct CacheDocumentRef<'a, T> {
    version: &'a str,
    created_at: DateTime<Utc>,
    entries: Vec<&'a CacheEntry<T>>,
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
    pub bytes_on_disk: u64,
    pub hits: usize,
    pub misses: usize,
}

struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    created_at: DateTime<Utc>,
}

/// Persistent TTL cache
///
/// `get` never touches the disk; `put`, `purge_expired` and `clear` rewrite
/// the backing document while holding the index lock.
pub struct ContentCache<T> {
    state: Mutex<CacheState<T>>,
    path: Option<PathBuf>,
    ttl: Duration,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<T> std::fmt::Debug for ContentCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Hash a lookup key after trimming and lower-casing it
pub fn cache_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl<T> ContentCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Open a cache backed by `path`, loading any existing document
    ///
    /// A missing file yields an empty cache. A corrupt or unreadable file is
    /// logged and also yields an empty cache.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let path = path.into();
        let (entries, created_at) = match Self::load(&path) {
            Ok(Some(document)) => {
                let entries = document
                    .entries
                    .into_iter()
                    .map(|entry| (entry.key.clone(), entry))
                    .collect::<HashMap<_, _>>();
                debug!("Loaded {} cache entries from {:?}", entries.len(), path);
                (entries, document.created_at)
            }
            Ok(None) => (HashMap::new(), Utc::now()),
            Err(e) => {
                warn!("Ignoring unreadable cache file {:?}: {}", path, e);
                (HashMap::new(), Utc::now())
            }
        };

        Self {
            state: Mutex::new(CacheState { entries, created_at }),
            path: Some(path),
            ttl,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Create a cache that is never persisted
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                created_at: Utc::now(),
            }),
            path: None,
            ttl,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn load(path: &Path) -> anyhow::Result<Option<CacheDocument<T>>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let document: CacheDocument<T> = serde_json::from_str(&content)?;
        if document.version != CACHE_FORMAT_VERSION {
            warn!(
                "Cache file {:?} has version {}, expected {}",
                path, document.version, CACHE_FORMAT_VERSION
            );
        }
        Ok(Some(document))
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<T> {
        let hashed = cache_key(key);
        let mut state = self.state.lock();

        let valid = state
            .entries
            .get(&hashed)
            .map(|entry| entry.is_valid(self.ttl, Utc::now()));

        match valid {
            Some(true) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for '{}'", truncate_text(key, 30));
                state.entries.get(&hashed).map(|entry| entry.payload.clone())
            }
            Some(false) => {
                state.entries.remove(&hashed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache entry for '{}' expired", truncate_text(key, 30));
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss for '{}'", truncate_text(key, 30));
                None
            }
        }
    }

    /// Store a value and persist the whole table
    pub fn put(&self, key: &str, value: T) -> Result<(), GenerationError> {
        self.insert_at(key, value, Utc::now())
    }

    pub(crate) fn insert_at(&self, key: &str, value: T, written_at: DateTime<Utc>) -> Result<(), GenerationError> {
        let hashed = cache_key(key);
        let mut state = self.state.lock();
        state.entries.insert(
            hashed.clone(),
            CacheEntry {
                key: hashed,
                payload: value,
                written_at,
            },
        );
        debug!("Cached value for '{}'", truncate_text(key, 30));
        self.persist(&state)
    }

    /// Evict every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize, GenerationError> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_valid(self.ttl, now));
        let removed = before - state.entries.len();

        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
            self.persist(&state)?;
        }
        Ok(removed)
    }

    /// Drop all entries and delete the backing file
    pub fn clear(&self) -> Result<usize, GenerationError> {
        let mut state = self.state.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.created_at = Utc::now();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);

        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path).map_err(|e| GenerationError::file(path, e))?;
            }
        }
        debug!("Content cache cleared ({} entries)", removed);
        Ok(removed)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let state = self.state.lock();
        let valid = state
            .entries
            .values()
            .filter(|entry| entry.is_valid(self.ttl, now))
            .count();
        let bytes_on_disk = self
            .path
            .as_ref()
            .and_then(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);

        CacheStats {
            total: state.entries.len(),
            valid,
            expired: state.entries.len() - valid,
            bytes_on_disk,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Get the number of entries in the cache, expired ones included
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Path of the backing document, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn persist(&self, state: &CacheState<T>) -> Result<(), GenerationError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut entries: Vec<&CacheEntry<T>> = state.entries.values().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let document = CacheDocumentRef {
            version: CACHE_FORMAT_VERSION,
            created_at: state.created_at,
            entries,
        };
        let bytes = serde_json::to_vec_pretty(&document).map_err(|e| GenerationError::file(path, e))?;

        write_atomic(path, &bytes).map_err(|e| {
            error!("Failed to persist cache {:?}: {}", path, e);
            GenerationError::file(path, e)
        })
    }
}

/// Write bytes to a sibling temp file, then rename it over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Truncate text to a maximum number of characters with ellipsis
fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}
