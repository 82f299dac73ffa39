//! Memoization of schema parsing, path resolution and physical reads.
//!
//! Entries are validated with a modification-time [`Stamp`] rather than by content: two
//! different file contents that share an mtime are not detected. Entries have no TTL and live
//! until [`Cache::invalidate_all`] is called or the stamp changes.
//!
//! Concurrent callers racing on the same key are never blocked on each other's computation.
//! Both compute, and the last writer wins; the memoized operations are idempotent.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Instant, SystemTime};

use crate::manifest::Manifest;
use crate::paths::PathResolution;
use crate::schema::SchemaDocument;
use crate::types::RawDataset;

/// Modification time of `path`, or `None` if it cannot be stat'ed.
pub fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Freshness proxy for a cache entry: the modification times of the files it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Stamp(Vec<Option<SystemTime>>);

impl Stamp {
    pub fn of(times: impl IntoIterator<Item = Option<SystemTime>>) -> Self {
        Self(times.into_iter().collect())
    }
}

/// A memoized value plus the stamp it was computed under.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub stamp: Stamp,
    pub value: V,
    pub created_at: Instant,
}

/// Hit/miss counters for one [`MemoTable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Thread-safe memo map keyed by `K`, validated by [`Stamp`].
pub struct MemoTable<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> MemoTable<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached value if `is_fresh` accepts the stored entry.
    pub fn get_if(&self, key: &K, is_fresh: impl FnOnce(&CacheEntry<V>) -> bool) -> Option<V> {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let hit = guard
            .get(key)
            .filter(|entry| is_fresh(entry))
            .map(|entry| entry.value.clone());
        drop(guard);

        match hit {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(cache = self.name, key = ?key, "cache hit");
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(cache = self.name, key = ?key, "cache miss");
                None
            }
        }
    }

    /// Return the cached value if it was stored under exactly `stamp`.
    pub fn get(&self, key: &K, stamp: &Stamp) -> Option<V> {
        self.get_if(key, |entry| &entry.stamp == stamp)
    }

    /// Store `value` under `key`, replacing any older entry.
    pub fn insert(&self, key: K, stamp: Stamp, value: V) {
        let entry = CacheEntry {
            stamp,
            value,
            created_at: Instant::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }

    /// Return the fresh cached value or compute, store and return a new one.
    ///
    /// The lock is not held while `compute` runs. Errors are returned and not cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        stamp: Stamp,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(v) = self.get(&key, &stamp) {
            return Ok(v);
        }
        let value = compute()?;
        self.insert(key, stamp, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

impl<K, V> fmt::Debug for MemoTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoTable")
            .field("name", &self.name)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

/// Key for a path resolution: every input that can change the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub template: String,
    pub version: String,
    pub fallback: Option<String>,
    pub base_dir: PathBuf,
    pub allow_absolute_paths: bool,
}

/// Key for a physical read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadKey {
    pub path: PathBuf,
    /// Format/sheet/projection parameters, rendered to a stable string.
    pub params: String,
}

/// Process-wide memo store, constructed once and injected where needed.
#[derive(Debug)]
pub struct Cache {
    schemas: MemoTable<PathBuf, Arc<SchemaDocument>>,
    manifests: MemoTable<PathBuf, Arc<Manifest>>,
    resolutions: MemoTable<ResolutionKey, PathResolution>,
    reads: MemoTable<ReadKey, Arc<RawDataset>>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self {
            schemas: MemoTable::new("schema"),
            manifests: MemoTable::new("manifest"),
            resolutions: MemoTable::new("resolution"),
            reads: MemoTable::new("read"),
        }
    }

    /// Parsed schema documents keyed by path.
    pub fn schemas(&self) -> &MemoTable<PathBuf, Arc<SchemaDocument>> {
        &self.schemas
    }

    /// Parsed manifests keyed by path.
    pub fn manifests(&self) -> &MemoTable<PathBuf, Arc<Manifest>> {
        &self.manifests
    }

    /// Path resolutions keyed by template, version and directory.
    pub fn resolutions(&self) -> &MemoTable<ResolutionKey, PathResolution> {
        &self.resolutions
    }

    /// Raw tables keyed by path and read parameters.
    pub fn reads(&self) -> &MemoTable<ReadKey, Arc<RawDataset>> {
        &self.reads
    }

    /// Drop every memoized value.
    pub fn invalidate_all(&self) {
        self.schemas.clear();
        self.manifests.clear();
        self.resolutions.clear();
        self.reads.clear();
        tracing::info!("cache invalidated");
    }
}
