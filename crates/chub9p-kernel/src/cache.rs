//! Resource cache with per-entry freshness.
//!
//! Entries live in a sharded map, so lookups on different keys never
//! contend. Filling an entry takes a per-key fetch lock: concurrent misses
//! on the same key collapse into one fetch, while fetches for different
//! keys proceed in parallel.
//!
//! Staleness never evicts. A stale entry is refreshed on its next access,
//! and if that refresh fails the old record is served instead.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use chub9p_types::{now_millis, ResourceKind, ResourceRecord};

use crate::fetch::{FetchError, FetchResult, ResourceFetcher};

type CacheKey = (ResourceKind, String);

#[derive(Debug, Clone)]
struct CacheEntry {
    record: Arc<ResourceRecord>,
    fetched_at: Instant,
}

/// Result of [`ResourceCache::get_or_fetch`].
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub record: Arc<ResourceRecord>,
    /// The refresh failed and this is the previously cached record.
    pub stale: bool,
}

/// Resident entry counts, for the control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub ttl: Duration,
    pub characters: usize,
    pub lorebooks: usize,
    pub sessions: usize,
}

/// A caller's claim on a key's fetch lock.
///
/// Dropping it (normally, or because the owning future was cancelled)
/// removes the lock from the table once nobody else holds or waits on it.
struct FetchSlot<'a> {
    locks: &'a DashMap<CacheKey, Arc<Mutex<()>>>,
    key: CacheKey,
    lock: Arc<Mutex<()>>,
}

impl Drop for FetchSlot<'_> {
    fn drop(&mut self) {
        // One reference in the table, one here.
        self.locks.remove_if(&self.key, |_, held| {
            Arc::ptr_eq(held, &self.lock) && Arc::strong_count(held) == 2
        });
    }
}

/// Shared cache of remote resources.
pub struct ResourceCache {
    fetcher: Arc<dyn ResourceFetcher>,
    entries: DashMap<CacheKey, CacheEntry>,
    fetch_locks: DashMap<CacheKey, Arc<Mutex<()>>>,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl ResourceCache {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            fetcher,
            entries: DashMap::new(),
            fetch_locks: DashMap::new(),
            ttl,
            fetch_timeout,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached record if fresh; otherwise fetch and store it.
    ///
    /// On fetch failure (including timeout) a stale entry is returned with
    /// `stale = true`; with no entry at all the fetch error propagates.
    pub async fn get_or_fetch(&self, kind: ResourceKind, id: &str) -> FetchResult<CacheHit> {
        let key = (kind, id.to_string());

        if let Some(record) = self.lookup_fresh(&key) {
            return Ok(CacheHit {
                record,
                stale: false,
            });
        }

        let slot = self.fetch_slot(&key);
        let _guard = slot.lock.lock().await;

        // Filled by another task while we waited for the lock.
        if let Some(record) = self.lookup_fresh(&key) {
            return Ok(CacheHit {
                record,
                stale: false,
            });
        }
        self.refresh(&key).await
    }

    /// Fetch now even if the entry is fresh.
    ///
    /// Same fallback rules as [`get_or_fetch`](Self::get_or_fetch): a failed
    /// refresh keeps and returns the previous record.
    pub async fn force_refresh(&self, kind: ResourceKind, id: &str) -> FetchResult<CacheHit> {
        let key = (kind, id.to_string());
        let slot = self.fetch_slot(&key);
        let _guard = slot.lock.lock().await;
        self.refresh(&key).await
    }

    /// Fetch unconditionally and store, falling back to stale on failure.
    async fn refresh(&self, key: &CacheKey) -> FetchResult<CacheHit> {
        let (kind, id) = (key.0, key.1.as_str());

        match self.fetch_bounded(kind, id).await {
            Ok(mut record) => {
                record.set_fetched_at(now_millis());
                let record = Arc::new(record);
                self.entries.insert(
                    key.clone(),
                    CacheEntry {
                        record: record.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                tracing::info!(%kind, id, "cached resource");
                Ok(CacheHit {
                    record,
                    stale: false,
                })
            }
            Err(e) => {
                let previous = self.entries.get(key).map(|entry| entry.record.clone());
                match previous {
                    Some(record) => {
                        tracing::warn!(%kind, id, error = %e, "refresh failed, serving stale");
                        Ok(CacheHit {
                            record,
                            stale: true,
                        })
                    }
                    None => {
                        tracing::debug!(%kind, id, error = %e, "fetch failed");
                        Err(e)
                    }
                }
            }
        }
    }

    async fn fetch_bounded(&self, kind: ResourceKind, id: &str) -> FetchResult<ResourceRecord> {
        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(kind, id)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        }
    }

    fn lookup_fresh(&self, key: &CacheKey) -> Option<Arc<ResourceRecord>> {
        let entry = self.entries.get(key)?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.record.clone())
    }

    fn fetch_slot(&self, key: &CacheKey) -> FetchSlot<'_> {
        let lock = self
            .fetch_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        FetchSlot {
            locks: &self.fetch_locks,
            key: key.clone(),
            lock,
        }
    }

    /// Cached record regardless of freshness. Never fetches.
    pub fn get(&self, kind: ResourceKind, id: &str) -> Option<Arc<ResourceRecord>> {
        self.entries
            .get(&(kind, id.to_string()))
            .map(|entry| entry.record.clone())
    }

    /// Whether an entry exists and is within its TTL.
    pub fn is_fresh(&self, kind: ResourceKind, id: &str) -> bool {
        self.lookup_fresh(&(kind, id.to_string())).is_some()
    }

    /// Ids currently resident for `kind`, sorted.
    ///
    /// This is what the cache has seen, not the remote catalog.
    pub fn list_ids(&self, kind: ResourceKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| entry.key().1.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop one entry. Returns true if it was resident.
    pub fn evict(&self, kind: ResourceKind, id: &str) -> bool {
        self.entries.remove(&(kind, id.to_string())).is_some()
    }

    /// Drop every entry, returning how many were resident.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            ttl: self.ttl,
            characters: 0,
            lorebooks: 0,
            sessions: 0,
        };
        for entry in self.entries.iter() {
            match entry.key().0 {
                ResourceKind::Character => stats.characters += 1,
                ResourceKind::Lorebook => stats.lorebooks += 1,
                ResourceKind::Session => stats.sessions += 1,
            }
        }
        stats
    }
}
