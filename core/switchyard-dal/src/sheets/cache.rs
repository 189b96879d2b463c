//! TTL snapshot cache with single-flight fetches.
//!
//! A read first joins any fetch already in flight for the same key, then
//! checks the TTL cache, and only on a miss starts a new upstream fetch. At
//! most one fetch per key is live at a time; every concurrent reader shares
//! its result.
//!
//! Invalidation is by key prefix and also drops matching in-flight fetches.
//! Each fetch carries a ticket; it only populates the cache while its pending
//! slot still holds that ticket. A fetch that started before an invalidation
//! still answers the callers already waiting on it, but does not populate the
//! cache, so the next read after a write always goes upstream.

use crate::error::{DalError, DalResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<T>, DalError>>>;

struct CacheEntry<T> {
    value: Arc<T>,
    expires_at: Instant,
}

struct PendingFetch<T> {
    ticket: u64,
    fetch: SharedFetch<T>,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    pending: HashMap<String, PendingFetch<T>>,
    next_ticket: u64,
}

/// Counters describing how reads were served.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Shared, cloneable snapshot cache.
pub struct SnapshotCache<T> {
    ttl: Duration,
    inner: Arc<Mutex<Inner<T>>>,
    stats: Arc<CacheStats>,
}

impl<T> Clone for SnapshotCache<T> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            inner: Arc::clone(&self.inner),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T: Send + Sync + 'static> SnapshotCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                pending: HashMap::new(),
                next_ticket: 0,
            })),
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value for `key`, joining or starting a fetch when
    /// needed.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> DalResult<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DalResult<T>> + Send + 'static,
    {
        let shared = {
            let mut inner = self.lock();
            if let Some(pending) = inner.pending.get(key) {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key, "joining in-flight fetch");
                pending.fetch.clone()
            } else {
                let now = Instant::now();
                match inner.entries.get(key) {
                    Some(entry) if entry.expires_at > now => {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        debug!(key, "cache hit");
                        return Ok(Arc::clone(&entry.value));
                    }
                    Some(_) => {
                        inner.entries.remove(key);
                    }
                    None => {}
                }
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache miss, fetching");
                let ticket = inner.next_ticket;
                inner.next_ticket += 1;
                let shared = self.start_fetch(key, ticket, fetch());
                inner.pending.insert(
                    key.to_string(),
                    PendingFetch {
                        ticket,
                        fetch: shared.clone(),
                    },
                );
                shared
            }
        };
        shared.await
    }

    fn start_fetch<Fut>(&self, key: &str, ticket: u64, fetch: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = DalResult<T>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let ttl = self.ttl;
        let key = key.to_string();
        async move {
            let result = fetch.await.map(Arc::new);
            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Gone or replaced means an invalidation ran while we were fetching.
            let current = guard.pending.get(&key).is_some_and(|p| p.ticket == ticket);
            if current {
                guard.pending.remove(&key);
            }
            if let Ok(value) = &result {
                if current {
                    guard.entries.insert(
                        key,
                        CacheEntry {
                            value: Arc::clone(value),
                            expires_at: Instant::now() + ttl,
                        },
                    );
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Drops every entry and in-flight fetch whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut inner = self.lock();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        inner.pending.retain(|key, _| !key.starts_with(prefix));
        debug!(prefix, "cache invalidated");
    }

    /// Drops everything.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.pending.clear();
    }

    /// Number of live (possibly expired) entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a fetch is in flight for `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().pending.contains_key(key)
    }
}
