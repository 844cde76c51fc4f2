//! In-memory cache of remote binary objects.
//!
//! Entries are kept in least-recently-used order and bounded by an entry
//! count and an optional cumulative byte cost. Concurrent misses on the same
//! key share one fetch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::CacheConfig;
use crate::error::FetchError;

/// Source of raw object bytes, usually the network.
#[async_trait]
pub trait BinarySource: Send + Sync {
    async fn fetch_binary(&self, url: &Url) -> Result<Bytes, FetchError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub evictions: u64,
}

type PendingFetch = Shared<BoxFuture<'static, Option<Bytes>>>;

struct CacheEntry {
    object: Bytes,
    cost: usize,
}

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    total_cost: usize,
    in_flight: HashMap<String, PendingFetch>,
    stats: CacheStats,
}

impl CacheState {
    /// Stores an entry and evicts until both limits hold again. Returns
    /// `false` when the object alone is over the cost budget.
    fn insert(&mut self, key: String, object: Bytes, cost: usize, limits: &CacheConfig) -> bool {
        if limits.total_cost_limit.is_some_and(|limit| cost > limit) {
            debug!(key = %key, cost, "object exceeds cache budget, not stored");
            if let Some(stale) = self.entries.pop(&key) {
                self.total_cost -= stale.cost;
            }
            return false;
        }

        if let Some(replaced) = self.entries.put(key, CacheEntry { object, cost }) {
            self.total_cost -= replaced.cost;
        }
        self.total_cost += cost;
        self.evict(limits);
        true
    }

    fn evict(&mut self, limits: &CacheConfig) {
        loop {
            let over_count = limits.count_limit > 0 && self.entries.len() > limits.count_limit;
            let over_cost = limits
                .total_cost_limit
                .is_some_and(|limit| self.total_cost > limit);
            if !over_count && !over_cost {
                break;
            }
            match self.entries.pop_lru() {
                Some((key, entry)) => {
                    self.total_cost -= entry.cost;
                    self.stats.evictions += 1;
                    debug!(key = %key, cost = entry.cost, "evicted cache entry");
                }
                None => break,
            }
        }
    }
}

/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct RemoteObjectCache {
    state: Arc<Mutex<CacheState>>,
    source: Arc<dyn BinarySource>,
    limits: CacheConfig,
}

impl RemoteObjectCache {
    pub fn new(source: Arc<dyn BinarySource>, limits: CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                total_cost: 0,
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
            })),
            source,
            limits,
        }
    }

    pub fn limits(&self) -> &CacheConfig {
        &self.limits
    }

    /// Returns the object for `key`, fetching it on a miss.
    ///
    /// Keys inserted with [`put`](Self::put) may be any string; a miss on a
    /// key that is not a valid URL yields `None` without fetching, as does a
    /// failed fetch or an empty payload.
    ///
    /// Every caller missing on a key while its fetch is outstanding awaits
    /// that same fetch. The fetch runs as its own task, so it still fills the
    /// cache if all callers go away. Must be called within a Tokio runtime.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let pending = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if let Some(object) = state.entries.get(key).map(|entry| entry.object.clone()) {
                state.stats.hits += 1;
                return Some(object);
            }
            state.stats.misses += 1;

            let url = match Url::parse(key) {
                Ok(url) => url,
                Err(err) => {
                    warn!(key, error = %err, "malformed cache key");
                    return None;
                }
            };

            // a completed future still registered means its task died
            let outstanding = state
                .in_flight
                .get(key)
                .filter(|pending| pending.peek().is_none())
                .cloned();
            match outstanding {
                Some(pending) => pending,
                None => {
                    state.stats.fetches += 1;
                    let pending = self.spawn_fetch(key.to_owned(), url);
                    state.in_flight.insert(key.to_owned(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Looks up a resident object without fetching.
    pub async fn cached(&self, key: &str) -> Option<Bytes> {
        let mut state = self.state.lock().await;
        state.entries.get(key).map(|entry| entry.object.clone())
    }

    /// Inserts or replaces an entry directly. Returns `false` if the object
    /// was larger than the whole cost budget and therefore not kept.
    pub async fn put(&self, key: impl Into<String>, object: Bytes, cost: usize) -> bool {
        let mut state = self.state.lock().await;
        state.insert(key.into(), object, cost, &self.limits)
    }

    pub async fn remove(&self, key: &str) -> Option<Bytes> {
        let mut state = self.state.lock().await;
        let entry = state.entries.pop(key)?;
        state.total_cost -= entry.cost;
        Some(entry.object)
    }

    /// Drops every resident entry, e.g. under memory pressure. Outstanding
    /// fetches are unaffected.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.total_cost = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.entries.contains(key)
    }

    pub async fn total_cost(&self) -> usize {
        self.state.lock().await.total_cost
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats
    }

    fn spawn_fetch(&self, key: String, url: Url) -> PendingFetch {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let fetched = match cache.source.fetch_binary(&url).await {
                Ok(object) if object.is_empty() => {
                    warn!(key = %key, error = %FetchError::EmptyPayload, "discarding fetched object");
                    None
                }
                Ok(object) => Some(object),
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to fetch object");
                    None
                }
            };

            let mut state = cache.state.lock().await;
            state.in_flight.remove(&key);
            // an object put while the fetch ran wins over the fetched one
            if let Some(resident) = state.entries.get(&key) {
                debug!(key = %key, "keeping object stored during fetch");
                return Some(resident.object.clone());
            }
            if let Some(object) = &fetched {
                let cost = object.len();
                state.insert(key, object.clone(), cost, &cache.limits);
            }
            fetched
        });

        async move { task.await.ok().flatten() }.boxed().shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> CacheState {
        CacheState {
            entries: LruCache::unbounded(),
            total_cost: 0,
            in_flight: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    #[test]
    fn replacing_an_entry_recharges_its_cost() {
        let limits = CacheConfig::default().with_cost_limit(100);
        let mut state = state();
        assert!(state.insert("a".into(), Bytes::from_static(&[0; 40]), 40, &limits));
        assert!(state.insert("a".into(), Bytes::from_static(&[0; 10]), 10, &limits));
        assert_eq!(state.total_cost, 10);
        assert_eq!(state.entries.len(), 1);
    }

    #[test]
    fn oversized_object_evicts_nothing_and_is_not_kept() {
        let limits = CacheConfig::default().with_cost_limit(100);
        let mut state = state();
        state.insert("a".into(), Bytes::from_static(&[0; 50]), 50, &limits);
        assert!(!state.insert("b".into(), Bytes::from_static(&[0; 101]), 101, &limits));
        assert_eq!(state.total_cost, 50);
        assert!(state.entries.contains("a"));
        assert_eq!(state.stats.evictions, 0);
    }

    #[test]
    fn count_limit_evicts_least_recently_used() {
        let limits = CacheConfig::default().with_count_limit(2);
        let mut state = state();
        state.insert("a".into(), Bytes::from_static(b"1"), 1, &limits);
        state.insert("b".into(), Bytes::from_static(b"2"), 1, &limits);
        // touch "a" so "b" becomes the oldest
        state.entries.get("a");
        state.insert("c".into(), Bytes::from_static(b"3"), 1, &limits);
        assert!(state.entries.contains("a"));
        assert!(!state.entries.contains("b"));
        assert_eq!(state.stats.evictions, 1);
    }
}
