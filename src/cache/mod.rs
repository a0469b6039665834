//! Layered search cache.
//!
//! Three tiers, checked in order:
//! 1. **Memory** - bounded LRU keyed by the request hash ([`lru`])
//! 2. **Store** - durable per-query records with hit counts ([`store`])
//! 3. **Items** - per-track entries keyed by platform and track id ([`bytes`])
//!
//! A tier-2 hit repopulates tier 1. Tier 3 never produces a full hit: it
//! only yields [`CacheLookup::Partial`] results the engine can fall back on
//! when a live source fails.
//!
//! Every tier failure is logged and treated as a miss or a no-op. The cache
//! never fails a search.

pub mod bytes;
pub mod lru;
pub mod store;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

pub use bytes::{ByteCache, DiskByteCache, MemoryByteCache};
pub use lru::LruCache;
pub use store::{QueryStore, SqliteQueryStore};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::model::{Provenance, SearchRequest, SearchResult};

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Full per-query record
    Hit(Vec<SearchResult>),
    /// The query is known to return nothing
    Negative,
    /// Recent per-item data only; not a hit
    Partial(Vec<SearchResult>),
    Miss,
}

/// Counters exposed by [`LayeredCache::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub store_hits: u64,
    pub partial_hits: u64,
    pub negative_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    pub errors: u64,
    pub memory_entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    partial_hits: AtomicU64,
    negative_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    results: Arc<Vec<SearchResult>>,
    negative: bool,
    expires: Instant,
}

/// Key of one track in the item tier.
pub fn item_key(platform: &str, external_id: &str) -> String {
    format!("item:{platform}:{external_id}")
}

fn manifest_key(query_hash: &str) -> String {
    format!("manifest:{query_hash}")
}

/// The three cache tiers behind one get/set/invalidate contract.
pub struct LayeredCache {
    memory: Mutex<LruCache<MemoryEntry>>,
    store: Option<Arc<dyn QueryStore>>,
    items: Option<Arc<dyn ByteCache>>,
    config: CacheConfig,
    counters: Counters,
}

impl LayeredCache {
    /// Memory tier only.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            memory: Mutex::new(LruCache::new(config.memory_capacity)),
            store: None,
            items: None,
            config,
            counters: Counters::default(),
        }
    }

    /// Attach the durable per-query tier.
    pub fn with_store(mut self, store: Arc<dyn QueryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the per-item tier.
    pub fn with_items(mut self, items: Arc<dyn ByteCache>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look a request up across all tiers.
    pub async fn lookup(&self, request: &SearchRequest) -> CacheLookup {
        let key = request.cache_key();

        if let Some(found) = self.memory_get(&key) {
            return found;
        }

        if let Some(found) = self.store_get(&key).await {
            return found;
        }

        let partial = self.partial_get(&key).await;
        if !partial.is_empty() {
            bump(&self.counters.partial_hits);
            tracing::debug!(target: "cache", "Partial hit for {} ({} items)", key, partial.len());
            return CacheLookup::Partial(partial);
        }

        bump(&self.counters.misses);
        CacheLookup::Miss
    }

    /// Full-hit view of [`lookup`](Self::lookup).
    ///
    /// Negative entries come back as `Some(vec![])`; partial data counts as
    /// a miss.
    pub async fn get(&self, request: &SearchRequest) -> Option<Vec<SearchResult>> {
        match self.lookup(request).await {
            CacheLookup::Hit(results) => Some(results),
            CacheLookup::Negative => Some(Vec::new()),
            CacheLookup::Partial(_) | CacheLookup::Miss => None,
        }
    }

    /// Cache the results of a query. An empty set is stored as negative.
    pub async fn set(&self, request: &SearchRequest, results: &[SearchResult]) {
        if results.is_empty() {
            self.store_negative(request).await;
            return;
        }

        let key = request.cache_key();
        let now = Utc::now();
        let stamped: Vec<SearchResult> = results
            .iter()
            .cloned()
            .map(|mut r| {
                r.cached_at = Some(now);
                r
            })
            .collect();

        self.memory_put(&key, stamped.clone(), false, self.config.memory_ttl());

        if let Some(store) = &self.store
            && let Err(e) = store
                .put(&key, &request.search_text(), &stamped, false, self.config.store_ttl())
                .await
        {
            self.record_error("store write", &e);
        }

        self.items_put(&key, &stamped, &stamped).await;
        bump(&self.counters.writes);
    }

    /// Refresh only the item tier for an incomplete answer.
    ///
    /// `fresh` results are written as items; the request's manifest lists
    /// every result in `all`, so substitutes for failed sources stay
    /// reachable without having their own TTL renewed. The per-query tiers
    /// are left untouched.
    pub async fn set_items(
        &self,
        request: &SearchRequest,
        fresh: &[SearchResult],
        all: &[SearchResult],
    ) {
        let now = Utc::now();
        let stamped: Vec<SearchResult> = fresh
            .iter()
            .cloned()
            .map(|mut r| {
                r.cached_at = Some(now);
                r
            })
            .collect();
        self.items_put(&request.cache_key(), &stamped, all).await;
    }

    /// Remember that a query returned nothing, with the negative TTL.
    pub async fn store_negative(&self, request: &SearchRequest) {
        let key = request.cache_key();
        let ttl = self.config.negative_ttl();

        self.memory_put(&key, Vec::new(), true, ttl);

        if let Some(store) = &self.store
            && let Err(e) = store
                .put(&key, &request.search_text(), &[], true, ttl)
                .await
        {
            self.record_error("store negative write", &e);
        }
        bump(&self.counters.writes);
    }

    /// Remove a request's record from the memory and store tiers.
    pub async fn invalidate(&self, request: &SearchRequest) -> Result<(), CacheError> {
        self.invalidate_key(&request.cache_key()).await
    }

    /// Remove a record by request hash.
    ///
    /// Returns only after tiers 1 and 2 are clear. Per-item entries expire
    /// on their own; the request's item manifest is dropped best effort.
    pub async fn invalidate_key(&self, key: &str) -> Result<(), CacheError> {
        self.memory.lock().remove(key);

        if let Some(store) = &self.store {
            store.delete(key).await.inspect_err(|e| {
                self.record_error("store delete", e);
            })?;
        }

        if let Some(items) = &self.items
            && let Err(e) = items.delete(&manifest_key(key)).await
        {
            self.record_error("manifest delete", &e);
        }

        bump(&self.counters.invalidations);
        Ok(())
    }

    /// Recently seen track from the item tier.
    pub async fn get_item(&self, platform: &str, external_id: &str) -> Option<SearchResult> {
        let items = self.items.as_ref()?;
        match items.get(&item_key(platform, external_id)).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(result) => Some(result),
                Err(e) => {
                    self.record_error("item decode", &CacheError::from(e));
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.record_error("item read", &e);
                None
            }
        }
    }

    /// Write one track into the item tier.
    pub async fn put_item(&self, result: &SearchResult) {
        let Some(items) = &self.items else {
            return;
        };
        if result.external_id.is_empty() {
            return;
        }
        let write = match serde_json::to_vec(result) {
            Ok(bytes) => {
                items
                    .set(
                        &item_key(&result.platform, &result.external_id),
                        bytes,
                        self.config.item_ttl(),
                    )
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = write {
            self.record_error("item write", &e);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            memory_hits: c.memory_hits.load(Ordering::Relaxed),
            store_hits: c.store_hits.load(Ordering::Relaxed),
            partial_hits: c.partial_hits.load(Ordering::Relaxed),
            negative_hits: c.negative_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            memory_entries: self.memory.lock().len(),
        }
    }

    /// Close the persistent tiers and drop the memory tier.
    pub async fn close(&self) {
        self.memory.lock().clear();
        if let Some(store) = &self.store
            && let Err(e) = store.close().await
        {
            self.record_error("store close", &e);
        }
        if let Some(items) = &self.items
            && let Err(e) = items.close().await
        {
            self.record_error("items close", &e);
        }
    }

    fn record_error(&self, op: &str, error: &CacheError) {
        bump(&self.counters.errors);
        tracing::warn!(target: "cache", "Cache {} failed: {}", op, error);
    }

    fn memory_get(&self, key: &str) -> Option<CacheLookup> {
        let mut memory = self.memory.lock();
        let entry = memory.get(key)?.clone();

        if entry.expires <= Instant::now() {
            memory.remove(key);
            return None;
        }

        if entry.negative {
            bump(&self.counters.negative_hits);
            return Some(CacheLookup::Negative);
        }
        bump(&self.counters.memory_hits);
        Some(CacheLookup::Hit(entry.results.as_ref().clone()))
    }

    fn memory_put(&self, key: &str, results: Vec<SearchResult>, negative: bool, ttl: Duration) {
        let entry = MemoryEntry {
            results: Arc::new(results),
            negative,
            expires: Instant::now() + ttl,
        };
        self.memory.lock().put(key.to_string(), entry);
    }

    async fn store_get(&self, key: &str) -> Option<CacheLookup> {
        let store = self.store.as_ref()?;
        let record = match store.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                self.record_error("store read", &e);
                return None;
            }
        };

        let remaining = (record.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let ttl = if record.negative {
            remaining.min(self.config.negative_ttl())
        } else {
            remaining.min(self.config.memory_ttl())
        };
        self.memory_put(key, record.results.clone(), record.negative, ttl);

        if record.negative {
            bump(&self.counters.negative_hits);
            Some(CacheLookup::Negative)
        } else {
            bump(&self.counters.store_hits);
            Some(CacheLookup::Hit(record.results))
        }
    }

    async fn partial_get(&self, key: &str) -> Vec<SearchResult> {
        let Some(items) = &self.items else {
            return Vec::new();
        };

        let manifest: Vec<(String, String)> = match items.get(&manifest_key(key)).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(manifest) => manifest,
                Err(e) => {
                    self.record_error("manifest decode", &CacheError::from(e));
                    return Vec::new();
                }
            },
            Ok(None) => return Vec::new(),
            Err(e) => {
                self.record_error("manifest read", &e);
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(manifest.len());
        for (platform, id) in manifest {
            if let Some(result) = self.get_item(&platform, &id).await {
                results.push(result);
            }
        }
        results
    }

    async fn items_put(&self, key: &str, fresh: &[SearchResult], all: &[SearchResult]) {
        let Some(items) = &self.items else {
            return;
        };

        let cacheable =
            |r: &SearchResult| r.provenance == Provenance::Platform && !r.external_id.is_empty();
        for result in fresh.iter().filter(|r| cacheable(r)) {
            self.put_item(result).await;
        }
        let manifest: Vec<(String, String)> = all
            .iter()
            .filter(|r| cacheable(r))
            .map(|r| (r.platform.clone(), r.external_id.clone()))
            .collect();
        if manifest.is_empty() {
            return;
        }

        let write = match serde_json::to_vec(&manifest) {
            Ok(bytes) => items.set(&manifest_key(key), bytes, self.config.item_ttl()).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = write {
            self.record_error("manifest write", &e);
        }
    }
}
