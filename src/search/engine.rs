//! Flat search entry point and the shared fetch path.
//!
//! [`Engine::fetch`] is the cache-then-fan-out pipeline both entry points
//! use. [`Engine::search`] ranks the raw results without grouping and never
//! fails: every degraded path ends in an empty response.

use std::sync::Arc;
use std::time::Instant;

use super::fanout::{SourceOutcome, fan_out, merge};
use super::ranking::Ranker;
use crate::cache::{CacheLookup, LayeredCache};
use crate::config::RankingConfigProvider;
use crate::model::{SearchRequest, SearchResponse, SearchResult};
use crate::sources::SourceRegistry;

/// Raw results for one request.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    /// Merged in source selection order
    pub results: Vec<SearchResult>,
    pub from_cache: bool,
    /// Per-source outcomes; empty on a cache hit
    pub outcomes: Vec<SourceOutcome>,
}

/// Searches every source behind the layered cache.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<SourceRegistry>,
    cache: Arc<LayeredCache>,
    ranker: Ranker,
}

/// Human-readable elapsed time, e.g. `12.34ms`.
pub(crate) fn elapsed(started: Instant) -> String {
    format!("{:.2?}", started.elapsed())
}

impl Engine {
    pub fn new(
        registry: Arc<SourceRegistry>,
        cache: Arc<LayeredCache>,
        ranking: Arc<dyn RankingConfigProvider>,
    ) -> Self {
        Self {
            registry,
            cache,
            ranker: Ranker::new(ranking),
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<LayeredCache> {
        &self.cache
    }

    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    /// Ranked flat results for a request.
    pub async fn search(&self, request: SearchRequest) -> SearchResponse<SearchResult> {
        let started = Instant::now();
        if request.is_empty() {
            return SearchResponse::empty(request, elapsed(started));
        }

        let fetched = self.fetch(&request).await;
        let mut results = self
            .ranker
            .rank_results(fetched.results, &request.search_text());
        results.truncate(request.limit());

        tracing::debug!(
            "Flat search {:?}: {} results in {:?}",
            request.search_text(),
            results.len(),
            started.elapsed()
        );

        SearchResponse {
            total: results.len(),
            results,
            request,
            from_cache: fetched.from_cache,
            duration: elapsed(started),
        }
    }

    /// Cached or live raw results for a request.
    ///
    /// On a miss every selected source is queried. A failed source is
    /// replaced by its items from a partial cache hit, if any. Results are
    /// written back to the per-query tiers only when every source answered;
    /// a negative entry is written when none of them had anything.
    pub async fn fetch(&self, request: &SearchRequest) -> Fetched {
        let partial = match self.cache.lookup(request).await {
            CacheLookup::Hit(results) => {
                return Fetched {
                    results,
                    from_cache: true,
                    outcomes: Vec::new(),
                };
            }
            CacheLookup::Negative => {
                return Fetched {
                    from_cache: true,
                    ..Default::default()
                };
            }
            CacheLookup::Partial(items) => items,
            CacheLookup::Miss => Vec::new(),
        };

        let sources = self.registry.select(request).await;
        if sources.is_empty() {
            tracing::warn!("No sources available for {:?}", request.search_text());
        }
        let outcomes = fan_out(&sources, request).await;

        let results = merge(&outcomes, &partial);

        if outcomes.iter().all(SourceOutcome::is_ok) {
            if !results.is_empty() {
                self.cache.set(request, &results).await;
            } else if !sources.is_empty() {
                self.cache.store_negative(request).await;
            }
        } else {
            // Incomplete answers only refresh the item tier, so the failed
            // sources are asked again on the next fetch.
            let live = merge(&outcomes, &[]);
            self.cache.set_items(request, &live, &results).await;
        }

        Fetched {
            results,
            from_cache: false,
            outcomes,
        }
    }
}
