//! Background work triggered by searches.
//!
//! # Architecture
//!
//! ```text
//! Coordinator ──schedule()──► TaskPool (bounded queue, N workers)
//!                               ├── Enhancer: fill missing platform links
//!                               └── Indexer:  persist top platform hits
//! ```
//!
//! Scheduling never blocks and never fails the search that triggered it.
//! Tasks outlive their request and are bounded by a per-task timeout.

pub mod enhancer;
pub mod indexer;
pub mod pool;
pub mod similarity;

pub use enhancer::{EnhancementReport, Enhancer, FoundLink, MatchMethod};
pub use indexer::{IndexOutcome, Indexer};
pub use pool::{PoolStats, TaskPool};
pub use similarity::{TrackRef, best_match, similarity};

use std::sync::Arc;

use serde::Serialize;

use crate::cache::LayeredCache;
use crate::config::Config;
use crate::error::{Error, ResultExt};
use crate::model::{GroupedSearchResult, SearchResult};
use crate::sources::{Repository, SourceRegistry};

/// How many tasks one search scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Scheduled {
    pub enhancements: usize,
    pub indexing: usize,
    /// Tasks the pool refused
    pub rejected: usize,
}

/// The pool plus the jobs it runs.
pub struct Background {
    pool: TaskPool,
    enhancer: Option<Arc<Enhancer>>,
    indexer: Option<Arc<Indexer>>,
}

impl Background {
    pub fn new(pool: TaskPool) -> Self {
        Self {
            pool,
            enhancer: None,
            indexer: None,
        }
    }

    pub fn with_enhancer(mut self, enhancer: Enhancer) -> Self {
        self.enhancer = Some(Arc::new(enhancer));
        self
    }

    pub fn with_indexer(mut self, indexer: Indexer) -> Self {
        self.indexer = Some(Arc::new(indexer));
        self
    }

    /// Wire up from configuration. Returns `None` when background work is
    /// disabled.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(
        config: &Config,
        registry: Arc<SourceRegistry>,
        repository: Option<Arc<dyn Repository>>,
        cache: Arc<LayeredCache>,
    ) -> Option<Self> {
        if !config.background.enabled {
            return None;
        }

        let settings = &config.background;
        let pool = TaskPool::new(
            settings.workers,
            settings.queue_capacity,
            settings.task_timeout(),
        );

        let mut enhancer = Enhancer::new(registry)
            .with_cache(cache)
            .with_tracked(settings.tracked_platforms.clone())
            .with_threshold(settings.acceptance_threshold);
        if let Some(repository) = &repository {
            enhancer = enhancer.with_repository(Arc::clone(repository));
        }

        let mut background = Self::new(pool).with_enhancer(enhancer);
        if config.indexing.enabled
            && let Some(repository) = repository
        {
            background =
                background.with_indexer(Indexer::new(repository).with_top_n(config.indexing.top_n));
        }
        Some(background)
    }

    /// Queue enhancement for returned groups missing a tracked platform,
    /// and indexing for the best platform candidates of the query.
    pub fn schedule(
        &self,
        query: &str,
        groups: &[GroupedSearchResult],
        candidates: &[SearchResult],
    ) -> Scheduled {
        let mut scheduled = Scheduled::default();

        if let Some(enhancer) = &self.enhancer {
            for group in groups {
                if enhancer.missing_platforms(group).is_empty() {
                    continue;
                }
                let enhancer = Arc::clone(enhancer);
                let group = group.clone();
                let name = format!("enhance:{}", group.id);
                let accepted = self.pool.submit(&name, async move {
                    let report = enhancer
                        .enhance(&group)
                        .await
                        .map_err(Error::from)
                        .with_context(format!("enhancing group {}", group.id))?;
                    tracing::debug!(
                        target: "background",
                        "Enhanced {}: {} found, {} errors",
                        report.group_id,
                        report.found.len(),
                        report.errors.len()
                    );
                    Ok(())
                });
                if accepted {
                    scheduled.enhancements += 1;
                } else {
                    scheduled.rejected += 1;
                }
            }
        }

        if let Some(indexer) = &self.indexer {
            for candidate in indexer.select(query, candidates, groups) {
                let indexer = Arc::clone(indexer);
                let name = format!("index:{}:{}", candidate.platform, candidate.external_id);
                let accepted = self.pool.submit(&name, async move {
                    indexer
                        .index(&candidate)
                        .await
                        .map_err(Error::from)
                        .with_context(format!("indexing {:?}", candidate.title))?;
                    Ok(())
                });
                if accepted {
                    scheduled.indexing += 1;
                } else {
                    scheduled.rejected += 1;
                }
            }
        }

        if scheduled != Scheduled::default() {
            tracing::debug!(target: "background", "Scheduled for {:?}: {:?}", query, scheduled);
        }
        scheduled
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drain queued tasks and stop the workers.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
