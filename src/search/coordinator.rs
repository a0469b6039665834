//! Grouped search entry point.
//!
//! The coordinator runs the shared fetch path, collapses the raw results
//! into logical songs, ranks them and hands follow-up work to the
//! background pool. Grouping and ranking happen after the cache, so a
//! cached entry is always re-ranked against the current configuration.

use std::sync::Arc;
use std::time::Instant;

use super::engine::{Engine, elapsed};
use super::grouping::Grouper;
use crate::background::Background;
use crate::error::{Error, Result};
use crate::model::{GroupedSearchResult, SearchRequest, SearchResponse};

/// Longest accepted search text, in characters.
pub const MAX_QUERY_CHARS: usize = 512;

/// Grouped, ranked search with background follow-up.
pub struct Coordinator {
    engine: Engine,
    background: Option<Arc<Background>>,
}

impl Coordinator {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            background: None,
        }
    }

    pub fn with_background(mut self, background: Arc<Background>) -> Self {
        self.background = Some(background);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn background(&self) -> Option<&Arc<Background>> {
        self.background.as_ref()
    }

    /// Reject requests no source could ever answer.
    pub fn validate(&self, request: &SearchRequest) -> Result<()> {
        let length = request.search_text().chars().count();
        if length > MAX_QUERY_CHARS {
            return Err(Error::invalid_request(format!(
                "query is {length} characters, the maximum is {MAX_QUERY_CHARS}"
            )));
        }

        if let Some(platform) = request.platform.as_deref().map(str::trim)
            && !platform.is_empty()
            && !self.engine.registry().has_source(platform)
        {
            return Err(Error::invalid_request(format!(
                "no source registered for platform {platform:?}"
            )));
        }
        Ok(())
    }

    /// Grouped results for a request.
    ///
    /// Source and cache failures degrade to fewer (or no) results; only a
    /// malformed request is an error.
    pub async fn search(
        &self,
        request: SearchRequest,
    ) -> Result<SearchResponse<GroupedSearchResult>> {
        let started = Instant::now();
        self.validate(&request)?;
        if request.is_empty() {
            return Ok(SearchResponse::empty(request, elapsed(started)));
        }

        let query = request.search_text();
        let fetched = self.engine.fetch(&request).await;

        let ranker = self.engine.ranker();
        let config = ranker.snapshot();
        let groups = Grouper::new(&config).group(&fetched.results);
        let group_count = groups.len();
        let mut groups =
            ranker.rank_groups_with(&config, groups, &query, &fetched.results, request.debug);
        groups.truncate(request.limit());

        if let Some(background) = &self.background {
            background.schedule(&query, &groups, &fetched.results);
        }

        tracing::debug!(
            "Search {:?}: {} results into {} groups, returning {} in {:?}",
            query,
            fetched.results.len(),
            group_count,
            groups.len(),
            started.elapsed()
        );

        Ok(SearchResponse {
            total: groups.len(),
            results: groups,
            request,
            from_cache: fetched.from_cache,
            duration: elapsed(started),
        })
    }

    /// Drop the cached entry for a request from every tier.
    pub async fn invalidate(&self, request: &SearchRequest) -> Result<()> {
        self.engine.cache().invalidate(request).await?;
        Ok(())
    }
}
