//! External catalogs as search sources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{PlatformService, Source};
use crate::error::SourceError;
use crate::model::{Provenance, SearchRequest, SearchResult};

/// Default health probe timeout.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
/// Default per-search timeout.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Source backed by one [`PlatformService`].
pub struct PlatformSource {
    service: Arc<dyn PlatformService>,
    health_timeout: Duration,
    search_timeout: Duration,
}

impl PlatformSource {
    pub fn new(service: Arc<dyn PlatformService>) -> Self {
        Self::with_timeouts(service, HEALTH_TIMEOUT, SEARCH_TIMEOUT)
    }

    pub fn with_timeouts(
        service: Arc<dyn PlatformService>,
        health_timeout: Duration,
        search_timeout: Duration,
    ) -> Self {
        Self {
            service,
            health_timeout,
            search_timeout,
        }
    }

    pub fn service(&self) -> &Arc<dyn PlatformService> {
        &self.service
    }
}

#[async_trait]
impl Source for PlatformSource {
    fn name(&self) -> &str {
        self.service.platform()
    }

    /// Enabled iff the health probe answers in time.
    async fn is_enabled(&self) -> bool {
        match tokio::time::timeout(self.health_timeout, self.service.health()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!("{} health check failed: {}", self.name(), e);
                false
            }
            Err(_) => {
                tracing::debug!("{} health check timed out", self.name());
                false
            }
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SourceError> {
        let query = request.search_text();
        let tracks = tokio::time::timeout(self.search_timeout, self.service.search_track(&query))
            .await
            .map_err(|_| SourceError::Timeout {
                source_name: self.name().to_string(),
                millis: self.search_timeout.as_millis() as u64,
            })??;

        let platform = self.name().to_string();
        Ok(tracks
            .into_iter()
            .take(request.limit())
            .map(|mut t| {
                t.provenance = Provenance::Platform;
                t.popularity = t.popularity.min(100);
                if t.platform.is_empty() {
                    t.platform = platform.clone();
                }
                t
            })
            .collect())
    }
}
