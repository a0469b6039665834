//! Search sources - the local datastore and external catalogs behind one contract.
//!
//! # Architecture
//!
//! - **Collaborator traits** (`traits.rs`) - [`Repository`] and [`PlatformService`],
//!   the interfaces the core consumes
//! - **Sources** - [`LocalSource`] and [`PlatformSource`] adapt those
//!   collaborators to the uniform [`Source`] contract
//! - **Registry** - [`SourceRegistry`] owns the sources and decides which
//!   ones a request goes to
//!
//! The search path is written against [`Source`] only.

pub mod local;
pub mod platform;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

pub use local::LocalSource;
pub use platform::PlatformSource;
pub use traits::{PlatformService, Repository};

#[cfg(test)]
pub use traits::mocks;

use crate::config::BackgroundConfig;
use crate::error::SourceError;
use crate::model::{self, SearchRequest, SearchResult};

/// Anything that can answer a search request.
#[async_trait]
pub trait Source: Send + Sync {
    /// Source name; platform sources use their platform id.
    fn name(&self) -> &str;

    /// Whether the source should take part in a search right now.
    async fn is_enabled(&self) -> bool;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SourceError>;
}

/// Owns every configured source, in priority order.
#[derive(Default)]
pub struct SourceRegistry {
    local: Option<Arc<dyn Source>>,
    platforms: Vec<Arc<dyn Source>>,
    services: Vec<Arc<dyn PlatformService>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the local datastore.
    pub fn with_local(mut self, repository: Arc<dyn Repository>) -> Self {
        self.local = Some(Arc::new(LocalSource::new(repository)));
        self
    }

    /// Add an external catalog with default timeouts.
    pub fn with_platform(self, service: Arc<dyn PlatformService>) -> Self {
        self.with_platform_timeouts(service, platform::HEALTH_TIMEOUT, platform::SEARCH_TIMEOUT)
    }

    /// Add an external catalog with explicit health/search timeouts.
    pub fn with_platform_timeouts(
        mut self,
        service: Arc<dyn PlatformService>,
        health_timeout: Duration,
        search_timeout: Duration,
    ) -> Self {
        let source = PlatformSource::with_timeouts(Arc::clone(&service), health_timeout, search_timeout);
        self.platforms.push(Arc::new(source));
        self.services.push(service);
        // Stable: unlisted platforms keep registration order.
        self.platforms
            .sort_by_key(|s| model::platform::priority(s.name()));
        self.services
            .sort_by_key(|s| model::platform::priority(s.platform()));
        self
    }

    /// Add an external catalog with the timeouts from `[background]`.
    pub fn with_configured_platform(
        self,
        service: Arc<dyn PlatformService>,
        config: &BackgroundConfig,
    ) -> Self {
        self.with_platform_timeouts(service, config.health_timeout(), config.source_timeout())
    }

    /// Whether a source with this name is registered.
    pub fn has_source(&self, name: &str) -> bool {
        self.local.as_ref().is_some_and(|l| l.name() == name)
            || self.platforms.iter().any(|p| p.name() == name)
    }

    /// Platform service by platform name, for out-of-band lookups.
    pub fn service(&self, platform: &str) -> Option<Arc<dyn PlatformService>> {
        self.services
            .iter()
            .find(|s| s.platform() == platform)
            .cloned()
    }

    /// Platform names in priority order.
    pub fn platform_names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name().to_string()).collect()
    }

    /// Sources a request should go to, in priority order.
    ///
    /// The local source is always included when enabled. A platform filter
    /// narrows the platform sources to that one platform; otherwise every
    /// platform whose health probe passes is included. Probes run
    /// concurrently.
    pub async fn select(&self, request: &SearchRequest) -> Vec<Arc<dyn Source>> {
        let mut selected: Vec<Arc<dyn Source>> = Vec::new();

        if let Some(local) = &self.local
            && local.is_enabled().await
        {
            selected.push(Arc::clone(local));
        }

        let wanted = request.platform.as_deref().map(str::trim).filter(|p| !p.is_empty());
        if wanted == Some(model::platform::LOCAL) {
            return selected;
        }

        let candidates: Vec<&Arc<dyn Source>> = self
            .platforms
            .iter()
            .filter(|p| wanted.is_none_or(|w| p.name() == w))
            .collect();

        let enabled = join_all(candidates.iter().map(|p| p.is_enabled())).await;
        for (source, ok) in candidates.into_iter().zip(enabled) {
            if ok {
                selected.push(Arc::clone(source));
            } else {
                tracing::debug!("Skipping disabled source {}", source.name());
            }
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::{MockPlatform, MockRepository};
    use super::*;

    fn registry() -> SourceRegistry {
        SourceRegistry::new()
            .with_local(Arc::new(MockRepository::default()))
            .with_platform(Arc::new(MockPlatform::new("tidal", vec![])))
            .with_platform(Arc::new(MockPlatform::new("bandcamp", vec![])))
            .with_platform(Arc::new(MockPlatform::new("spotify", vec![])))
            .with_platform(Arc::new(MockPlatform::unhealthy("apple_music")))
    }

    fn names(sources: &[Arc<dyn Source>]) -> Vec<String> {
        sources.iter().map(|s| s.name().to_string()).collect()
    }

    #[tokio::test]
    async fn test_select_all_enabled_in_priority_order() {
        let selected = registry().select(&SearchRequest::new("x")).await;
        assert_eq!(names(&selected), vec!["local", "spotify", "tidal", "bandcamp"]);
    }

    #[tokio::test]
    async fn test_select_platform_filter() {
        let request = SearchRequest::new("x").with_platform("tidal");
        let selected = registry().select(&request).await;
        assert_eq!(names(&selected), vec!["local", "tidal"]);

        let request = SearchRequest::new("x").with_platform("local");
        assert_eq!(names(&registry().select(&request).await), vec!["local"]);
    }

    #[tokio::test]
    async fn test_select_without_local() {
        let registry =
            SourceRegistry::new().with_platform(Arc::new(MockPlatform::new("spotify", vec![])));
        let selected = registry.select(&SearchRequest::new("x")).await;
        assert_eq!(names(&selected), vec!["spotify"]);
    }

    #[tokio::test]
    async fn test_configured_health_timeout_disables_slow_platform() {
        let config = BackgroundConfig {
            health_timeout_ms: 20,
            ..Default::default()
        };
        let slow = MockPlatform::new("spotify", vec![])
            .with_delay(std::time::Duration::from_millis(500));
        let registry = SourceRegistry::new()
            .with_configured_platform(Arc::new(slow), &config)
            .with_configured_platform(Arc::new(MockPlatform::new("tidal", vec![])), &config);

        let selected = registry.select(&SearchRequest::new("x")).await;
        assert_eq!(names(&selected), vec!["tidal"]);
    }

    #[test]
    fn test_lookup_helpers() {
        let registry = registry();
        assert!(registry.has_source("local"));
        assert!(registry.has_source("apple_music"));
        assert!(!registry.has_source("napster"));
        assert!(registry.service("spotify").is_some());
        assert_eq!(
            registry.platform_names(),
            vec!["spotify", "apple_music", "tidal", "bandcamp"]
        );
    }
}
