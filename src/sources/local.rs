//! The local datastore as a search source.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Repository, Source};
use crate::error::SourceError;
use crate::model::{SearchRequest, SearchResult, platform};

/// Source backed by the local [`Repository`].
pub struct LocalSource {
    repository: Arc<dyn Repository>,
}

impl LocalSource {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Source for LocalSource {
    fn name(&self) -> &str {
        platform::LOCAL
    }

    async fn is_enabled(&self) -> bool {
        true
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SourceError> {
        let songs = self
            .repository
            .search(&request.search_text(), request.limit())
            .await?;

        Ok(songs.iter().map(|s| s.to_search_result()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;
    use crate::sources::mocks::MockRepository;
    use crate::test_utils::mock_song;

    #[tokio::test]
    async fn test_local_source_projects_songs() {
        let repo = Arc::new(MockRepository::with_songs(vec![mock_song()]));
        let source = LocalSource::new(repo);

        assert!(source.is_enabled().await);
        let results = source
            .search(&SearchRequest::new("bohemian"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provenance, Provenance::Local);
        assert_eq!(results[0].platform, "local");
    }

    #[tokio::test]
    async fn test_repository_error_surfaces() {
        let repo = Arc::new(MockRepository::with_error(SourceError::Repository(
            "locked".to_string(),
        )));
        let source = LocalSource::new(repo);
        assert!(source.search(&SearchRequest::new("x")).await.is_err());
    }
}
