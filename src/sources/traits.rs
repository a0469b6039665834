//! Trait definitions for the collaborators behind the sources.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code plugs in the SQLite repository and real platform
//! clients, while tests substitute the mocks at the bottom of this file.

use async_trait::async_trait;

use crate::db::Song;
use crate::error::SourceError;
use crate::model::SearchResult;

/// The local song datastore.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Heuristic text search, at most `limit` songs.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Song>, SourceError>;

    /// Look up a song by ISRC.
    async fn find_by_isrc(&self, isrc: &str) -> Result<Option<Song>, SourceError>;

    /// Case-insensitive exact title + primary artist lookup.
    async fn find_by_title_artist(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Vec<Song>, SourceError>;

    /// Persist changes to an existing song.
    async fn update(&self, song: &Song) -> Result<(), SourceError>;

    /// Persist a new song and return its ID.
    async fn insert(&self, song: &Song) -> Result<i64, SourceError>;
}

/// One external music catalog.
///
/// Authentication and HTTP details live entirely behind this trait.
/// Tracks are returned already projected into [`SearchResult`]s.
#[async_trait]
pub trait PlatformService: Send + Sync {
    /// Platform identifier, e.g. `spotify`.
    fn platform(&self) -> &str;

    /// Cheap liveness probe.
    async fn health(&self) -> Result<(), SourceError>;

    async fn search_track(&self, query: &str) -> Result<Vec<SearchResult>, SourceError>;

    async fn get_track_by_id(&self, id: &str) -> Result<SearchResult, SourceError>;

    /// Returns [`SourceError::NotFound`] when the catalog has no such ISRC.
    async fn get_track_by_isrc(&self, isrc: &str) -> Result<SearchResult, SourceError>;

    fn build_url(&self, id: &str) -> String;

    async fn parse_url(&self, url: &str) -> Result<SearchResult, SourceError>;
}

/// Mock collaborators for testing.
#[cfg(test)]
pub mod mocks {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    /// In-memory repository.
    #[derive(Default)]
    pub struct MockRepository {
        pub songs: Mutex<Vec<Song>>,
        /// Error to return from every call (takes precedence)
        pub error: Option<SourceError>,
    }

    impl MockRepository {
        pub fn with_songs(songs: Vec<Song>) -> Self {
            let songs = songs
                .into_iter()
                .enumerate()
                .map(|(i, mut s)| {
                    if s.id == 0 {
                        s.id = i as i64 + 1;
                    }
                    s
                })
                .collect();
            Self {
                songs: Mutex::new(songs),
                error: None,
            }
        }

        pub fn with_error(error: SourceError) -> Self {
            Self {
                songs: Mutex::new(Vec::new()),
                error: Some(error),
            }
        }

        pub fn snapshot(&self) -> Vec<Song> {
            self.songs.lock().clone()
        }

        fn check(&self) -> Result<(), SourceError> {
            match &self.error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Repository for MockRepository {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<Song>, SourceError> {
            self.check()?;
            let query = query.to_lowercase();
            Ok(self
                .songs
                .lock()
                .iter()
                .filter(|s| {
                    let haystack = format!("{} {} {}", s.title, s.artist, s.album).to_lowercase();
                    query.split_whitespace().all(|w| haystack.contains(w))
                })
                .take(limit)
                .cloned()
                .collect())
        }

        async fn find_by_isrc(&self, isrc: &str) -> Result<Option<Song>, SourceError> {
            self.check()?;
            Ok(self
                .songs
                .lock()
                .iter()
                .find(|s| s.isrc.as_deref().is_some_and(|i| i.eq_ignore_ascii_case(isrc)))
                .cloned())
        }

        async fn find_by_title_artist(
            &self,
            title: &str,
            artist: &str,
        ) -> Result<Vec<Song>, SourceError> {
            self.check()?;
            Ok(self
                .songs
                .lock()
                .iter()
                .filter(|s| {
                    s.title.eq_ignore_ascii_case(title) && s.artist.eq_ignore_ascii_case(artist)
                })
                .cloned()
                .collect())
        }

        async fn update(&self, song: &Song) -> Result<(), SourceError> {
            self.check()?;
            let mut songs = self.songs.lock();
            let existing = songs
                .iter_mut()
                .find(|s| s.id == song.id)
                .ok_or(SourceError::NotFound)?;
            *existing = song.clone();
            Ok(())
        }

        async fn insert(&self, song: &Song) -> Result<i64, SourceError> {
            self.check()?;
            let mut songs = self.songs.lock();
            let id = songs.iter().map(|s| s.id).max().unwrap_or(0) + 1;
            songs.push(Song {
                id,
                ..song.clone()
            });
            Ok(id)
        }
    }

    /// Platform that serves a fixed catalog.
    pub struct MockPlatform {
        pub name: String,
        /// Returned by `search_track` and used for id/ISRC lookups
        pub tracks: Vec<SearchResult>,
        pub healthy: bool,
        /// Error to return from searches and lookups
        pub error: Option<SourceError>,
        /// Artificial latency for every call
        pub delay: Option<Duration>,
        pub search_calls: AtomicUsize,
        pub isrc_calls: AtomicUsize,
    }

    impl MockPlatform {
        pub fn new(name: &str, tracks: Vec<SearchResult>) -> Self {
            Self {
                name: name.to_string(),
                tracks,
                healthy: true,
                error: None,
                delay: None,
                search_calls: AtomicUsize::new(0),
                isrc_calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(name: &str, error: SourceError) -> Self {
            Self {
                error: Some(error),
                ..Self::new(name, Vec::new())
            }
        }

        pub fn unhealthy(name: &str) -> Self {
            Self {
                healthy: false,
                ..Self::new(name, Vec::new())
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn searches(&self) -> usize {
            self.search_calls.load(Ordering::SeqCst)
        }

        async fn pause(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }

        fn check(&self) -> Result<(), SourceError> {
            match &self.error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl PlatformService for MockPlatform {
        fn platform(&self) -> &str {
            &self.name
        }

        async fn health(&self) -> Result<(), SourceError> {
            self.pause().await;
            if self.healthy {
                Ok(())
            } else {
                Err(SourceError::Unavailable(self.name.clone()))
            }
        }

        async fn search_track(&self, _query: &str) -> Result<Vec<SearchResult>, SourceError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.check()?;
            Ok(self.tracks.clone())
        }

        async fn get_track_by_id(&self, id: &str) -> Result<SearchResult, SourceError> {
            self.check()?;
            self.tracks
                .iter()
                .find(|t| t.external_id == id)
                .cloned()
                .ok_or(SourceError::NotFound)
        }

        async fn get_track_by_isrc(&self, isrc: &str) -> Result<SearchResult, SourceError> {
            self.isrc_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.check()?;
            self.tracks
                .iter()
                .find(|t| t.isrc.eq_ignore_ascii_case(isrc))
                .cloned()
                .ok_or(SourceError::NotFound)
        }

        fn build_url(&self, id: &str) -> String {
            format!("https://{}.example.com/track/{}", self.name, id)
        }

        async fn parse_url(&self, url: &str) -> Result<SearchResult, SourceError> {
            let id = url.rsplit('/').next().unwrap_or_default();
            self.get_track_by_id(id).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::test_utils::{mock_song, platform_result};

        #[tokio::test]
        async fn test_mock_repository_insert_and_find() {
            let repo = MockRepository::default();
            let id = repo.insert(&mock_song()).await.unwrap();
            assert_eq!(id, 1);
            assert!(repo.find_by_isrc("GBUM71505078").await.unwrap().is_some());
        }

        #[tokio::test]
        async fn test_mock_repository_error() {
            let repo = MockRepository::with_error(SourceError::Repository("down".to_string()));
            assert!(matches!(
                repo.search("x", 5).await,
                Err(SourceError::Repository(_))
            ));
        }

        #[tokio::test]
        async fn test_mock_platform_lookups() {
            let mut track = platform_result("spotify", "Song", "Artist", 50);
            track.external_id = "abc".to_string();
            track.isrc = "USAAA0000001".to_string();
            let mock = MockPlatform::new("spotify", vec![track]);

            assert!(mock.health().await.is_ok());
            assert_eq!(mock.search_track("song").await.unwrap().len(), 1);
            assert_eq!(mock.searches(), 1);
            assert!(mock.get_track_by_isrc("usaaa0000001").await.is_ok());
            assert_eq!(
                mock.parse_url(&mock.build_url("abc")).await.unwrap().title,
                "Song"
            );
            assert_eq!(
                mock.get_track_by_id("zzz").await,
                Err(SourceError::NotFound)
            );
        }

        #[tokio::test]
        async fn test_mock_platform_unhealthy() {
            let mock = MockPlatform::unhealthy("tidal");
            assert!(matches!(
                mock.health().await,
                Err(SourceError::Unavailable(_))
            ));
        }
    }
}
