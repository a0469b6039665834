//! Test utilities and fixtures for music-search tests.
//!
//! This module provides common test helpers, result factories, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{temp_db, platform_result};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let hit = platform_result("spotify", "Song", "Artist", 50);
//!     // ... test logic
//! }
//! ```

use std::collections::BTreeMap;

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::db::Song;
use crate::model::{Provenance, SearchResult, platform};

/// ISRC of the fixture song.
pub const BOHEMIAN_ISRC: &str = "GBUM71505078";

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// A stored song with sensible defaults.
///
/// Customize using struct update syntax:
///
/// ```ignore
/// let song = Song { title: "Other".to_string(), ..mock_song() };
/// ```
pub fn mock_song() -> Song {
    Song {
        id: 0,
        title: "Bohemian Rhapsody".to_string(),
        artist: "Queen".to_string(),
        artists: vec!["Queen".to_string()],
        album: "A Night at the Opera".to_string(),
        isrc: Some(BOHEMIAN_ISRC.to_string()),
        duration_ms: 354_000,
        release_date: "1975-10-31".to_string(),
        image_url: String::new(),
        popularity: 90,
        explicit: false,
        platform_links: BTreeMap::new(),
    }
}

/// A live platform hit with no ISRC.
///
/// The external id and URL are derived from the title so distinct titles
/// never collide.
pub fn platform_result(platform: &str, title: &str, artist: &str, popularity: u8) -> SearchResult {
    let external_id = title.to_lowercase().replace(' ', "-");
    SearchResult {
        title: title.to_string(),
        artists: vec![artist.to_string()],
        album: String::new(),
        platform: platform.to_string(),
        url: format!("https://{platform}.example.com/track/{external_id}"),
        external_id,
        popularity,
        duration_ms: 200_000,
        available: true,
        provenance: Provenance::Platform,
        ..Default::default()
    }
}

/// A hit from the local datastore.
pub fn local_result(title: &str, artist: &str, popularity: u8) -> SearchResult {
    SearchResult {
        platform: platform::LOCAL.to_string(),
        url: "/songs/1".to_string(),
        external_id: "1".to_string(),
        provenance: Provenance::Local,
        ..platform_result(platform::LOCAL, title, artist, popularity)
    }
}

/// Attach an ISRC to a result.
pub fn with_isrc(mut result: SearchResult, isrc: &str) -> SearchResult {
    result.isrc = isrc.to_string();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM songs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_mock_song_defaults() {
        let song = mock_song();
        assert_eq!(song.title, "Bohemian Rhapsody");
        assert_eq!(song.artist, "Queen");
        assert_eq!(song.isrc.as_deref(), Some(BOHEMIAN_ISRC));
    }

    #[test]
    fn test_result_factories() {
        let hit = platform_result("spotify", "Some Song", "Artist", 50);
        assert_eq!(hit.external_id, "some-song");
        assert!(hit.available);
        assert!(!hit.is_local());

        let local = local_result("Some Song", "Artist", 50);
        assert!(local.is_local());
        assert_eq!(local.platform, "local");
    }
}
