//! Local datastore for songs and the durable cache tier.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. Provides:
//! - Pool initialization and migrations
//! - [`Song`], the stored representation of a track
//! - [`SqliteRepository`], the [`Repository`] used by the local source and
//!   by background indexing/enhancement
//!
//! # Example
//!
//! ```ignore
//! use music_search::db::{init_db, SqliteRepository};
//!
//! let pool = init_db("sqlite:music_search.db").await?;
//! let repo = SqliteRepository::new(pool);
//! let songs = repo.search("bohemian", 10).await?;
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::SourceError;
use crate::model::{Provenance, SearchResult, platform};
use crate::sources::Repository;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_search.db";

/// Words of a query considered by [`SqliteRepository::search`].
const MAX_QUERY_WORDS: usize = 8;

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, crate::error::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Timestamp format used for every TEXT time column.
///
/// Fixed precision keeps lexicographic and chronological order identical.
pub(crate) fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A song in the local datastore.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Song {
    /// Database ID (0 before insertion)
    pub id: i64,
    pub title: String,
    /// Primary artist
    pub artist: String,
    /// All artists, primary first
    pub artists: Vec<String>,
    pub album: String,
    pub isrc: Option<String>,
    pub duration_ms: u64,
    pub release_date: String,
    pub image_url: String,
    pub popularity: u8,
    pub explicit: bool,
    /// Known platform URLs, keyed by platform name
    pub platform_links: BTreeMap<String, String>,
}

impl Song {
    /// URL of this song inside the local catalog.
    pub fn local_url(&self) -> String {
        format!("/songs/{}", self.id)
    }

    /// Project into a flat search result with `local` provenance.
    pub fn to_search_result(&self) -> SearchResult {
        let artists = if self.artists.is_empty() && !self.artist.is_empty() {
            vec![self.artist.clone()]
        } else {
            self.artists.clone()
        };

        SearchResult {
            title: self.title.clone(),
            artists,
            album: self.album.clone(),
            platform: platform::LOCAL.to_string(),
            external_id: self.id.to_string(),
            url: self.local_url(),
            image_url: self.image_url.clone(),
            popularity: self.popularity.min(100),
            duration_ms: self.duration_ms,
            release_date: self.release_date.clone(),
            isrc: self.isrc.clone().unwrap_or_default(),
            explicit: self.explicit,
            available: true,
            provenance: Provenance::Local,
            relevance_score: 0.0,
            cached_at: None,
        }
    }

    /// Build a not-yet-persisted song from a platform result.
    pub fn from_search_result(result: &SearchResult) -> Self {
        let mut platform_links = BTreeMap::new();
        if !result.url.is_empty() {
            platform_links.insert(result.platform.clone(), result.url.clone());
        }

        Self {
            id: 0,
            title: result.title.clone(),
            artist: result.primary_artist().to_string(),
            artists: result.artists.clone(),
            album: result.album.clone(),
            isrc: result.normalized_isrc(),
            duration_ms: result.duration_ms,
            release_date: result.release_date.clone(),
            image_url: result.image_url.clone(),
            popularity: result.popularity.min(100),
            explicit: result.explicit,
            platform_links,
        }
    }
}

/// Raw `songs` row.
#[derive(Debug, sqlx::FromRow)]
struct SongRow {
    id: i64,
    title: String,
    artist: String,
    artists: String,
    album: String,
    isrc: Option<String>,
    duration_ms: i64,
    release_date: String,
    image_url: String,
    popularity: i64,
    explicit: bool,
    platform_links: String,
}

impl From<SongRow> for Song {
    fn from(row: SongRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            artist: row.artist,
            artists: serde_json::from_str(&row.artists).unwrap_or_default(),
            album: row.album,
            isrc: row.isrc.filter(|s| !s.is_empty()),
            duration_ms: row.duration_ms.max(0) as u64,
            release_date: row.release_date,
            image_url: row.image_url,
            popularity: row.popularity.clamp(0, 100) as u8,
            explicit: row.explicit,
            platform_links: serde_json::from_str(&row.platform_links).unwrap_or_default(),
        }
    }
}

const SONG_COLUMNS: &str = "id, title, artist, artists, album, isrc, duration_ms, release_date, \
     image_url, popularity, explicit, platform_links";

/// SQLite-backed [`Repository`].
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a song by its database ID.
    pub async fn get(&self, id: i64) -> sqlx::Result<Option<Song>> {
        let sql = format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?");
        let row = sqlx::query_as::<_, SongRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Song::from))
    }

    /// Number of stored songs.
    pub async fn count(&self) -> sqlx::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM songs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Escape `LIKE` wildcards so query words match literally.
fn escape_like(word: &str) -> String {
    let mut escaped = String::with_capacity(word.len());
    for c in word.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, SourceError> {
    serde_json::to_string(value).map_err(|e| SourceError::Repository(e.to_string()))
}

#[async_trait]
impl Repository for SqliteRepository {
    /// Every query word must appear somewhere in title, artist or album.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Song>, SourceError> {
        let words: Vec<String> = query
            .split_whitespace()
            .take(MAX_QUERY_WORDS)
            .map(|w| format!("%{}%", escape_like(&w.to_lowercase())))
            .collect();

        if words.is_empty() {
            return Ok(Vec::new());
        }

        let clauses = vec![
            "LOWER(title || ' ' || artist || ' ' || album) LIKE ? ESCAPE '\\'";
            words.len()
        ];
        let sql = format!(
            "SELECT {SONG_COLUMNS} FROM songs WHERE {} ORDER BY popularity DESC, id ASC LIMIT ?",
            clauses.join(" AND ")
        );

        let mut query = sqlx::query_as::<_, SongRow>(&sql);
        for word in &words {
            query = query.bind(word);
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Song::from).collect())
    }

    async fn find_by_isrc(&self, isrc: &str) -> Result<Option<Song>, SourceError> {
        let sql = format!("SELECT {SONG_COLUMNS} FROM songs WHERE isrc = ? LIMIT 1");
        let row = sqlx::query_as::<_, SongRow>(&sql)
            .bind(isrc.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Song::from))
    }

    async fn find_by_title_artist(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Vec<Song>, SourceError> {
        let sql = format!(
            "SELECT {SONG_COLUMNS} FROM songs \
             WHERE title = ? COLLATE NOCASE AND artist = ? COLLATE NOCASE ORDER BY id"
        );
        let rows = sqlx::query_as::<_, SongRow>(&sql)
            .bind(title.trim())
            .bind(artist.trim())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Song::from).collect())
    }

    async fn update(&self, song: &Song) -> Result<(), SourceError> {
        let result = sqlx::query(
            r#"
            UPDATE songs SET
                title = ?, artist = ?, artists = ?, album = ?, isrc = ?, duration_ms = ?,
                release_date = ?, image_url = ?, popularity = ?, explicit = ?,
                platform_links = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&song.title)
        .bind(&song.artist)
        .bind(encode_json(&song.artists)?)
        .bind(&song.album)
        .bind(&song.isrc)
        .bind(song.duration_ms as i64)
        .bind(&song.release_date)
        .bind(&song.image_url)
        .bind(song.popularity as i64)
        .bind(song.explicit)
        .bind(encode_json(&song.platform_links)?)
        .bind(timestamp(Utc::now()))
        .bind(song.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SourceError::NotFound);
        }
        Ok(())
    }

    async fn insert(&self, song: &Song) -> Result<i64, SourceError> {
        let now = timestamp(Utc::now());
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO songs (title, artist, artists, album, isrc, duration_ms, release_date,
                               image_url, popularity, explicit, platform_links,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&song.title)
        .bind(&song.artist)
        .bind(encode_json(&song.artists)?)
        .bind(&song.album)
        .bind(song.isrc.as_ref().map(|s| s.trim().to_uppercase()))
        .bind(song.duration_ms as i64)
        .bind(&song.release_date)
        .bind(&song.image_url)
        .bind(song.popularity as i64)
        .bind(song.explicit)
        .bind(encode_json(&song.platform_links)?)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}
