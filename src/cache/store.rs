//! Durable per-query cache tier.
//!
//! Records are keyed by the request hash and expire by TTL. Reads of an
//! expired record are misses and delete the row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use crate::db::timestamp;
use crate::error::CacheError;
use crate::model::{CacheRecord, SearchResult};

/// Durable per-query store contract.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Fetch a live record and bump its hit count.
    async fn get(&self, query_hash: &str) -> Result<Option<CacheRecord>, CacheError>;

    /// Insert or replace a record.
    async fn put(
        &self,
        query_hash: &str,
        query_text: &str,
        results: &[SearchResult],
        negative: bool,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn delete(&self, query_hash: &str) -> Result<(), CacheError>;

    /// Remove expired records, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, CacheError>;

    async fn close(&self) -> Result<(), CacheError>;
}

/// [`QueryStore`] on the `search_cache` SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteQueryStore {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct CacheRow {
    query_hash: String,
    query_text: String,
    results: String,
    is_negative: bool,
    hit_count: i64,
    created_at: String,
    expires_at: String,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CacheError::Serialize(format!("bad timestamp {value:?}: {e}")))
}

impl SqliteQueryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of rows, live or expired.
    pub async fn len(&self) -> Result<i64, CacheError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM search_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl QueryStore for SqliteQueryStore {
    async fn get(&self, query_hash: &str) -> Result<Option<CacheRecord>, CacheError> {
        let now = timestamp(Utc::now());
        let row: Option<CacheRow> = sqlx::query_as(
            r#"
            SELECT query_hash, query_text, results, is_negative, hit_count, created_at, expires_at
            FROM search_cache WHERE query_hash = ?
            "#,
        )
        .bind(query_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        if row.expires_at <= now {
            self.delete(query_hash).await?;
            return Ok(None);
        }

        sqlx::query(
            "UPDATE search_cache SET hit_count = hit_count + 1, last_hit_at = ? WHERE query_hash = ?",
        )
        .bind(&now)
        .bind(query_hash)
        .execute(&self.pool)
        .await?;

        Ok(Some(CacheRecord {
            query_hash: row.query_hash,
            query_text: row.query_text,
            results: serde_json::from_str(&row.results)?,
            negative: row.is_negative,
            hit_count: row.hit_count + 1,
            created_at: parse_time(&row.created_at)?,
            expires_at: parse_time(&row.expires_at)?,
        }))
    }

    async fn put(
        &self,
        query_hash: &str,
        query_text: &str,
        results: &[SearchResult],
        negative: bool,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let json = serde_json::to_string(results)?;

        sqlx::query(
            r#"
            INSERT INTO search_cache (query_hash, query_text, results, is_negative, hit_count,
                                      created_at, expires_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(query_hash) DO UPDATE SET
                query_text = excluded.query_text,
                results = excluded.results,
                is_negative = excluded.is_negative,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(query_hash)
        .bind(query_text)
        .bind(json)
        .bind(negative)
        .bind(timestamp(now))
        .bind(timestamp(now + ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, query_hash: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM search_cache WHERE query_hash = ?")
            .bind(query_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM search_cache WHERE expires_at <= ?")
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{platform_result, temp_db};

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_put_get_counts_hits() {
        let (pool, _dir) = temp_db().await;
        let store = SqliteQueryStore::new(pool);
        let results = vec![platform_result("spotify", "Song", "Artist", 60)];

        store.put("h1", "song", &results, false, HOUR).await.unwrap();

        let first = store.get("h1").await.unwrap().unwrap();
        assert_eq!(first.results, results);
        assert_eq!(first.hit_count, 1);
        assert!(!first.negative);

        let second = store.get("h1").await.unwrap().unwrap();
        assert_eq!(second.hit_count, 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_results() {
        let (pool, _dir) = temp_db().await;
        let store = SqliteQueryStore::new(pool);

        store.put("h1", "q", &[], true, HOUR).await.unwrap();
        let replacement = vec![platform_result("tidal", "Song", "Artist", 10)];
        store.put("h1", "q", &replacement, false, HOUR).await.unwrap();

        let record = store.get("h1").await.unwrap().unwrap();
        assert!(!record.negative);
        assert_eq!(record.results.len(), 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_record_is_a_miss() {
        let (pool, _dir) = temp_db().await;
        let store = SqliteQueryStore::new(pool);

        store.put("h1", "q", &[], false, Duration::ZERO).await.unwrap();
        assert!(store.get("h1").await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (pool, _dir) = temp_db().await;
        let store = SqliteQueryStore::new(pool);

        store.put("old", "q", &[], false, Duration::ZERO).await.unwrap();
        store.put("new", "q", &[], false, HOUR).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let (pool, _dir) = temp_db().await;
        let store = SqliteQueryStore::new(pool);

        store.put("h1", "q", &[], false, HOUR).await.unwrap();
        store.delete("h1").await.unwrap();
        assert!(store.get("h1").await.unwrap().is_none());
    }
}
