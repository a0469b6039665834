//! Core data models for music search.
//!
//! Defines the request and result entities shared by every layer:
//! - [`SearchRequest`] - what the caller asked for
//! - [`SearchResult`] - one flat hit from one source
//! - [`GroupedSearchResult`] - one logical song aggregated across sources
//! - [`SearchResponse`] - what the engine/coordinator hands back
//!
//! These types carry no behavior beyond small derivations (cache key,
//! emptiness, link bookkeeping).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default number of results per request.
pub const DEFAULT_LIMIT: usize = 10;
/// Upper bound for the per-request result limit.
pub const MAX_LIMIT: usize = 50;

/// Well-known platform identifiers.
pub mod platform {
    /// The local datastore.
    pub const LOCAL: &str = "local";
    pub const SPOTIFY: &str = "spotify";
    pub const APPLE_MUSIC: &str = "apple_music";
    pub const TIDAL: &str = "tidal";
    pub const DEEZER: &str = "deezer";

    /// Display/bookkeeping order for platform sources. Unlisted platforms
    /// come after these, in registration order.
    pub const PRIORITY: &[&str] = &[SPOTIFY, APPLE_MUSIC, TIDAL, DEEZER];

    /// Position of a platform in [`PRIORITY`], or `usize::MAX` if unlisted.
    pub fn priority(name: &str) -> usize {
        PRIORITY
            .iter()
            .position(|p| *p == name)
            .unwrap_or(usize::MAX)
    }
}

/// A search request as received from the outer layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Free-text query
    pub query: String,
    /// Structured title filter
    pub title: Option<String>,
    /// Structured artist filter
    pub artist: Option<String>,
    /// Structured album filter
    pub album: Option<String>,
    /// Restrict the search to one platform
    pub platform: Option<String>,
    /// Maximum results to return (clamped to 1..=50 by [`SearchRequest::limit`])
    pub limit: usize,
    /// Attach a score breakdown to each ranked result
    pub debug: bool,
}

impl SearchRequest {
    /// Create a free-text request with the default limit.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    /// Builder-style limit setter.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Builder-style platform filter.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// The effective limit. Zero means "unset" and maps to the default.
    pub fn limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit.clamp(1, MAX_LIMIT)
        }
    }

    /// True when no text field carries anything but whitespace.
    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty()
            && [&self.title, &self.artist, &self.album]
                .iter()
                .all(|f| f.as_deref().is_none_or(|s| s.trim().is_empty()))
    }

    /// Text sent to sources and used by the scorer.
    ///
    /// The free-text query wins; otherwise the structured fields are joined.
    pub fn search_text(&self) -> String {
        let query = self.query.trim();
        if !query.is_empty() {
            return query.to_string();
        }
        [&self.title, &self.artist, &self.album]
            .iter()
            .filter_map(|f| f.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Deterministic cache key (hex SHA-256 of the normalized fields).
    ///
    /// Fields are concatenated in a fixed order. The effective limit is part
    /// of the key because sources truncate to it; `debug` is not.
    pub fn cache_key(&self) -> String {
        fn norm(s: Option<&str>) -> String {
            s.map(|v| v.trim().to_lowercase()).unwrap_or_default()
        }

        let material = format!(
            "q={}|t={}|a={}|al={}|p={}|l={}",
            norm(Some(&self.query)),
            norm(self.title.as_deref()),
            norm(self.artist.as_deref()),
            norm(self.album.as_deref()),
            norm(self.platform.as_deref()),
            self.limit()
        );

        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Already stored in the local datastore
    Local,
    /// Fetched live from an external platform
    #[default]
    Platform,
}

/// A flat, per-source search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    pub title: String,
    /// Artist names, primary artist first
    pub artists: Vec<String>,
    pub album: String,
    /// Platform identifier (see [`platform`])
    pub platform: String,
    /// Platform-native track id (may be empty)
    pub external_id: String,
    /// Canonical URL on the platform
    pub url: String,
    pub image_url: String,
    /// 0-100, platform-native scale
    pub popularity: u8,
    pub duration_ms: u64,
    /// `YYYY-MM-DD`
    pub release_date: String,
    /// May be empty: not every platform or track carries one
    pub isrc: String,
    pub explicit: bool,
    pub available: bool,
    pub provenance: Provenance,
    /// Filled in by the ranker; zero until then
    pub relevance_score: f64,
    /// When this result was written to the cache
    pub cached_at: Option<DateTime<Utc>>,
}

impl SearchResult {
    /// First listed artist, or empty.
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_local(&self) -> bool {
        self.provenance == Provenance::Local
    }

    /// Normalized ISRC (trimmed, uppercase), or `None` when absent.
    pub fn normalized_isrc(&self) -> Option<String> {
        let isrc = self.isrc.trim();
        (!isrc.is_empty()).then(|| isrc.to_uppercase())
    }
}

/// One platform's link inside a grouped result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformLink {
    pub platform: String,
    pub url: String,
    pub available: bool,
    pub provenance: Provenance,
}

/// Score components, attached only when the caller asks for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Weighted text-match sum (title/artist/album)
    pub text_match: f64,
    /// Popularity fed into the scorer
    pub popularity_input: u8,
    /// `popularity_input * popularity_scale`
    pub popularity_contribution: f64,
    /// Platform whose view was scored
    pub representative_platform: String,
    /// Platform preference multiplier
    pub platform_multiplier: f64,
    /// Flat availability/local bonuses
    pub bonus: f64,
    pub final_score: f64,
    /// Per-platform popularity seen for the group's ISRC
    pub aggregate_inputs: Vec<(String, u8)>,
}

/// One logical song aggregating one or more [`SearchResult`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedSearchResult {
    /// Stable id derived from the dedup key
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub isrc: String,
    pub duration_ms: u64,
    pub release_date: String,
    pub image_url: String,
    /// At most one entry per platform
    pub links: Vec<PlatformLink>,
    /// Aggregate popularity, always within 0-100
    pub popularity: u8,
    pub explicit: bool,
    pub has_local_link: bool,
    pub local_url: Option<String>,
    pub score: f64,
    /// Position before ranking, last-resort tie-breaker
    pub original_index: usize,
    pub debug: Option<ScoreBreakdown>,
    /// Contributing flat results, in merge order
    #[serde(skip)]
    pub members: Vec<SearchResult>,
}

impl GroupedSearchResult {
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    pub fn link(&self, platform: &str) -> Option<&PlatformLink> {
        self.links.iter().find(|l| l.platform == platform)
    }

    pub fn has_platform(&self, platform: &str) -> bool {
        self.link(platform).is_some()
    }

    /// Insert a link, or improve the existing one for that platform.
    ///
    /// Never adds a second entry for a platform. An existing entry only
    /// takes the new URL if its own is empty, and becomes available if
    /// either side is.
    pub fn upsert_link(&mut self, link: PlatformLink) {
        match self.links.iter_mut().find(|l| l.platform == link.platform) {
            Some(existing) => {
                if existing.url.is_empty() && !link.url.is_empty() {
                    existing.url = link.url;
                }
                existing.available |= link.available;
            }
            None => self.links.push(link),
        }
    }

    /// True if any contributing platform reports the track as playable.
    pub fn is_available(&self) -> bool {
        self.links.iter().any(|l| l.available) || self.members.iter().any(|m| m.available)
    }
}

/// Response returned by the engine and the coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse<T> {
    pub results: Vec<T>,
    /// Echo of the request
    pub request: SearchRequest,
    pub total: usize,
    pub from_cache: bool,
    /// Elapsed wall time, human readable (e.g. "12.3ms")
    pub duration: String,
}

impl<T> SearchResponse<T> {
    /// An empty, non-error response.
    pub fn empty(request: SearchRequest, duration: String) -> Self {
        Self {
            results: Vec::new(),
            request,
            total: 0,
            from_cache: false,
            duration,
        }
    }
}

/// A record as kept by the durable per-query tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub query_hash: String,
    pub query_text: String,
    pub results: Vec<SearchResult>,
    /// Represents "this query returned nothing"
    pub negative: bool,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
