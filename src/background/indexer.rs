//! Opportunistic persistence of platform tracks into the local datastore.
//!
//! Candidates are ranked by a "worth keeping" priority and only the top few
//! per query are indexed. Each is checked against the datastore (by ISRC,
//! then title and artist) before insertion. Indexing is best effort: two
//! concurrent queries may race to insert the same track.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::db::Song;
use crate::error::SourceError;
use crate::model::{GroupedSearchResult, SearchResult, platform};
use crate::search::grouping::{generate_key, group_id};
use crate::sources::Repository;

/// Default number of candidates indexed per query.
pub const DEFAULT_TOP_N: usize = 5;

/// What indexing one candidate did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOutcome {
    Inserted(i64),
    /// Already stored under this id
    Existing(i64),
}

/// Priority of a candidate for indexing.
///
/// - popularity: up to 50 (half the popularity)
/// - position: 50 for the first result, 5 less per rank, none past 10
/// - query terms: up to 30 for the title, up to 20 for the artists
/// - completeness: ISRC 10, image 5, album 5
/// - platform: spotify 10, apple_music 8
pub fn priority(result: &SearchResult, position: usize, query: &str) -> f64 {
    let popularity = f64::from(result.popularity.min(100)) / 2.0;
    let position = if position < 10 {
        50.0 - 5.0 * position as f64
    } else {
        0.0
    };

    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    let (title_terms, artist_terms) = if terms.is_empty() {
        (0.0, 0.0)
    } else {
        let title = result.title.to_lowercase();
        let artists = result.artists.join(" ").to_lowercase();
        let in_title = terms.iter().filter(|t| title.contains(t.as_str())).count();
        let in_artist = terms.iter().filter(|t| artists.contains(t.as_str())).count();
        let total = terms.len() as f64;
        (
            30.0 * in_title as f64 / total,
            20.0 * in_artist as f64 / total,
        )
    };

    let mut completeness = 0.0;
    if result.normalized_isrc().is_some() {
        completeness += 10.0;
    }
    if !result.image_url.is_empty() {
        completeness += 5.0;
    }
    if !result.album.is_empty() {
        completeness += 5.0;
    }

    let preference = match result.platform.as_str() {
        platform::SPOTIFY => 10.0,
        platform::APPLE_MUSIC => 8.0,
        _ => 0.0,
    };

    popularity + position + title_terms + artist_terms + completeness + preference
}

/// Persists the most promising platform tracks of a query.
pub struct Indexer {
    repository: Arc<dyn Repository>,
    top_n: usize,
}

impl Indexer {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// The top-N platform candidates worth indexing, best first.
    ///
    /// Local results are skipped, and so is any candidate whose song is
    /// already present in a group that has a local copy. At most one
    /// candidate per logical song is kept.
    pub fn select(
        &self,
        query: &str,
        candidates: &[SearchResult],
        groups: &[GroupedSearchResult],
    ) -> Vec<SearchResult> {
        let local_groups: HashSet<&str> = groups
            .iter()
            .filter(|g| g.has_local_link)
            .map(|g| g.id.as_str())
            .collect();

        let mut scored: Vec<(f64, usize, &SearchResult)> = candidates
            .iter()
            .filter(|c| !c.is_local())
            .enumerate()
            .map(|(position, c)| (priority(c, position, query), position, c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut seen = HashSet::new();
        scored
            .into_iter()
            .filter(|(_, _, c)| {
                let id = group_id(&generate_key(c));
                !local_groups.contains(id.as_str()) && seen.insert(id)
            })
            .take(self.top_n)
            .map(|(_, _, c)| c.clone())
            .collect()
    }

    /// Persist one candidate unless it is already stored.
    pub async fn index(&self, candidate: &SearchResult) -> Result<IndexOutcome, SourceError> {
        if let Some(isrc) = candidate.normalized_isrc()
            && let Some(existing) = self.repository.find_by_isrc(&isrc).await?
        {
            return Ok(IndexOutcome::Existing(existing.id));
        }

        let by_name = self
            .repository
            .find_by_title_artist(&candidate.title, candidate.primary_artist())
            .await?;
        if let Some(existing) = by_name.first() {
            return Ok(IndexOutcome::Existing(existing.id));
        }

        let id = self
            .repository
            .insert(&Song::from_search_result(candidate))
            .await?;
        tracing::info!(
            target: "indexer",
            "Indexed {:?} by {:?} from {} as song {}",
            candidate.title,
            candidate.primary_artist(),
            candidate.platform,
            id
        );
        Ok(IndexOutcome::Inserted(id))
    }
}
