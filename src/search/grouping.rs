//! Grouping and deduplication of flat results into logical songs.
//!
//! # Identity
//!
//! [`generate_key`] decides which results are "the same song":
//! - with an ISRC: `isrc:<ISRC>`
//! - without: `song:<title>:<artist>:dur<bucket>`, from the normalized title
//!   and primary artist plus the duration rounded to a 2-second bucket
//!
//! The heuristic key can under-merge minor title variants and over-merge
//! coincidental matches. It is a tunable heuristic, not an identity.
//!
//! # Merging
//!
//! Results are merged in input order into one map keyed by dedup key. Local
//! results never add a platform link; they mark the group as present
//! locally instead.

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};

use super::text::normalize;
use crate::config::RankingConfig;
use crate::model::{GroupedSearchResult, PlatformLink, SearchResult};

/// Width of a duration bucket in milliseconds.
pub const DURATION_BUCKET_MS: u64 = 2000;

/// `round(duration_ms / 2000)`.
pub fn duration_bucket(duration_ms: u64) -> u64 {
    (duration_ms + DURATION_BUCKET_MS / 2) / DURATION_BUCKET_MS
}

/// Dedup key for a result.
pub fn generate_key(result: &SearchResult) -> String {
    if let Some(isrc) = result.normalized_isrc() {
        return format!("isrc:{isrc}");
    }
    format!(
        "song:{}:{}:dur{}",
        normalize(&result.title),
        normalize(result.primary_artist()),
        duration_bucket(result.duration_ms)
    )
}

/// Stable group id: the first 16 hex digits of the key's SHA-256.
pub fn group_id(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Collapses flat results into [`GroupedSearchResult`]s.
pub struct Grouper<'a> {
    config: &'a RankingConfig,
}

impl<'a> Grouper<'a> {
    pub fn new(config: &'a RankingConfig) -> Self {
        Self { config }
    }

    /// Group results, keeping groups in first-seen order.
    ///
    /// `original_index` on each group is its first-seen position.
    pub fn group(&self, results: &[SearchResult]) -> Vec<GroupedSearchResult> {
        let mut groups: Vec<GroupedSearchResult> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for result in results {
            let key = generate_key(result);
            match by_key.get(&key) {
                Some(&idx) => merge(&mut groups[idx], result),
                None => {
                    by_key.insert(key.clone(), groups.len());
                    groups.push(new_group(&key, result, groups.len()));
                }
            }
        }

        for group in &mut groups {
            group.popularity = aggregate_popularity(group, self.config);
        }
        groups
    }
}

fn new_group(key: &str, result: &SearchResult, index: usize) -> GroupedSearchResult {
    let mut group = GroupedSearchResult {
        id: group_id(key),
        title: result.title.clone(),
        artists: result.artists.clone(),
        album: result.album.clone(),
        isrc: result.normalized_isrc().unwrap_or_default(),
        duration_ms: result.duration_ms,
        release_date: result.release_date.clone(),
        image_url: result.image_url.clone(),
        popularity: result.popularity.min(100),
        explicit: result.explicit,
        original_index: index,
        ..Default::default()
    };
    attach(&mut group, result);
    group
}

fn merge(group: &mut GroupedSearchResult, result: &SearchResult) {
    if !result.album.is_empty() && result.album.chars().count() > group.album.chars().count() {
        group.album = result.album.clone();
    }
    if group.image_url.is_empty() {
        group.image_url = result.image_url.clone();
    }
    if group.artists.is_empty() {
        group.artists = result.artists.clone();
    }
    if group.duration_ms == 0 {
        group.duration_ms = result.duration_ms;
    }
    if group.release_date.is_empty() {
        group.release_date = result.release_date.clone();
    }
    group.explicit |= result.explicit;
    attach(group, result);
}

/// Record a member's link (or local presence) and keep the member.
fn attach(group: &mut GroupedSearchResult, result: &SearchResult) {
    if result.is_local() {
        group.has_local_link = true;
        if group.local_url.is_none() && !result.url.is_empty() {
            group.local_url = Some(result.url.clone());
        }
    } else {
        group.upsert_link(PlatformLink {
            platform: result.platform.clone(),
            url: result.url.clone(),
            available: result.available,
            provenance: result.provenance,
        });
    }
    group.members.push(result.clone());
}

/// Highest popularity seen per platform among members carrying `isrc`.
pub fn platform_popularity(members: &[SearchResult], isrc: &str) -> BTreeMap<String, u8> {
    let mut seen = BTreeMap::new();
    for member in members {
        if member.normalized_isrc().as_deref() != Some(isrc) {
            continue;
        }
        let entry = seen.entry(member.platform.clone()).or_insert(0u8);
        *entry = (*entry).max(member.popularity.min(100));
    }
    seen
}

/// Aggregate popularity for a group, always within `0..=100`.
///
/// With an ISRC: weighted mean of each platform's popularity using the
/// configured aggregate weights, zero-weight platforms excluded. Falls back
/// to the highest member popularity when no platform carries weight.
/// Without an ISRC: the highest member popularity.
pub fn aggregate_popularity(group: &GroupedSearchResult, config: &RankingConfig) -> u8 {
    let max_member = group
        .members
        .iter()
        .map(|m| m.popularity.min(100))
        .max()
        .unwrap_or(group.popularity.min(100));

    if group.isrc.is_empty() {
        return max_member;
    }

    let (weighted, total) = platform_popularity(&group.members, &group.isrc)
        .into_iter()
        .map(|(platform, popularity)| (config.aggregate_weight(&platform), popularity))
        .filter(|(weight, _)| *weight > 0.0)
        .fold((0.0, 0.0), |(sum, total), (weight, popularity)| {
            (sum + weight * f64::from(popularity), total + weight)
        });

    if total <= 0.0 {
        return max_member;
    }
    (weighted / total).round().clamp(0.0, 100.0) as u8
}

/// The member whose view is fed to the scorer.
///
/// Among members sharing the group's ISRC, the most popular one (earliest
/// wins ties). Without an ISRC or any popularity data, the member behind the
/// first platform link, else the first member.
pub fn representative(group: &GroupedSearchResult) -> Option<&SearchResult> {
    if !group.isrc.is_empty() {
        let best = group
            .members
            .iter()
            .filter(|m| m.normalized_isrc().as_deref() == Some(group.isrc.as_str()))
            .filter(|m| m.popularity > 0)
            .fold(None::<&SearchResult>, |best, m| match best {
                Some(b) if b.popularity >= m.popularity => Some(b),
                _ => Some(m),
            });
        if best.is_some() {
            return best;
        }
    }

    group
        .links
        .first()
        .and_then(|link| group.members.iter().find(|m| m.platform == link.platform))
        .or_else(|| group.members.first())
}
