//! Fills in missing platform links for grouped results.
//!
//! For each tracked platform a group has no link for:
//! 1. ISRC lookup on that platform (authoritative)
//! 2. Otherwise a title + primary artist search, accepting the best hit
//!    whose [`similarity`](super::similarity) clears the threshold
//!
//! Accepted links are written to the matching local song, if there is one,
//! and the accepted track goes into the per-item cache tier. Nothing here
//! touches the response the group came from.

use std::sync::Arc;

use serde::Serialize;

use super::similarity::{ACCEPTANCE_THRESHOLD, TrackRef, best_match};
use crate::cache::LayeredCache;
use crate::db::Song;
use crate::error::SourceError;
use crate::model::{GroupedSearchResult, PlatformLink, Provenance, SearchResult, platform};
use crate::sources::{PlatformService, Repository, SourceRegistry};

/// How a missing link was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Isrc,
    Search,
}

/// A link the enhancer found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundLink {
    pub link: PlatformLink,
    pub method: MatchMethod,
    /// Similarity score; 100 for ISRC matches
    pub confidence: f64,
}

/// Outcome of one enhancement attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnhancementReport {
    pub group_id: String,
    /// Tracked platforms the group lacked
    pub missing: Vec<String>,
    pub found: Vec<FoundLink>,
    /// Platforms that errored, with the error
    pub errors: Vec<(String, String)>,
    /// Id of the local song that received the new links
    pub updated_song: Option<i64>,
}

/// Looks up missing platform links for grouped results.
pub struct Enhancer {
    registry: Arc<SourceRegistry>,
    repository: Option<Arc<dyn Repository>>,
    cache: Option<Arc<LayeredCache>>,
    tracked: Vec<String>,
    threshold: f64,
}

impl Enhancer {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            repository: None,
            cache: None,
            tracked: vec![
                platform::SPOTIFY.to_string(),
                platform::APPLE_MUSIC.to_string(),
                platform::TIDAL.to_string(),
            ],
            threshold: ACCEPTANCE_THRESHOLD,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_cache(mut self, cache: Arc<LayeredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_tracked(mut self, tracked: Vec<String>) -> Self {
        self.tracked = tracked;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Tracked platforms the group lacks and that have a registered service.
    pub fn missing_platforms(&self, group: &GroupedSearchResult) -> Vec<String> {
        self.tracked
            .iter()
            .filter(|p| !group.has_platform(p))
            .filter(|p| self.registry.service(p).is_some())
            .cloned()
            .collect()
    }

    /// Try to fill every missing tracked platform for `group`.
    ///
    /// Per-platform errors are recorded in the report; only a failed local
    /// update is returned as an error.
    pub async fn enhance(
        &self,
        group: &GroupedSearchResult,
    ) -> Result<EnhancementReport, SourceError> {
        let mut report = EnhancementReport {
            group_id: group.id.clone(),
            missing: self.missing_platforms(group),
            ..Default::default()
        };

        for name in report.missing.clone() {
            let Some(service) = self.registry.service(&name) else {
                continue;
            };
            match self.find_on(service.as_ref(), group).await {
                Ok(Some((track, method, confidence))) => {
                    tracing::debug!(
                        target: "enhancer",
                        "Found {} link for {:?} via {:?}",
                        name,
                        group.title,
                        method
                    );
                    if let Some(cache) = &self.cache {
                        cache.put_item(&track).await;
                    }
                    report.found.push(FoundLink {
                        link: PlatformLink {
                            platform: name.clone(),
                            url: if track.url.is_empty() {
                                service.build_url(&track.external_id)
                            } else {
                                track.url.clone()
                            },
                            available: track.available,
                            provenance: Provenance::Platform,
                        },
                        method,
                        confidence,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "enhancer", "Lookup on {} failed: {}", name, e);
                    report.errors.push((name.clone(), e.to_string()));
                }
            }
        }

        if !report.found.is_empty() {
            report.updated_song = self.update_local(group, &report.found).await?;
        }
        Ok(report)
    }

    /// ISRC first, then a similarity-checked search.
    async fn find_on(
        &self,
        service: &dyn PlatformService,
        group: &GroupedSearchResult,
    ) -> Result<Option<(SearchResult, MatchMethod, f64)>, SourceError> {
        if !group.isrc.is_empty() {
            match service.get_track_by_isrc(&group.isrc).await {
                Ok(mut track) => {
                    stamp(&mut track, service.platform());
                    return Ok(Some((track, MatchMethod::Isrc, 100.0)));
                }
                Err(SourceError::NotFound) => {}
                Err(e) => {
                    tracing::debug!(
                        target: "enhancer",
                        "ISRC lookup on {} failed, falling back to search: {}",
                        service.platform(),
                        e
                    );
                }
            }
        }

        let query = format!("{} {}", group.title, group.primary_artist());
        let candidates = service.search_track(query.trim()).await?;
        Ok(
            best_match(TrackRef::from(group), &candidates, self.threshold).map(|(track, score)| {
                let mut track = track.clone();
                stamp(&mut track, service.platform());
                (track, MatchMethod::Search, score)
            }),
        )
    }

    /// Add the found links to the group's local song, if one exists.
    async fn update_local(
        &self,
        group: &GroupedSearchResult,
        found: &[FoundLink],
    ) -> Result<Option<i64>, SourceError> {
        let Some(repository) = &self.repository else {
            return Ok(None);
        };

        let Some(mut song) = find_local(repository.as_ref(), group).await? else {
            return Ok(None);
        };

        let mut changed = false;
        for f in found {
            if f.link.url.is_empty() || song.platform_links.contains_key(&f.link.platform) {
                continue;
            }
            song.platform_links
                .insert(f.link.platform.clone(), f.link.url.clone());
            changed = true;
        }

        if !changed {
            return Ok(None);
        }
        repository.update(&song).await?;
        tracing::info!(
            target: "enhancer",
            "Added {} platform links to song {}",
            found.len(),
            song.id
        );
        Ok(Some(song.id))
    }
}

/// Existing local song for a group: by ISRC, then by title and artist.
pub(crate) async fn find_local(
    repository: &dyn Repository,
    group: &GroupedSearchResult,
) -> Result<Option<Song>, SourceError> {
    if !group.isrc.is_empty()
        && let Some(song) = repository.find_by_isrc(&group.isrc).await?
    {
        return Ok(Some(song));
    }
    let matches = repository
        .find_by_title_artist(&group.title, group.primary_artist())
        .await?;
    Ok(matches.into_iter().next())
}

fn stamp(track: &mut SearchResult, platform: &str) {
    if track.platform.is_empty() {
        track.platform = platform.to_string();
    }
    track.provenance = Provenance::Platform;
}
