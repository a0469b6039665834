//! Weighted similarity between a known track and a platform candidate.
//!
//! Used to accept or reject title+artist search hits during enhancement.
//! Scores run 0-100: title 40, primary artist 35, album 15, duration 10.

use strsim::jaro_winkler;

use crate::model::{GroupedSearchResult, SearchResult};
use crate::search::text::normalize;

pub const TITLE_WEIGHT: f64 = 40.0;
pub const ARTIST_WEIGHT: f64 = 35.0;
pub const ALBUM_WEIGHT: f64 = 15.0;
pub const DURATION_WEIGHT: f64 = 10.0;
/// Durations further apart than this score zero
pub const DURATION_TOLERANCE_MS: u64 = 30_000;
/// Candidates must score above this to be accepted
pub const ACCEPTANCE_THRESHOLD: f64 = 70.0;

/// The fields similarity looks at.
#[derive(Debug, Clone, Copy)]
pub struct TrackRef<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub album: &'a str,
    pub duration_ms: u64,
}

impl<'a> From<&'a SearchResult> for TrackRef<'a> {
    fn from(r: &'a SearchResult) -> Self {
        Self {
            title: &r.title,
            artist: r.primary_artist(),
            album: &r.album,
            duration_ms: r.duration_ms,
        }
    }
}

impl<'a> From<&'a GroupedSearchResult> for TrackRef<'a> {
    fn from(g: &'a GroupedSearchResult) -> Self {
        Self {
            title: &g.title,
            artist: g.primary_artist(),
            album: &g.album,
            duration_ms: g.duration_ms,
        }
    }
}

fn text_similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&normalize(a), &normalize(b))
}

/// Similarity of `candidate` to `target`, 0-100.
///
/// Missing album or duration on either side earns half credit for that
/// component, so absent metadata neither sinks nor carries a match.
pub fn similarity(target: TrackRef<'_>, candidate: TrackRef<'_>) -> f64 {
    let title = text_similarity(target.title, candidate.title) * TITLE_WEIGHT;
    let artist = text_similarity(target.artist, candidate.artist) * ARTIST_WEIGHT;

    let album = if target.album.trim().is_empty() || candidate.album.trim().is_empty() {
        ALBUM_WEIGHT / 2.0
    } else {
        text_similarity(target.album, candidate.album) * ALBUM_WEIGHT
    };

    let duration = if target.duration_ms == 0 || candidate.duration_ms == 0 {
        DURATION_WEIGHT / 2.0
    } else {
        let diff = target.duration_ms.abs_diff(candidate.duration_ms);
        if diff >= DURATION_TOLERANCE_MS {
            0.0
        } else {
            DURATION_WEIGHT * (1.0 - diff as f64 / DURATION_TOLERANCE_MS as f64)
        }
    };

    (title + artist + album + duration).clamp(0.0, 100.0)
}

/// Most similar candidate scoring above `threshold`, with its score.
pub fn best_match<'c>(
    target: TrackRef<'_>,
    candidates: &'c [SearchResult],
    threshold: f64,
) -> Option<(&'c SearchResult, f64)> {
    candidates
        .iter()
        .map(|c| (c, similarity(target, c.into())))
        .filter(|(_, score)| *score > threshold)
        .fold(None, |best, (c, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((c, score)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::platform_result;

    fn track(title: &str, artist: &str, album: &str, duration_ms: u64) -> SearchResult {
        SearchResult {
            album: album.to_string(),
            duration_ms,
            ..platform_result("tidal", title, artist, 0)
        }
    }

    #[test]
    fn test_identical_tracks_score_full() {
        let a = track("Bohemian Rhapsody", "Queen", "A Night at the Opera", 354_000);
        let score = similarity((&a).into(), (&a).into());
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_punctuation_and_case_ignored() {
        let a = track("Don't Stop Me Now", "Queen", "Jazz", 209_000);
        let b = track("dont stop me now!", "QUEEN", "jazz", 210_000);
        assert!(similarity((&a).into(), (&b).into()) > 99.0);
    }

    #[test]
    fn test_duration_tolerance() {
        let a = track("Song", "Artist", "Album", 200_000);
        let near = track("Song", "Artist", "Album", 215_000);
        let far = track("Song", "Artist", "Album", 240_000);

        let near_score = similarity((&a).into(), (&near).into());
        let far_score = similarity((&a).into(), (&far).into());
        assert!((near_score - 95.0).abs() < 1e-9);
        assert!((far_score - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_album_is_half_credit() {
        let a = track("Song", "Artist", "", 200_000);
        let b = track("Song", "Artist", "Album", 200_000);
        assert!((similarity((&a).into(), (&b).into()) - 92.5).abs() < 1e-9);
    }

    #[test]
    fn test_best_match_respects_threshold() {
        let target = track("Bohemian Rhapsody", "Queen", "A Night at the Opera", 354_000);
        let candidates = vec![
            track("Radio Ga Ga", "Queen", "The Works", 343_000),
            track("Bohemian Rhapsody - Remastered", "Queen", "A Night at the Opera", 355_000),
            track("Bohemian Rhapsody", "Queen", "A Night at the Opera", 354_000),
        ];

        let (best, score) = best_match((&target).into(), &candidates, ACCEPTANCE_THRESHOLD).unwrap();
        assert_eq!(best.title, "Bohemian Rhapsody");
        assert!(score > 99.0);

        let unrelated = vec![track("Toxic", "Britney Spears", "In the Zone", 198_000)];
        assert!(best_match((&target).into(), &unrelated, ACCEPTANCE_THRESHOLD).is_none());
    }
}
