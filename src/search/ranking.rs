//! Relevance scoring and deterministic ranking.
//!
//! # Score
//!
//! ```text
//! text   = title*100 + sum(artist*50) + album*30     (per-field match, 0..=1)
//! score  = (text + popularity * popularity_scale) * platform_weight
//!        + 5 if available + 10 if present locally
//! ```
//!
//! # Order
//!
//! Sort by score descending. Runs of candidates whose score lies within
//! `tie_epsilon` of the run's first (highest) score are tied and re-ordered
//! by the cascade: popularity desc, title, first artist, album (all
//! lowercase ascending), then input position. Clustering against the run's
//! head keeps the order total even though "within epsilon" isn't transitive.

use std::cmp::Ordering;
use std::sync::Arc;

use super::grouping::{platform_popularity, representative};
use super::text::match_field;
use crate::config::{RankingConfig, RankingConfigProvider};
use crate::model::{GroupedSearchResult, ScoreBreakdown, SearchResult, platform};

pub const TITLE_WEIGHT: f64 = 100.0;
pub const ARTIST_WEIGHT: f64 = 50.0;
pub const ALBUM_WEIGHT: f64 = 30.0;
pub const AVAILABLE_BONUS: f64 = 5.0;
pub const LOCAL_BONUS: f64 = 10.0;

/// Anything the ranker can order.
pub trait Rankable {
    fn score(&self) -> f64;
    fn popularity(&self) -> u8;
    fn title(&self) -> &str;
    fn first_artist(&self) -> &str;
    fn album(&self) -> &str;

    /// Called with the item's input position before sorting.
    fn set_original_index(&mut self, _index: usize) {}
}

impl Rankable for GroupedSearchResult {
    fn score(&self) -> f64 {
        self.score
    }

    fn popularity(&self) -> u8 {
        self.popularity
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn first_artist(&self) -> &str {
        self.primary_artist()
    }

    fn album(&self) -> &str {
        &self.album
    }

    fn set_original_index(&mut self, index: usize) {
        self.original_index = index;
    }
}

impl Rankable for SearchResult {
    fn score(&self) -> f64 {
        self.relevance_score
    }

    fn popularity(&self) -> u8 {
        self.popularity
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn first_artist(&self) -> &str {
        self.primary_artist()
    }

    fn album(&self) -> &str {
        &self.album
    }
}

struct Keyed<T> {
    index: usize,
    title: String,
    artist: String,
    album: String,
    item: T,
}

impl<T: Rankable> Keyed<T> {
    fn new(index: usize, mut item: T) -> Self {
        item.set_original_index(index);
        Self {
            index,
            title: item.title().to_lowercase(),
            artist: item.first_artist().to_lowercase(),
            album: item.album().to_lowercase(),
            item,
        }
    }

    /// Tie-break cascade, excluding score.
    fn cascade(&self, other: &Self) -> Ordering {
        other
            .item
            .popularity()
            .cmp(&self.item.popularity())
            .then_with(|| self.title.cmp(&other.title))
            .then_with(|| self.artist.cmp(&other.artist))
            .then_with(|| self.album.cmp(&other.album))
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Order already-scored items. Input position is the last tie-breaker.
///
/// Ranking a ranked list again yields the same list.
pub fn rank<T: Rankable>(items: Vec<T>, tie_epsilon: f64) -> Vec<T> {
    let mut keyed: Vec<Keyed<T>> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| Keyed::new(i, item))
        .collect();

    keyed.sort_by(|a, b| {
        b.item
            .score()
            .total_cmp(&a.item.score())
            .then_with(|| a.cascade(b))
    });

    let mut start = 0;
    while start < keyed.len() {
        let head = keyed[start].item.score();
        let mut end = start + 1;
        while end < keyed.len() && head - keyed[end].item.score() < tie_epsilon {
            end += 1;
        }
        keyed[start..end].sort_by(|a, b| a.cascade(b));
        start = end;
    }

    keyed.into_iter().map(|k| k.item).collect()
}

/// Scores one candidate against a query under one configuration snapshot.
pub struct Scorer<'a> {
    config: &'a RankingConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a RankingConfig) -> Self {
        Self { config }
    }

    /// Weighted text match over title, each artist, and album.
    pub fn text_match(&self, query: &str, title: &str, artists: &[String], album: &str) -> f64 {
        let artists: f64 = artists
            .iter()
            .map(|a| match_field(query, a) * ARTIST_WEIGHT)
            .sum();
        match_field(query, title) * TITLE_WEIGHT + artists + match_field(query, album) * ALBUM_WEIGHT
    }

    /// Score a group through its representative member.
    ///
    /// `candidates` is the full flat candidate list; it supplies the
    /// per-platform popularity reported in the breakdown.
    pub fn score_group(
        &self,
        group: &GroupedSearchResult,
        rep: &SearchResult,
        query: &str,
        candidates: &[SearchResult],
    ) -> ScoreBreakdown {
        let rep_platform = if rep.platform.is_empty() {
            platform::LOCAL
        } else {
            rep.platform.as_str()
        };
        let aggregate_inputs = if group.isrc.is_empty() {
            Vec::new()
        } else {
            platform_popularity(candidates, &group.isrc).into_iter().collect()
        };

        self.breakdown(
            self.text_match(query, &rep.title, &rep.artists, &rep.album),
            group.popularity,
            rep_platform,
            group.is_available(),
            group.has_local_link,
            aggregate_inputs,
        )
    }

    /// Score a flat result on its own.
    pub fn score_result(&self, result: &SearchResult, query: &str) -> ScoreBreakdown {
        self.breakdown(
            self.text_match(query, &result.title, &result.artists, &result.album),
            result.popularity.min(100),
            &result.platform,
            result.available,
            result.is_local(),
            Vec::new(),
        )
    }

    fn breakdown(
        &self,
        text_match: f64,
        popularity: u8,
        platform: &str,
        available: bool,
        local: bool,
        aggregate_inputs: Vec<(String, u8)>,
    ) -> ScoreBreakdown {
        let popularity_contribution = f64::from(popularity) * self.config.popularity_scale;
        let platform_multiplier = self.config.platform_weight(platform);
        let mut bonus = 0.0;
        if available {
            bonus += AVAILABLE_BONUS;
        }
        if local {
            bonus += LOCAL_BONUS;
        }

        ScoreBreakdown {
            text_match,
            popularity_input: popularity,
            popularity_contribution,
            representative_platform: platform.to_string(),
            platform_multiplier,
            bonus,
            final_score: (text_match + popularity_contribution) * platform_multiplier + bonus,
            aggregate_inputs,
        }
    }
}

/// Scores and orders results, reading one configuration snapshot per pass.
#[derive(Clone)]
pub struct Ranker {
    config: Arc<dyn RankingConfigProvider>,
}

impl Ranker {
    pub fn new(config: Arc<dyn RankingConfigProvider>) -> Self {
        Self { config }
    }

    pub fn snapshot(&self) -> Arc<RankingConfig> {
        self.config.snapshot()
    }

    /// Score and order groups. Breakdowns are attached only when `debug`.
    pub fn rank_groups(
        &self,
        groups: Vec<GroupedSearchResult>,
        query: &str,
        candidates: &[SearchResult],
        debug: bool,
    ) -> Vec<GroupedSearchResult> {
        let config = self.config.snapshot();
        self.rank_groups_with(&config, groups, query, candidates, debug)
    }

    /// [`rank_groups`](Self::rank_groups) against an explicit snapshot.
    pub fn rank_groups_with(
        &self,
        config: &RankingConfig,
        groups: Vec<GroupedSearchResult>,
        query: &str,
        candidates: &[SearchResult],
        debug: bool,
    ) -> Vec<GroupedSearchResult> {
        let scorer = Scorer::new(config);
        let scored = groups
            .into_iter()
            .map(|mut group| {
                let breakdown = match representative(&group) {
                    Some(rep) => scorer.score_group(&group, rep, query, candidates),
                    None => ScoreBreakdown::default(),
                };
                group.score = breakdown.final_score;
                group.debug = debug.then_some(breakdown);
                group
            })
            .collect();
        rank(scored, config.tie_epsilon)
    }

    /// Score and order flat results.
    pub fn rank_results(&self, results: Vec<SearchResult>, query: &str) -> Vec<SearchResult> {
        let config = self.config.snapshot();
        let scorer = Scorer::new(&config);
        let scored = results
            .into_iter()
            .map(|mut result| {
                result.relevance_score = scorer.score_result(&result, query).final_score;
                result
            })
            .collect();
        rank(scored, config.tie_epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SharedRankingConfig, StaticRankingConfig};
    use crate::search::grouping::Grouper;
    use crate::test_utils::{BOHEMIAN_ISRC, local_result, platform_result, with_isrc};

    fn item(score: f64, popularity: u8, title: &str, artist: &str, album: &str) -> SearchResult {
        SearchResult {
            relevance_score: score,
            album: album.to_string(),
            ..platform_result("spotify", title, artist, popularity)
        }
    }

    fn titles(items: &[SearchResult]) -> Vec<String> {
        items.iter().map(|i| i.title.clone()).collect()
    }

    fn ranker() -> Ranker {
        Ranker::new(Arc::new(StaticRankingConfig::new(RankingConfig::default())))
    }

    #[test]
    fn test_score_orders_when_not_tied() {
        let ranked = rank(
            vec![item(10.0, 99, "a", "x", ""), item(20.0, 0, "b", "x", "")],
            2.5,
        );
        assert_eq!(titles(&ranked), vec!["b", "a"]);
    }

    #[test]
    fn test_tie_broken_by_popularity() {
        let ranked = rank(
            vec![item(21.0, 10, "a", "x", ""), item(20.0, 50, "b", "x", "")],
            2.5,
        );
        assert_eq!(titles(&ranked), vec!["b", "a"]);
    }

    #[test]
    fn test_tie_broken_by_title() {
        let ranked = rank(
            vec![item(21.0, 10, "Zebra", "x", ""), item(20.0, 10, "apple", "x", "")],
            2.5,
        );
        assert_eq!(titles(&ranked), vec!["apple", "Zebra"]);
    }

    #[test]
    fn test_tie_broken_by_artist() {
        let ranked = rank(
            vec![item(20.0, 10, "s", "Zed", ""), item(21.0, 10, "s", "abba", "")],
            2.5,
        );
        let artists: Vec<&str> = ranked.iter().map(|r| r.primary_artist()).collect();
        assert_eq!(artists, vec!["abba", "Zed"]);
    }

    #[test]
    fn test_tie_broken_by_album() {
        let ranked = rank(
            vec![item(21.0, 10, "s", "x", "Live"), item(20.0, 10, "s", "x", "greatest")],
            2.5,
        );
        let albums: Vec<&str> = ranked.iter().map(|r| r.album.as_str()).collect();
        assert_eq!(albums, vec!["greatest", "Live"]);
    }

    #[test]
    fn test_tie_broken_by_input_order() {
        let mut first = item(20.0, 10, "s", "x", "a");
        first.external_id = "first".to_string();
        let mut second = item(21.0, 10, "s", "x", "a");
        second.external_id = "second".to_string();

        let ranked = rank(vec![first, second], 2.5);
        assert_eq!(ranked[0].external_id, "first");
    }

    #[test]
    fn test_epsilon_measured_from_cluster_head() {
        // 30 and 28 tie, 26 is 4 below the head and ranks after both.
        let ranked = rank(
            vec![
                item(26.0, 99, "c", "x", ""),
                item(28.0, 1, "b", "x", ""),
                item(30.0, 1, "a", "x", ""),
            ],
            2.5,
        );
        assert_eq!(titles(&ranked), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_group_original_index_tracks_input_order() {
        let groups = vec![
            GroupedSearchResult {
                title: "b".to_string(),
                ..Default::default()
            },
            GroupedSearchResult {
                title: "a".to_string(),
                ..Default::default()
            },
        ];
        let ranked = rank(groups, 2.5);
        assert_eq!(ranked[0].title, "a");
        assert_eq!(ranked[0].original_index, 1);
    }

    #[test]
    fn test_bohemian_rhapsody_outranks_unrelated_exact_title() {
        let config = RankingConfig::default();
        let candidates = vec![
            platform_result("deezer", "Bohemian Rhapsody", "Some Cover Band", 40),
            with_isrc(local_result("Bohemian Rhapsody", "Queen", 90), BOHEMIAN_ISRC),
            with_isrc(platform_result("spotify", "Bohemian Rhapsody", "Queen", 85), BOHEMIAN_ISRC),
            with_isrc(
                platform_result("apple_music", "Bohemian Rhapsody", "Queen", 0),
                BOHEMIAN_ISRC,
            ),
        ];

        let groups = Grouper::new(&config).group(&candidates);
        assert_eq!(groups.len(), 2);

        let ranked = ranker().rank_groups(groups, "Bohemian Rhapsody", &candidates, true);
        assert_eq!(ranked[0].isrc, BOHEMIAN_ISRC);
        assert!(ranked[0].has_local_link);
        assert_eq!(ranked[0].links.len(), 2);
        assert!(ranked[0].score > ranked[1].score);

        let debug = ranked[0].debug.as_ref().unwrap();
        assert_eq!(debug.text_match, 100.0);
        assert_eq!(debug.popularity_input, 88);
        assert_eq!(debug.representative_platform, "local");
        assert_eq!(debug.bonus, 15.0);
        assert_eq!(
            debug.aggregate_inputs,
            vec![
                ("apple_music".to_string(), 0),
                ("local".to_string(), 90),
                ("spotify".to_string(), 85)
            ]
        );
        assert_eq!(debug.final_score, ranked[0].score);
    }

    #[test]
    fn test_debug_does_not_change_scores() {
        let candidates = vec![
            platform_result("spotify", "Song", "Artist", 40),
            platform_result("tidal", "Other Song", "Artist", 60),
        ];
        let config = RankingConfig::default();
        let plain = ranker().rank_groups(
            Grouper::new(&config).group(&candidates),
            "song",
            &candidates,
            false,
        );
        let debug = ranker().rank_groups(
            Grouper::new(&config).group(&candidates),
            "song",
            &candidates,
            true,
        );

        assert!(plain.iter().all(|g| g.debug.is_none()));
        let plain_scores: Vec<f64> = plain.iter().map(|g| g.score).collect();
        let debug_scores: Vec<f64> = debug.iter().map(|g| g.score).collect();
        assert_eq!(plain_scores, debug_scores);
    }

    #[test]
    fn test_platform_weight_scales_score() {
        let config = RankingConfig::default();
        let scorer = Scorer::new(&config);
        let spotify = scorer.score_result(&platform_result("spotify", "Song", "A", 50), "song");
        let deezer = scorer.score_result(&platform_result("deezer", "Song", "A", 50), "song");
        assert!(spotify.final_score > deezer.final_score);
        assert_eq!(spotify.popularity_contribution, 40.0);
    }

    #[test]
    fn test_hot_swapped_config_applies_to_next_pass() {
        let shared = Arc::new(SharedRankingConfig::new(RankingConfig::default()));
        let ranker = Ranker::new(shared.clone());
        let results = vec![
            platform_result("spotify", "Song", "A", 0),
            platform_result("tidal", "Song", "B", 0),
        ];

        let before = ranker.rank_results(results.clone(), "song");
        assert_eq!(before[0].platform, "spotify");

        let mut boosted = RankingConfig::default();
        boosted.platform_weights.insert("tidal".to_string(), 5.0);
        shared.replace(boosted);

        let after = ranker.rank_results(results, "song");
        assert_eq!(after[0].platform, "tidal");
    }
}
