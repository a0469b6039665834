//! Text normalization and heuristic field matching.
//!
//! Nothing here is an index: [`match_field`] compares one query against one
//! field and returns a tiered score in `0.0..=1.0`.

/// Characters dropped by [`normalize`].
const STRIPPED: &[char] = &['\'', '"', '-', '_', '.', ',', '!', '?'];

/// Match tiers, highest first.
pub const EXACT: f64 = 1.0;
pub const PREFIX: f64 = 0.9;
pub const SUBSTRING: f64 = 0.7;
pub const ALL_WORDS: f64 = 0.8;
pub const HALF_WORDS: f64 = 0.6;
pub const SOME_WORDS: f64 = 0.4;
/// Single-character-substitution hit for a one-word query
pub const FUZZY_SUBSTITUTION: f64 = 0.6;
/// Ceiling for any fuzzy score; strictly below [`SUBSTRING`]
pub const FUZZY_CAP: f64 = 0.69;

/// Normalize text for identity keys and similarity.
///
/// Lowercases, maps `&` to `and`, drops `'"-_.,!?` and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase().replace('&', " and ");
    let stripped: String = lowered.chars().filter(|c| !STRIPPED.contains(c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Score how well `field` matches `query`.
///
/// Tiers: exact 1.0, prefix 0.9, substring 0.7. Multi-word queries then
/// fall back to word overlap (all 0.8, at least half 0.6, some 0.4) over
/// [`normalize`]d words, and single-word queries to a bounded fuzzy match
/// below 0.7.
pub fn match_field(query: &str, field: &str) -> f64 {
    let query = query.trim().to_lowercase();
    let field = field.trim().to_lowercase();
    if query.is_empty() || field.is_empty() {
        return 0.0;
    }

    if field == query {
        return EXACT;
    }
    if field.starts_with(&query) {
        return PREFIX;
    }
    if field.contains(&query) {
        return SUBSTRING;
    }

    let normalized = normalize(&query);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.len() > 1 {
        word_overlap(&words, &normalize(&field))
    } else {
        fuzzy(&query, &field)
    }
}

fn word_overlap(words: &[&str], field: &str) -> f64 {
    let field_words: Vec<&str> = field.split_whitespace().collect();
    let matched = words.iter().filter(|w| field_words.contains(w)).count();

    if matched == words.len() {
        ALL_WORDS
    } else if matched * 2 >= words.len() && matched > 0 {
        HALF_WORDS
    } else if matched > 0 {
        SOME_WORDS
    } else {
        0.0
    }
}

/// Fuzzy score for a single-word query, always below [`SUBSTRING`].
fn fuzzy(word: &str, field: &str) -> f64 {
    let word: Vec<char> = word.chars().collect();
    let field_chars: Vec<char> = field.chars().collect();

    if word.len() >= 3 && substitution_match(&word, &field_chars) {
        return FUZZY_SUBSTITUTION;
    }

    let best = field
        .split_whitespace()
        .map(|candidate| common_prefix(&word, candidate) as f64 / word.len() as f64)
        .fold(0.0, f64::max);

    if best >= 0.5 {
        (best * 0.5).min(FUZZY_CAP)
    } else {
        0.0
    }
}

/// True if some window of `haystack` equals `needle` with at most one
/// substituted character.
fn substitution_match(needle: &[char], haystack: &[char]) -> bool {
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| {
        window
            .iter()
            .zip(needle)
            .filter(|(a, b)| a != b)
            .take(2)
            .count()
            <= 1
    })
}

fn common_prefix(word: &[char], candidate: &str) -> usize {
    word.iter()
        .zip(candidate.chars())
        .take_while(|(a, b)| **a == *b)
        .count()
}
