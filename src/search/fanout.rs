//! Concurrent fan-out of one request to every selected source.
//!
//! All sources are polled concurrently inside the caller's future and every
//! one of them is awaited; there is no early exit. Dropping the caller's
//! future drops every in-flight source call with it. Outcomes come back in
//! selection order, so merged order never depends on which source answered
//! first.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::error::SourceError;
use crate::model::{SearchRequest, SearchResult};
use crate::sources::Source;

/// What one source produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub source: String,
    /// Empty when `error` is set
    pub results: Vec<SearchResult>,
    pub error: Option<SourceError>,
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Query every source concurrently and wait for all of them.
pub async fn fan_out(sources: &[Arc<dyn Source>], request: &SearchRequest) -> Vec<SourceOutcome> {
    let calls = sources.iter().map(|source| async move {
        let started = Instant::now();
        let outcome = match source.search(request).await {
            Ok(results) => SourceOutcome {
                source: source.name().to_string(),
                results,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Source {} failed: {}", source.name(), e);
                SourceOutcome {
                    source: source.name().to_string(),
                    results: Vec::new(),
                    error: Some(e),
                }
            }
        };
        tracing::debug!(
            "Source {} returned {} results in {:?}",
            outcome.source,
            outcome.results.len(),
            started.elapsed()
        );
        outcome
    });

    join_all(calls).await
}

/// Concatenate outcomes in selection order.
///
/// A failed source contributes its items from `fallback` instead, if any.
pub fn merge(outcomes: &[SourceOutcome], fallback: &[SearchResult]) -> Vec<SearchResult> {
    let mut merged = Vec::new();
    for outcome in outcomes {
        if outcome.is_ok() {
            merged.extend(outcome.results.iter().cloned());
            continue;
        }
        let stale: Vec<SearchResult> = fallback
            .iter()
            .filter(|item| item.platform == outcome.source)
            .cloned()
            .collect();
        if !stale.is_empty() {
            tracing::debug!(
                "Using {} cached items for failed source {}",
                stale.len(),
                outcome.source
            );
            merged.extend(stale);
        }
    }
    merged
}
