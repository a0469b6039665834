//! Search command.

use std::path::Path;

use clap::Args;
use tokio::runtime::Runtime;

use super::Services;
use crate::config::Config;
use crate::model::{GroupedSearchResult, SearchRequest, SearchResponse};

/// Arguments of `search`.
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Free-text query
    #[arg(default_value = "")]
    pub query: String,
    /// Title to match
    #[arg(long)]
    pub title: Option<String>,
    /// Artist to match
    #[arg(long)]
    pub artist: Option<String>,
    /// Album to match
    #[arg(long)]
    pub album: Option<String>,
    /// Restrict to one platform (e.g. spotify, local)
    #[arg(long)]
    pub platform: Option<String>,
    /// Maximum results (1-50)
    #[arg(short, long, default_value = "10")]
    pub limit: usize,
    /// Show the score breakdown of each result
    #[arg(long)]
    pub debug: bool,
    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn to_request(&self) -> SearchRequest {
        SearchRequest {
            query: self.query.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            platform: self.platform.clone(),
            limit: self.limit,
            debug: self.debug,
        }
    }
}

/// Run a grouped search and print the results
pub fn cmd_search(
    rt: &Runtime,
    config: &Config,
    db_path: Option<&Path>,
    args: &SearchArgs,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let services = Services::open(config, db_path).await?;
        let response = services.coordinator.search(args.to_request()).await;
        // Let background work for this query finish before exiting.
        services.close().await;
        let response = response?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            print_response(&response);
        }
        Ok(())
    })
}

fn print_response(response: &SearchResponse<GroupedSearchResult>) {
    if response.results.is_empty() {
        println!("No results ({})", response.duration);
        return;
    }

    for (i, group) in response.results.iter().enumerate() {
        let local = if group.has_local_link { " [local]" } else { "" };
        println!(
            "{:>2}. {} - {} ({}){} score {:.1}",
            i + 1,
            group.artists.join(", "),
            group.title,
            if group.album.is_empty() { "-" } else { group.album.as_str() },
            local,
            group.score
        );
        for link in &group.links {
            println!("      {}: {}", link.platform, link.url);
        }
        if let Some(debug) = &group.debug {
            println!(
                "      text {:.1} + popularity {:.1} (from {}) x {:.2} ({}) + bonus {:.0}",
                debug.text_match,
                debug.popularity_contribution,
                debug.popularity_input,
                debug.platform_multiplier,
                debug.representative_platform,
                debug.bonus
            );
        }
    }

    println!(
        "\n{} results in {}{}",
        response.total,
        response.duration,
        if response.from_cache { " (cached)" } else { "" }
    );
}
