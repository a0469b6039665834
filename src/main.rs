//! Music Search - search one song across a local catalog and streaming platforms.

use clap::Parser;
use music_search::cli;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging. Background workers and cache tiers log under
    // their own targets.
    let mut filter = EnvFilter::from_default_env();
    for directive in [
        "music_search=info",
        "cache=info",
        "background=info",
        "enhancer=info",
        "indexer=info",
    ] {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
