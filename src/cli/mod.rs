//! Command-line interface for music-search.
//!
//! Searches run against the local datastore, with the same cache tiers,
//! grouping, ranking and background work a server embedding the library
//! would use.

mod commands;

pub use commands::{Cli, Commands, run_command};
