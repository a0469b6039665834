//! Music Search - song search across a local catalog and streaming platforms.
//!
//! A query fans out to the local datastore and every healthy platform,
//! results are deduplicated into logical songs and ranked, and follow-up
//! work (filling missing platform links, indexing new tracks) runs in the
//! background. Results are cached in three tiers.
//!
//! Start from [`search::Coordinator`] for grouped results or
//! [`search::Engine`] for flat ones.

pub mod background;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod search;
pub mod sources;
#[cfg(test)]
pub mod test_utils;
