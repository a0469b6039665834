//! The search path: fan-out, grouping and ranking.
//!
//! # Architecture
//!
//! ```text
//! SearchRequest
//!   │
//!   ├─► Engine::fetch ── LayeredCache ──(miss)──► fan_out ──► sources
//!   │        │
//!   │        └─ raw merged results (cached as-is)
//!   │
//!   ├─► Engine::search       flat:    rank_results
//!   └─► Coordinator::search  grouped: Grouper ─► Ranker ─► Background
//! ```
//!
//! - `text` - normalization and tiered field matching
//! - `grouping` - dedup keys and merging into logical songs
//! - `ranking` - scoring and the deterministic ordering cascade
//! - `fanout` - concurrent source queries
//! - `engine` / `coordinator` - the two entry points

pub mod coordinator;
pub mod engine;
pub mod fanout;
pub mod grouping;
pub mod ranking;
pub mod text;

pub use coordinator::{Coordinator, MAX_QUERY_CHARS};
pub use engine::{Engine, Fetched};
pub use fanout::{SourceOutcome, fan_out};
pub use grouping::{Grouper, generate_key, group_id};
pub use ranking::{Rankable, Ranker, Scorer, rank};
pub use text::{match_field, normalize};
