//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `search`: grouped or flat search
//! - `library`: adding songs to the local datastore
//! - `cache`: durable cache maintenance
//! - `settings`: printing and writing the effective configuration

mod cache;
mod library;
mod search;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

pub use cache::cmd_purge_cache;
pub use library::{NewSong, cmd_add};
pub use search::{SearchArgs, cmd_search};
pub use settings::cmd_config;

use crate::background::Background;
use crate::cache::{ByteCache, DiskByteCache, LayeredCache, MemoryByteCache, SqliteQueryStore};
use crate::config::{self, Config, SharedRankingConfig};
use crate::db::{self, SqliteRepository};
use crate::search::{Coordinator, Engine};
use crate::sources::{Repository, SourceRegistry};

/// Music Search CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path (default: music_search.db, or [database] path in the config)
    #[arg(long, global = true, env = "MUSIC_SEARCH_DB")]
    pub db: Option<PathBuf>,

    /// Config file (default: the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Search for songs
    Search(SearchArgs),
    /// Add a song to the local datastore
    Add(NewSong),
    /// Delete expired entries from the durable cache tiers
    PurgeCache,
    /// Print the effective configuration as TOML
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    match &cli.command {
        Commands::Search(args) => cmd_search(&rt, &config, cli.db.as_deref(), args),
        Commands::Add(song) => cmd_add(&rt, &config, cli.db.as_deref(), song),
        Commands::PurgeCache => cmd_purge_cache(&rt, &config, cli.db.as_deref()),
        Commands::Config { write } => cmd_config(&config, cli.config.as_deref(), *write),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Database URL from `--db`, then the config file, then the default.
pub(crate) fn resolve_db_url(config: &Config, db_path: Option<&Path>) -> String {
    db::db_url(db_path.or(config.database.path.as_deref()))
}

/// Per-item cache tier: on disk when configured, in memory otherwise.
pub(crate) fn item_cache(config: &Config) -> anyhow::Result<Arc<dyn ByteCache>> {
    Ok(match &config.cache.item_dir {
        Some(dir) => Arc::new(DiskByteCache::new(dir)?),
        None => Arc::new(MemoryByteCache::new()),
    })
}

/// Everything a search needs, wired from configuration.
pub(crate) struct Services {
    pub repository: Arc<SqliteRepository>,
    pub coordinator: Coordinator,
    pub background: Option<Arc<Background>>,
}

impl Services {
    /// Open the datastore and wire sources, cache tiers and background work.
    ///
    /// Must be called inside the runtime.
    pub async fn open(config: &Config, db_path: Option<&Path>) -> anyhow::Result<Self> {
        let pool = db::init_db(&resolve_db_url(config, db_path)).await?;
        let repository = Arc::new(SqliteRepository::new(pool.clone()));
        let shared: Arc<dyn Repository> = repository.clone();

        let registry = Arc::new(SourceRegistry::new().with_local(Arc::clone(&shared)));
        let cache = Arc::new(
            LayeredCache::new(config.cache.clone())
                .with_store(Arc::new(SqliteQueryStore::new(pool)))
                .with_items(item_cache(config)?),
        );
        let ranking = Arc::new(SharedRankingConfig::new(config.ranking.clone()));

        let background = Background::from_config(
            config,
            Arc::clone(&registry),
            Some(shared),
            Arc::clone(&cache),
        )
        .map(Arc::new);

        let mut coordinator = Coordinator::new(Engine::new(registry, cache, ranking));
        if let Some(background) = &background {
            coordinator = coordinator.with_background(Arc::clone(background));
        }

        Ok(Self {
            repository,
            coordinator,
            background,
        })
    }

    /// Let background work finish, then flush the cache.
    pub async fn close(&self) {
        if let Some(background) = &self.background {
            background.shutdown().await;
            tracing::debug!("Background work: {:?}", background.stats());
        }
        self.coordinator.engine().cache().close().await;
    }
}
