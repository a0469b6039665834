//! Cache maintenance command.

use std::path::Path;

use tokio::runtime::Runtime;

use super::resolve_db_url;
use crate::cache::{DiskByteCache, QueryStore, SqliteQueryStore};
use crate::config::Config;
use crate::db;

/// Delete expired durable-tier rows and expired on-disk items
pub fn cmd_purge_cache(rt: &Runtime, config: &Config, db_path: Option<&Path>) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::init_db(&resolve_db_url(config, db_path)).await?;
        let store = SqliteQueryStore::new(pool);
        let removed = store.purge_expired().await?;
        println!("Removed {} expired search cache entries", removed);

        if let Some(dir) = &config.cache.item_dir {
            let items = DiskByteCache::new(dir)?;
            let removed = tokio::task::spawn_blocking(move || items.purge_expired()).await??;
            println!("Removed {} expired item cache files", removed);
        }

        store.close().await?;
        Ok(())
    })
}
