//! Local datastore commands.

use std::collections::BTreeMap;
use std::path::Path;

use clap::Args;
use tokio::runtime::Runtime;

use super::resolve_db_url;
use crate::config::Config;
use crate::db::{self, Song, SqliteRepository};
use crate::sources::Repository;

/// Arguments of `add`.
#[derive(Debug, Args)]
pub struct NewSong {
    /// Track title
    #[arg(long)]
    pub title: String,
    /// Artist name (repeat for several artists)
    #[arg(long = "artist", required = true)]
    pub artists: Vec<String>,
    /// Album name
    #[arg(long, default_value = "")]
    pub album: String,
    /// ISRC
    #[arg(long)]
    pub isrc: Option<String>,
    /// Duration in milliseconds
    #[arg(long, default_value = "0")]
    pub duration_ms: u64,
    /// Popularity (0-100)
    #[arg(long, default_value = "0")]
    pub popularity: u8,
    /// Platform link as platform=url (repeatable)
    #[arg(long = "link", value_parser = parse_link)]
    pub links: Vec<(String, String)>,
}

fn parse_link(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((platform, url)) if !platform.trim().is_empty() && !url.trim().is_empty() => {
            Ok((platform.trim().to_string(), url.trim().to_string()))
        }
        _ => Err(format!("expected platform=url, got {value:?}")),
    }
}

impl NewSong {
    pub fn to_song(&self) -> Song {
        Song {
            id: 0,
            title: self.title.trim().to_string(),
            artist: self.artists.first().cloned().unwrap_or_default(),
            artists: self.artists.clone(),
            album: self.album.clone(),
            isrc: self
                .isrc
                .as_deref()
                .map(|i| i.trim().to_uppercase())
                .filter(|i| !i.is_empty()),
            duration_ms: self.duration_ms,
            release_date: String::new(),
            image_url: String::new(),
            popularity: self.popularity.min(100),
            explicit: false,
            platform_links: self.links.iter().cloned().collect::<BTreeMap<_, _>>(),
        }
    }
}

/// Insert a song unless one with the same ISRC or title and artist exists
pub fn cmd_add(
    rt: &Runtime,
    config: &Config,
    db_path: Option<&Path>,
    new_song: &NewSong,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = db::init_db(&resolve_db_url(config, db_path)).await?;
        let repository = SqliteRepository::new(pool);
        let song = new_song.to_song();

        if let Some(isrc) = &song.isrc
            && let Some(existing) = repository.find_by_isrc(isrc).await?
        {
            println!("Already stored as song {} (same ISRC)", existing.id);
            return Ok(());
        }
        if let Some(existing) = repository
            .find_by_title_artist(&song.title, &song.artist)
            .await?
            .first()
        {
            println!("Already stored as song {}", existing.id);
            return Ok(());
        }

        let id = repository.insert(&song).await?;
        println!("Added {} - {} as song {}", song.artist, song.title, id);
        Ok(())
    })
}
