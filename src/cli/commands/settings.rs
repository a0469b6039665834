//! Configuration command.

use std::path::Path;

use anyhow::Context;

use crate::config::{self, Config};

/// Print the effective configuration, optionally writing it to `path` or
/// the default config file.
pub fn cmd_config(config: &Config, path: Option<&Path>, write: bool) -> anyhow::Result<()> {
    let target = path.map(Path::to_path_buf).or_else(config::config_path);
    if let Some(target) = &target {
        println!("# {}", target.display());
    }
    print!("{}", toml::to_string_pretty(config)?);

    if write {
        let target = target.context("Could not determine config directory")?;
        config::save_to(config, &target)?;
    }
    Ok(())
}
