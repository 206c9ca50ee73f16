//! `kitab config` - print or write the effective ranking configuration

use anyhow::{Context, Result};
use std::path::Path;

use kitab::config::{self, RankingConfig};

pub fn execute(path: Option<&Path>, default: bool, write: Option<&Path>) -> Result<()> {
    let config = if default {
        RankingConfig::default()
    } else {
        config::load(path)?
    };

    match write {
        Some(target) => {
            config::save(target, &config)?;
            println!("✓ Wrote {}", target.display());
        }
        None => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            print!("{rendered}");
        }
    }
    Ok(())
}
