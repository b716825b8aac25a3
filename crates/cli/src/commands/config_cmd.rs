//! `statewright config`: show or initialize configuration.

use anyhow::{Context, Result};
use statewright_config::AppConfig;
use std::path::Path;

use crate::runtime::{config_path, load_config};

pub async fn run(explicit: Option<&Path>, init: bool) -> Result<()> {
    let path = config_path(explicit);

    if init {
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, AppConfig::default_toml())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default config to {}", path.display());
        }
        return Ok(());
    }

    let config = load_config(explicit)?;
    println!("# {}", path.display());
    // Debug output redacts API keys.
    println!("{config:#?}");
    Ok(())
}
