//! Config file discovery.

use std::path::{Path, PathBuf};

use miette::{Result, miette};

const CONFIG_NAME: &str = "config.toml";

/// Finds `config.toml` by searching from the current directory upwards.
pub fn find_config() -> Result<PathBuf> {
    find_config_from(
        &std::env::current_dir().map_err(|e| miette!("Cannot get current directory: {}", e))?,
    )
}

/// Finds `config.toml` starting from the given directory.
pub fn find_config_from(start: &Path) -> Result<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            miette!(
                "{} not found in {} or any parent directory (use --config to point at one)",
                CONFIG_NAME,
                start.display()
            )
        })
}
