//! Optional defaults from `.wiggle.toml`.
//!
//! Command-line flags always win; the config file only supplies defaults
//! for the handful of switches people set once and forget. `WIGGLE_CONFIG`
//! points at an alternate file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Compare line by line instead of word by word.
    pub lines: Option<bool>,
    /// Ignore blank runs when comparing.
    pub ignore_blanks: Option<bool>,
    /// Keep a `.porig` backup when replacing files.
    pub backup: Option<bool>,
    /// Annotate successfully wiggled-in changes.
    pub show_wiggles: Option<bool>,
}

fn config_path() -> PathBuf {
    std::env::var_os("WIGGLE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".wiggle.toml"))
}

/// Load defaults from the config file, if there is one.
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}
