use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::layout::LayoutOptions;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "BIDSGET_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scope used when `--scope` is not given.
    pub default_scope: String,
    /// Off by default: only the raw dataset is searched unless this is set.
    pub index_derivatives: bool,
    /// Extra top-level directory names to leave out of the index.
    pub ignore: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_scope: "all".to_string(),
            index_derivatives: false,
            ignore: Vec::new(),
        }
    }
}

impl Config {
    pub fn layout_options(&self) -> LayoutOptions {
        LayoutOptions {
            index_derivatives: self.index_derivatives,
            ignore: self.ignore.clone(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }
    let txt = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    parse_config(&txt).with_context(|| format!("Failed to parse config {}", path.display()))
}

pub fn parse_config(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt).context("Failed to parse config TOML")?;
    Ok(cfg)
}

pub fn config_path() -> Result<PathBuf> {
    if let Some(p) = env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(p));
    }
    let proj = ProjectDirs::from("org", "bidsget", "bidsget")
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(proj.config_dir().join("config.toml"))
}
