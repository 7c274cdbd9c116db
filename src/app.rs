use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::{self, PathBuf};

use crate::cli::Args;
use crate::config::{config_path, load_config, Config};
use crate::error::QueryError;
use crate::layout::BidsLayout;
use crate::query::{DatasetQuery, Scope};

/// What a finished run should print.
#[derive(Debug)]
pub enum Outcome {
    Match(PathBuf),
    ConfigShown(String),
}

pub fn run(args: &Args) -> Result<Outcome> {
    if args.config {
        return show_config().map(Outcome::ConfigShown);
    }

    let cfg = load_config()?;
    let bidsdir = args
        .bidsdir
        .as_deref()
        .context("--bidsdir is required")?;
    // Symlinks stay as given so printed paths start with the user's bidsdir.
    let root = path::absolute(bidsdir)
        .with_context(|| format!("Failed to resolve {}", bidsdir.display()))?;

    let layout = BidsLayout::index(&root, &cfg.layout_options())?;
    find_single(&layout, args, &cfg).map(Outcome::Match)
}

/// Build scope and filters from the arguments, query, and require one hit.
pub fn find_single<Q: DatasetQuery>(dataset: &Q, args: &Args, cfg: &Config) -> Result<PathBuf> {
    let scope = Scope::parse(args.scope.as_deref().unwrap_or(&cfg.default_scope));
    let filters = args.filters();
    info!("Querying scope {scope:?} with {} filters", filters.len());

    let hits = dataset.query(&scope, &filters)?;
    Ok(select_single(hits)?)
}

pub fn select_single(mut hits: Vec<PathBuf>) -> Result<PathBuf, QueryError> {
    match hits.len() {
        0 => Err(QueryError::NoMatch),
        1 => Ok(hits.remove(0)),
        n => {
            debug!("{n} candidates");
            Err(QueryError::Ambiguous(hits))
        }
    }
}

fn show_config() -> Result<String> {
    let path = config_path()?;
    let mut out = format!("Config path: {}", path.display());
    if path.exists() {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        out.push_str(&format!("\n\nConfig content:\n{content}"));
    } else {
        out.push_str("\nConfig file does not exist.");
    }
    Ok(out)
}
