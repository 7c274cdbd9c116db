use clap::Parser;
use std::path::PathBuf;

use crate::query::FilterMap;

/// bidsget: query a single file from a BIDS dataset.
/// Prints the path when exactly one file matches, fails otherwise.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    after_help = "Example: bidsget --bidsdir /my/bids --subject 0001 --suffix T1w"
)]
pub struct Args {
    /// Path to the BIDS directory
    #[arg(long, value_parser = existing_dir, required_unless_present = "config")]
    pub bidsdir: Option<PathBuf>,

    /// Name of subject (e.g. '0001')
    #[arg(long, required_unless_present = "config")]
    pub subject: Option<String>,

    /// Suffix present in filename (e.g. 'T1w')
    #[arg(long)]
    pub suffix: Option<String>,

    /// Extension of queried file (e.g. 'nii.gz' or '[.nii, .nii.gz]')
    #[arg(long)]
    pub extension: Option<String>,

    /// Scope (e.g. 'raw', 'derivatives', or a pipeline name) [default: all]
    #[arg(long)]
    pub scope: Option<String>,

    /// Session label
    #[arg(long)]
    pub session: Option<String>,

    /// Task label
    #[arg(long)]
    pub task: Option<String>,

    /// Run index
    #[arg(long)]
    pub run: Option<String>,

    /// Datatype folder (e.g. 'anat', 'func')
    #[arg(long)]
    pub datatype: Option<String>,

    /// Show config file path and content, then exit
    #[arg(short, long)]
    pub config: bool,

    /// More log output on stderr (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Entity filters from every set option except `bidsdir`, `scope` and the
    /// flags that only steer the tool itself.
    pub fn filters(&self) -> FilterMap {
        let mut filters = FilterMap::new();
        filters.insert_opt("subject", self.subject.as_deref());
        filters.insert_opt("session", self.session.as_deref());
        filters.insert_opt("task", self.task.as_deref());
        filters.insert_opt("run", self.run.as_deref());
        filters.insert_opt("datatype", self.datatype.as_deref());
        filters.insert_opt("suffix", self.suffix.as_deref());
        filters.insert_opt("extension", self.extension.as_deref());
        filters
    }
}

fn existing_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("Directory {s} does not exist"))
    }
}
