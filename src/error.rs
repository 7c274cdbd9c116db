use std::path::PathBuf;

use thiserror::Error;

/// Outcomes of a query that did not resolve to exactly one file.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No file found matching the provided arguments.")]
    NoMatch,
    #[error(
        "More than one file found matching the provided arguments:\n{}\nYou can use the \"--extension\" option to select files according to file extension.",
        format_candidates(.0)
    )]
    Ambiguous(Vec<PathBuf>),
}

fn format_candidates(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}
