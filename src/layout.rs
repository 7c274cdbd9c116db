use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::entities::{parse_path, Entities};
use crate::query::{DatasetQuery, FilterMap, Scope};

/// Top-level directories never indexed, on top of hidden entries.
const DEFAULT_IGNORE: &[&str] = &["code", "sourcedata", "stimuli", "models"];

const DESCRIPTION_FILE: &str = "dataset_description.json";

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub index_derivatives: bool,
    /// Extra top-level directory names to skip.
    pub ignore: Vec<String>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            index_derivatives: false,
            ignore: Vec::new(),
        }
    }
}

/// One indexed file.
#[derive(Debug, Clone)]
pub struct BidsFile {
    pub path: PathBuf,
    /// Derivative pipeline name, `None` for the raw dataset.
    pub pipeline: Option<String>,
    pub entities: Entities,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetDescription {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "GeneratedBy", default)]
    generated_by: Vec<NamedEntry>,
    #[serde(rename = "PipelineDescription")]
    pipeline_description: Option<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    #[serde(rename = "Name")]
    name: Option<String>,
}

impl DatasetDescription {
    fn pipeline_name(&self) -> Option<&str> {
        self.generated_by
            .first()
            .and_then(|g| g.name.as_deref())
            .or_else(|| self.pipeline_description.as_ref()?.name.as_deref())
    }
}

/// In-memory index of a BIDS dataset and its derivatives.
#[derive(Debug)]
pub struct BidsLayout {
    files: Vec<BidsFile>,
}

impl BidsLayout {
    pub fn index(root: &Path, opts: &LayoutOptions) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("Directory {} does not exist", root.display()));
        }

        match read_description(root)? {
            Some(desc) => debug!(
                "Indexing dataset {:?} at {}",
                desc.name.unwrap_or_default(),
                root.display()
            ),
            None => warn!(
                "{} has no {DESCRIPTION_FILE}; indexing it anyway",
                root.display()
            ),
        }

        let mut files = Vec::new();
        index_dataset(root, None, opts, &mut files)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!("Indexed {} files under {}", files.len(), root.display());

        Ok(Self { files })
    }

    pub fn files(&self) -> &[BidsFile] {
        &self.files
    }
}

impl DatasetQuery for BidsLayout {
    fn query(&self, scope: &Scope, filters: &FilterMap) -> Result<Vec<PathBuf>> {
        let mut hits: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|f| scope.includes(f.pipeline.as_deref()))
            .filter(|f| filters.matches(&f.entities))
            .map(|f| f.path.clone())
            .collect();
        hits.dedup();
        debug!("Query {scope:?} {filters:?} -> {} hits", hits.len());
        Ok(hits)
    }
}

fn read_description(dir: &Path) -> Result<Option<DatasetDescription>> {
    let path = dir.join(DESCRIPTION_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let txt = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let desc = serde_json::from_str(&txt)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(desc))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn index_dataset(
    root: &Path,
    pipeline: Option<String>,
    opts: &LayoutOptions,
    out: &mut Vec<BidsFile>,
) -> Result<()> {
    let skip_top_level = |entry: &DirEntry| {
        if entry.depth() != 1 || !entry.file_type().is_dir() {
            return false;
        }
        let lossy = entry.file_name().to_string_lossy();
        let name: &str = &lossy;
        name == "derivatives"
            || DEFAULT_IGNORE.contains(&name)
            || opts.ignore.iter().any(|i| i == name)
    };

    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(is_hidden(e) || skip_top_level(e)));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match parse_path(entry.path(), root) {
            Ok(entities) => out.push(BidsFile {
                path: entry.path().to_path_buf(),
                pipeline: pipeline.clone(),
                entities,
            }),
            Err(e) => debug!("Skipping {}: {e}", entry.path().display()),
        }
    }

    let derivatives = root.join("derivatives");
    if opts.index_derivatives && derivatives.is_dir() {
        index_derivatives(&derivatives, opts, out)?;
    }
    Ok(())
}

/// `derivatives/` is either one pipeline itself or a folder of pipelines.
fn index_derivatives(dir: &Path, opts: &LayoutOptions, out: &mut Vec<BidsFile>) -> Result<()> {
    if let Some(desc) = read_description(dir)? {
        let name = desc.pipeline_name().unwrap_or("derivatives").to_string();
        return index_dataset(dir, Some(name), opts, out);
    }

    let mut pipelines: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .and_then(|s| s.to_str())
                .map(|s| !s.starts_with('.'))
                .unwrap_or(false)
        })
        .collect();
    pipelines.sort();

    for pipeline_dir in pipelines {
        let dir_name = pipeline_dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = read_description(&pipeline_dir)?
            .and_then(|d| d.pipeline_name().map(str::to_string))
            .unwrap_or(dir_name);
        debug!("Indexing derivative pipeline {name:?} at {}", pipeline_dir.display());
        index_dataset(&pipeline_dir, Some(name), opts, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"").unwrap();
    }

    fn dataset() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join(DESCRIPTION_FILE), r#"{"Name": "demo", "BIDSVersion": "1.9.0"}"#)
            .unwrap();
        touch(root, "participants.tsv");
        touch(root, "sub-01/anat/sub-01_T1w.nii.gz");
        touch(root, "sub-01/anat/sub-01_T1w.json");
        touch(root, "sub-01/func/sub-01_task-rest_run-1_bold.nii.gz");
        touch(root, "sub-02/anat/sub-02_T1w.nii.gz");
        touch(root, "sourcedata/sub-01/anat/sub-01_T1w.nii.gz");
        touch(root, ".git/sub-01_T1w.nii.gz");
        touch(root, "derivatives/fmriprep/sub-01/anat/sub-01_desc-preproc_T1w.nii.gz");
        fs::write(
            root.join("derivatives/fmriprep").join(DESCRIPTION_FILE),
            r#"{"Name": "fMRIPrep output", "GeneratedBy": [{"Name": "fMRIPrep"}]}"#,
        )
        .unwrap();
        touch(root, "derivatives/freesurfer/sub-01/anat/sub-01_T1w.mgz");
        tmp
    }

    fn with_derivatives() -> LayoutOptions {
        LayoutOptions {
            index_derivatives: true,
            ..LayoutOptions::default()
        }
    }

    fn query(layout: &BidsLayout, scope: &str, filters: &[(&str, &str)]) -> Vec<PathBuf> {
        let mut map = FilterMap::new();
        for (k, v) in filters {
            map.insert(k, v);
        }
        layout.query(&Scope::parse(scope), &map).unwrap()
    }

    #[test]
    fn skips_hidden_and_ignored_directories() {
        let tmp = dataset();
        let layout = BidsLayout::index(tmp.path(), &LayoutOptions::default()).unwrap();
        assert!(layout
            .files()
            .iter()
            .all(|f| !f.path.starts_with(tmp.path().join("sourcedata"))
                && !f.path.starts_with(tmp.path().join(".git"))));
        assert!(layout
            .files()
            .iter()
            .all(|f| f.path.file_name().unwrap() != DESCRIPTION_FILE));
    }

    #[test]
    fn single_match() {
        let tmp = dataset();
        let layout = BidsLayout::index(tmp.path(), &LayoutOptions::default()).unwrap();
        let hits = query(&layout, "raw", &[("subject", "01"), ("suffix", "T1w"), ("extension", "nii.gz")]);
        assert_eq!(hits, vec![tmp.path().join("sub-01/anat/sub-01_T1w.nii.gz")]);
    }

    #[test]
    fn scopes_partition_raw_and_derivatives() {
        let tmp = dataset();
        let layout = BidsLayout::index(tmp.path(), &with_derivatives()).unwrap();
        let filters = [("subject", "01"), ("suffix", "T1w")];

        assert_eq!(query(&layout, "raw", &filters).len(), 2);
        assert_eq!(query(&layout, "derivatives", &filters).len(), 2);
        assert_eq!(query(&layout, "all", &filters).len(), 4);
        assert_eq!(
            query(&layout, "fMRIPrep", &filters),
            vec![tmp.path().join("derivatives/fmriprep/sub-01/anat/sub-01_desc-preproc_T1w.nii.gz")]
        );
        assert_eq!(
            query(&layout, "freesurfer", &filters),
            vec![tmp.path().join("derivatives/freesurfer/sub-01/anat/sub-01_T1w.mgz")]
        );
        assert!(query(&layout, "nosuchpipeline", &filters).is_empty());
    }

    #[test]
    fn derivatives_are_skipped_by_default() {
        let tmp = dataset();
        let layout = BidsLayout::index(tmp.path(), &LayoutOptions::default()).unwrap();
        assert!(layout.files().iter().all(|f| f.pipeline.is_none()));

        let hits = query(&layout, "all", &[("subject", "01"), ("suffix", "T1w"), ("extension", "nii.gz")]);
        assert_eq!(hits, vec![tmp.path().join("sub-01/anat/sub-01_T1w.nii.gz")]);
        assert!(query(&layout, "derivatives", &[("subject", "01")]).is_empty());
    }

    #[test]
    fn extra_ignore_names() {
        let tmp = dataset();
        let opts = LayoutOptions {
            ignore: vec!["sub-02".into()],
            ..LayoutOptions::default()
        };
        let layout = BidsLayout::index(tmp.path(), &opts).unwrap();
        assert!(query(&layout, "all", &[("subject", "02")]).is_empty());
    }

    #[test]
    fn missing_description_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "sub-01/anat/sub-01_T1w.nii.gz");
        let layout = BidsLayout::index(tmp.path(), &LayoutOptions::default()).unwrap();
        assert_eq!(layout.files().len(), 1);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(BidsLayout::index(&tmp.path().join("nope"), &LayoutOptions::default()).is_err());
    }
}
