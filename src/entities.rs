use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// Short filename keys and the long names queries use for them.
const ENTITY_NAMES: &[(&str, &str)] = &[
    ("sub", "subject"),
    ("ses", "session"),
    ("sample", "sample"),
    ("task", "task"),
    ("tracksys", "tracksys"),
    ("acq", "acquisition"),
    ("nuc", "nucleus"),
    ("voi", "volume"),
    ("ce", "ceagent"),
    ("trc", "tracer"),
    ("stain", "stain"),
    ("rec", "reconstruction"),
    ("dir", "direction"),
    ("run", "run"),
    ("mod", "modality"),
    ("echo", "echo"),
    ("flip", "flip"),
    ("inv", "inversion"),
    ("mt", "mtransfer"),
    ("part", "part"),
    ("proc", "processing"),
    ("hemi", "hemisphere"),
    ("space", "space"),
    ("split", "split"),
    ("recording", "recording"),
    ("chunk", "chunk"),
    ("seg", "segmentation"),
    ("res", "resolution"),
    ("den", "density"),
    ("label", "label"),
    ("desc", "description"),
    ("atlas", "atlas"),
    ("roi", "roi"),
    ("model", "model"),
    ("from", "from"),
    ("to", "to"),
];

/// Entities whose values are compared as integers when both sides parse.
pub const INTEGER_ENTITIES: &[&str] = &["run", "echo", "flip", "inversion", "split", "chunk"];

const DATATYPES: &[&str] = &[
    "anat", "func", "dwi", "fmap", "perf", "meg", "eeg", "ieeg", "beh", "pet", "micr", "nirs",
    "motion", "mrs",
];

/// Entities parsed out of one BIDS path, keyed by long name.
/// `suffix`, `extension` and (when known) `datatype` live in the same map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities(BTreeMap<String, String>);

impl Entities {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

pub fn long_name(short: &str) -> &str {
    ENTITY_NAMES
        .iter()
        .find(|(s, _)| *s == short)
        .map(|(_, long)| *long)
        .unwrap_or(short)
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9]+)-([A-Za-z0-9]+)$").expect("entity segment regex is valid")
    })
}

fn suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").expect("suffix regex is valid"))
}

/// Parse a file name like `sub-01_ses-02_task-rest_bold.nii.gz`.
///
/// The extension is everything from the first dot. The stem is `_`-separated:
/// every segment but the last must be `key-value`, the last is the suffix.
pub fn parse_file_name(file_name: &str) -> Result<Entities> {
    let (stem, extension) = match file_name.find('.') {
        Some(0) => return Err(anyhow!("Hidden file is not a BIDS file: {file_name}")),
        Some(i) => (&file_name[..i], &file_name[i..]),
        None => (file_name, ""),
    };

    let mut segments: Vec<&str> = stem.split('_').collect();
    let suffix = segments
        .pop()
        .filter(|s| suffix_regex().is_match(s))
        .ok_or_else(|| anyhow!("Missing or malformed suffix in {file_name}"))?;

    let mut entities = Entities::default();
    for seg in segments {
        let caps = segment_regex()
            .captures(seg)
            .ok_or_else(|| anyhow!("Malformed entity segment {seg:?} in {file_name}"))?;
        let key = long_name(&caps[1]);
        if entities.get(key).is_some() {
            return Err(anyhow!("Duplicate entity {key:?} in {file_name}"));
        }
        entities.insert(key, &caps[2]);
    }
    entities.insert("suffix", suffix);
    if !extension.is_empty() {
        entities.insert("extension", extension);
    }
    Ok(entities)
}

/// Parse a file's entities, filling in what the directory path implies:
/// the datatype folder, plus subject/session for files that do not name them.
pub fn parse_path(path: &Path, dataset_root: &Path) -> Result<Entities> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Non-UTF8 filename not supported: {}", path.display()))?;
    let mut entities = parse_file_name(file_name)?;

    let rel_dir = path
        .parent()
        .unwrap_or(dataset_root)
        .strip_prefix(dataset_root)
        .with_context(|| format!("{} is outside {}", path.display(), dataset_root.display()))?;

    for component in rel_dir.iter().filter_map(|c| c.to_str()) {
        if let Some(label) = component.strip_prefix("sub-") {
            if entities.get("subject").is_none() {
                entities.insert("subject", label);
            }
        } else if let Some(label) = component.strip_prefix("ses-") {
            if entities.get("session").is_none() {
                entities.insert("session", label);
            }
        }
    }

    if let Some(dir) = rel_dir.file_name().and_then(|s| s.to_str()) {
        if DATATYPES.contains(&dir) {
            entities.insert("datatype", dir);
        }
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_name() {
        let e = parse_file_name("sub-01_ses-02_task-rest_run-1_bold.nii.gz").unwrap();
        assert_eq!(e.get("subject"), Some("01"));
        assert_eq!(e.get("session"), Some("02"));
        assert_eq!(e.get("task"), Some("rest"));
        assert_eq!(e.get("run"), Some("1"));
        assert_eq!(e.get("suffix"), Some("bold"));
        assert_eq!(e.get("extension"), Some(".nii.gz"));
    }

    #[test]
    fn unknown_short_keys_are_kept() {
        let e = parse_file_name("sub-01_foo-bar_T1w.nii").unwrap();
        assert_eq!(e.get("foo"), Some("bar"));
    }

    #[test]
    fn top_level_files_parse_without_entities() {
        let e = parse_file_name("participants.tsv").unwrap();
        assert_eq!(e.get("suffix"), Some("participants"));
        assert_eq!(e.get("subject"), None);
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(parse_file_name("sub-01_badsegment_T1w.nii.gz").is_err());
        assert!(parse_file_name("sub-01_T1w-x.nii.gz").is_err());
        assert!(parse_file_name("sub-01_sub-02_T1w.nii.gz").is_err());
        assert!(parse_file_name(".DS_Store").is_err());
        assert!(parse_file_name("README.md").is_ok());
    }

    #[test]
    fn path_supplies_datatype_and_inherited_subject() {
        let root = Path::new("/ds");
        let e = parse_path(Path::new("/ds/sub-03/ses-1/func/task-rest_bold.json"), root).unwrap();
        assert_eq!(e.get("subject"), Some("03"));
        assert_eq!(e.get("session"), Some("1"));
        assert_eq!(e.get("datatype"), Some("func"));
    }

    #[test]
    fn filename_entities_win_over_directories() {
        let root = Path::new("/ds");
        let e = parse_path(Path::new("/ds/sub-03/anat/sub-04_T1w.nii.gz"), root).unwrap();
        assert_eq!(e.get("subject"), Some("04"));
        assert_eq!(e.get("datatype"), Some("anat"));
    }
}
