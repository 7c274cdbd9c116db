use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::entities::{Entities, INTEGER_ENTITIES};

/// Anything that can answer "which files match these filters in this scope".
pub trait DatasetQuery {
    fn query(&self, scope: &Scope, filters: &FilterMap) -> Result<Vec<PathBuf>>;
}

/// Which part of a dataset a query looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Raw,
    Derivatives,
    Pipeline(String),
}

impl Scope {
    pub fn parse(s: &str) -> Self {
        match s {
            "all" => Scope::All,
            "raw" | "self" => Scope::Raw,
            "derivatives" => Scope::Derivatives,
            name => Scope::Pipeline(name.to_string()),
        }
    }

    /// `pipeline` is `None` for the raw dataset.
    pub fn includes(&self, pipeline: Option<&str>) -> bool {
        match (self, pipeline) {
            (Scope::All, _) => true,
            (Scope::Raw, None) => true,
            (Scope::Derivatives, Some(_)) => true,
            (Scope::Pipeline(name), Some(p)) => name == p,
            _ => false,
        }
    }
}

/// Only `extension` accepts an enumerated set; other options are taken verbatim.
const SET_KEYS: &[&str] = &["extension"];

/// One filter value: a single string or an enumerated set such as `[.nii, .nii.gz]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterValue(Vec<String>);

impl FilterValue {
    pub fn single(raw: &str) -> Self {
        FilterValue(vec![raw.to_string()])
    }

    pub fn parse_set(raw: &str) -> Self {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed);
        let values = inner
            .split(',')
            .map(|v| v.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|v| !v.is_empty())
            .collect();
        FilterValue(values)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

/// Entity filters for a query. Only set options end up here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterMap(BTreeMap<String, FilterValue>);

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, raw: &str) {
        let value = if SET_KEYS.contains(&key) {
            FilterValue::parse_set(raw)
        } else {
            FilterValue::single(raw)
        };
        self.0.insert(key.to_string(), value);
    }

    /// Insert only when the option was given.
    pub fn insert_opt(&mut self, key: &str, raw: Option<&str>) {
        if let Some(v) = raw {
            self.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when every filter is satisfied by `entities`.
    pub fn matches(&self, entities: &Entities) -> bool {
        self.0.iter().all(|(key, wanted)| match entities.get(key) {
            Some(have) => wanted.values().iter().any(|w| value_matches(key, w, have)),
            None => false,
        })
    }
}

fn value_matches(key: &str, wanted: &str, have: &str) -> bool {
    match key {
        "extension" => normalize_extension(wanted) == have,
        k if INTEGER_ENTITIES.contains(&k) => match (wanted.parse::<u64>(), have.parse::<u64>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => wanted == have,
        },
        _ => wanted == have,
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}
