//! Loading and prefiltering the ground-truth instance database.
//!
//! A database source is a JSON map from class name to instance records.
//! Several sources may be configured; their per-class lists concatenate in
//! configured order. Prefilters run once at construction and rewrite the
//! index, so sampling never pays for them per call.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::types::InstanceRecord;
use crate::error::{AugError, Result};

/// One configured prefilter. `name` selects the filter, the remaining
/// fields parameterize it; unused fields stay at their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefilterSpec {
    pub name: String,
    /// `filter_by_difficulty`: difficulty tags to drop, any class.
    #[serde(default)]
    pub removed_difficulty: Vec<i32>,
    /// `filter_by_min_points`: `class:count` entries; count <= 0 disables.
    #[serde(default)]
    pub min_gt_points: Vec<String>,
}

const REGISTERED_PREFILTERS: [&str; 2] = ["filter_by_difficulty", "filter_by_min_points"];

/// Reject specs whose name is not in the registered table.
///
/// Called at sampler construction so a typo in a config fails the run
/// up front instead of on some later call.
pub fn validate_prefilters(specs: &[PrefilterSpec]) -> Result<()> {
    for spec in specs {
        if !REGISTERED_PREFILTERS.contains(&spec.name.as_str()) {
            return Err(AugError::Config(format!(
                "unregistered database prefilter '{}' (known: {})",
                spec.name,
                REGISTERED_PREFILTERS.join(", ")
            )));
        }
    }
    Ok(())
}

/// Split a `class:count` token into its parts.
pub fn parse_class_count(token: &str) -> Result<(String, i64)> {
    let (name, count) = token.split_once(':').ok_or_else(|| {
        AugError::Config(format!("malformed class:count entry '{token}'"))
    })?;
    let count = count.trim().parse::<i64>().map_err(|_| {
        AugError::Config(format!("malformed class:count entry '{token}'"))
    })?;
    Ok((name.to_string(), count))
}

/// In-memory instance database, one record list per configured class.
#[derive(Debug, Clone, Default)]
pub struct DatabaseIndex {
    classes: Vec<String>,
    records: HashMap<String, Vec<InstanceRecord>>,
}

impl DatabaseIndex {
    /// Load and merge the configured sources.
    ///
    /// Classes outside `class_names` are dropped; classes with no records
    /// in any source end up with an empty list (sampling soft-skips them).
    pub fn load(root: &Path, sources: &[PathBuf], class_names: &[String]) -> Result<Self> {
        let mut records: HashMap<String, Vec<InstanceRecord>> = class_names
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();

        for source in sources {
            let path = resolve(root, source);
            let raw = fs::read_to_string(&path)?;
            let parsed: HashMap<String, Vec<InstanceRecord>> = serde_json::from_str(&raw)?;
            let mut loaded = 0usize;
            for name in class_names {
                if let Some(chunk) = parsed.get(name) {
                    loaded += chunk.len();
                    records
                        .entry(name.clone())
                        .or_default()
                        .extend(chunk.iter().cloned());
                }
            }
            info!(
                "Loaded database source {}: {} records across {} classes",
                path.display(),
                loaded,
                class_names.len()
            );
        }

        Ok(DatabaseIndex {
            classes: class_names.to_vec(),
            records,
        })
    }

    /// Run the configured prefilters in order, rewriting the index.
    pub fn apply_prefilters(&mut self, specs: &[PrefilterSpec]) -> Result<()> {
        validate_prefilters(specs)?;
        for spec in specs {
            match spec.name.as_str() {
                "filter_by_difficulty" => self.filter_by_difficulty(&spec.removed_difficulty),
                "filter_by_min_points" => self.filter_by_min_points(&spec.min_gt_points)?,
                _ => unreachable!("validated above"),
            }
        }
        Ok(())
    }

    fn filter_by_difficulty(&mut self, removed: &[i32]) {
        for name in &self.classes {
            if let Some(list) = self.records.get_mut(name) {
                let pre_len = list.len();
                list.retain(|rec| !removed.contains(&rec.difficulty));
                info!(
                    "Database filter by difficulty {}: {} => {}",
                    name,
                    pre_len,
                    list.len()
                );
            }
        }
    }

    fn filter_by_min_points(&mut self, min_gt_points: &[String]) -> Result<()> {
        for token in min_gt_points {
            let (name, min_num) = parse_class_count(token)?;
            if min_num <= 0 {
                continue;
            }
            if let Some(list) = self.records.get_mut(&name) {
                let pre_len = list.len();
                list.retain(|rec| i64::from(rec.num_points_in_gt) >= min_num);
                info!(
                    "Database filter by min points {}: {} => {}",
                    name,
                    pre_len,
                    list.len()
                );
            }
        }
        Ok(())
    }

    /// Configured classes, load order preserved.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn class_records(&self, name: &str) -> Option<&[InstanceRecord]> {
        self.records.get(name).map(Vec::as_slice)
    }

    pub fn class_len(&self, name: &str) -> usize {
        self.records.get(name).map_or(0, Vec::len)
    }

    pub fn num_records(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

/// Resolve a configured path against the database root.
pub(crate) fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
