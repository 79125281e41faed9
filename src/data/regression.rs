//! JSON-indexed regression dataset (CIMT).
//!
//! The metadata file comes in several shapes: a mapping keyed by subject id, or
//! a sequence of records that may or may not carry an `id` field. Field names
//! for the target and for the image files vary between exports, so every
//! lookup goes through an ordered accessor list where the first hit wins.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::dataset::{seeded_split, DatasetSplit, LabeledSample, Target};
use crate::error::{NeurolensError, Result};
use crate::modality::Modality;

pub const DEFAULT_TARGET_FIELD: &str = "thickness";
/// Tried after the configured target field, in order.
pub const TARGET_FALLBACK_FIELDS: [&str; 3] = ["thickness_mm", "CIMT", "cimt_mm"];
pub const IMAGE_PATH_FIELDS: [&str; 7] = [
    "left_eye",
    "right_eye",
    "left_image",
    "right_image",
    "image",
    "img",
    "fundus",
];
/// `{id}{suffix}` conventions used when no path field resolves; first existing file only.
pub const FALLBACK_SUFFIXES: [&str; 7] = ["_L.png", "_R.png", "_L.jpg", "_R.jpg", ".png", ".jpg", ".jpeg"];

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionSample {
    pub path: PathBuf,
    pub target: f32,
    pub subject: String,
}

impl LabeledSample for RegressionSample {
    fn path(&self) -> &Path {
        &self.path
    }

    fn target(&self) -> Target {
        Target::Value(self.target)
    }
}

/// Reads one named field out of a metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAccessor {
    key: String,
}

impl RecordAccessor {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// A finite number, from a JSON number or a numeric string.
    pub fn number(&self, record: &Value) -> Option<f64> {
        let v = match record.get(&self.key)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        v.is_finite().then_some(v)
    }

    /// A non-empty string.
    pub fn text<'a>(&self, record: &'a Value) -> Option<&'a str> {
        record
            .get(&self.key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Ordered accessors for the regression target: `target_field` first, then the fallbacks.
pub fn target_accessors(target_field: &str) -> Vec<RecordAccessor> {
    std::iter::once(target_field)
        .chain(TARGET_FALLBACK_FIELDS)
        .map(RecordAccessor::new)
        .collect()
}

pub fn image_accessors() -> Vec<RecordAccessor> {
    IMAGE_PATH_FIELDS.iter().map(|k| RecordAccessor::new(*k)).collect()
}

/// First accessor yielding a finite number wins.
pub fn resolve_target(record: &Value, accessors: &[RecordAccessor]) -> Option<f64> {
    accessors.iter().find_map(|a| a.number(record))
}

/// Subject id → metadata record, in a stable order.
#[derive(Debug, Clone, Default)]
pub struct RegressionIndex {
    ids: Vec<String>,
    records: HashMap<String, Value>,
}

fn record_id(record: &Value, position: usize) -> String {
    match record.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => position.to_string(),
    }
}

impl RegressionIndex {
    pub fn from_json(meta: Value) -> Result<Self> {
        let mut index = Self::default();

        match meta {
            Value::Object(map) => {
                for (id, record) in map {
                    index.insert(id, record);
                }
            }
            Value::Array(items) => {
                for (position, record) in items.into_iter().enumerate() {
                    let id = record_id(&record, position);
                    index.insert(id, record);
                }
            }
            other => {
                return Err(NeurolensError::DatasetIndex(format!(
                    "expected a JSON object or array, found {}",
                    match other {
                        Value::Null => "null",
                        Value::Bool(_) => "a boolean",
                        Value::Number(_) => "a number",
                        _ => "a string",
                    }
                )))
            }
        }

        Ok(index)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(serde_json::from_str(&content)?)
    }

    // Later duplicates replace the record but keep the first position.
    fn insert(&mut self, id: String, record: Value) {
        if self.records.insert(id.clone(), record).is_none() {
            self.ids.push(id);
        }
    }

    pub fn subject_ids(&self) -> &[String] {
        &self.ids
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Subject-level split: a subject's images never land on both sides.
pub fn subject_split(index: &RegressionIndex, train_ratio: f64, seed: u64) -> (Vec<String>, Vec<String>) {
    seeded_split(index.subject_ids().to_vec(), train_ratio, seed)
}

/// Image files for one subject. Path fields first; the filename conventions
/// only when none of them names an existing file.
fn subject_images(id: &str, record: &Value, image_dir: &Path, accessors: &[RecordAccessor]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut paths = Vec::new();

    for name in accessors.iter().filter_map(|a| a.text(record)) {
        let candidate = image_dir.join(name);
        if candidate.is_file() && seen.insert(candidate.clone()) {
            paths.push(candidate);
        }
    }

    if paths.is_empty() {
        if let Some(found) = FALLBACK_SUFFIXES
            .iter()
            .map(|suffix| image_dir.join(format!("{id}{suffix}")))
            .find(|p| p.is_file())
        {
            paths.push(found);
        }
    }

    paths
}

/// Samples for `subject_ids`. Subjects missing from the index, without a
/// usable target or without any resolvable image contribute nothing.
pub fn build_regression_dataset(
    index: &RegressionIndex,
    image_dir: &Path,
    subject_ids: &[String],
    target_field: &str,
) -> Vec<RegressionSample> {
    let targets = target_accessors(target_field);
    let images = image_accessors();
    let mut samples = Vec::new();

    for id in subject_ids {
        let Some(record) = index.get(id) else {
            continue;
        };
        let Some(target) = resolve_target(record, &targets) else {
            log::debug!("subject {id}: no usable target, skipped");
            continue;
        };

        let paths = subject_images(id, record, image_dir, &images);
        if paths.is_empty() {
            log::debug!("subject {id}: no image found, skipped");
        }

        samples.extend(paths.into_iter().map(|path| RegressionSample {
            path,
            target: target as f32,
            subject: id.clone(),
        }));
    }

    samples
}

/// Load the index, split subjects and build both sides.
pub fn load_regression_split(
    index_path: &Path,
    image_dir: &Path,
    target_field: &str,
    train_ratio: f64,
    seed: u64,
) -> Result<DatasetSplit<RegressionSample>> {
    let index = RegressionIndex::load(index_path)?;
    let (train_ids, val_ids) = subject_split(&index, train_ratio, seed);

    let train = build_regression_dataset(&index, image_dir, &train_ids, target_field);
    let val = build_regression_dataset(&index, image_dir, &val_ids, target_field);

    log::info!(
        "[{}] subjects: train={} val={}  rows: train={} val={}",
        Modality::Cimt,
        train_ids.len(),
        val_ids.len(),
        train.len(),
        val.len()
    );

    if train.is_empty() {
        return Err(NeurolensError::NoDataFound {
            modality: Modality::Cimt.to_string(),
            root: image_dir.to_path_buf(),
        });
    }

    Ok(DatasetSplit::new(train, val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"img").unwrap();
    }

    #[test]
    fn test_mapping_with_fallback_target_field() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "s1_left.png");
        touch(dir.path(), "s1_right.png");

        let index = RegressionIndex::from_json(json!({
            "s1": { "thickness_mm": 0.72, "left_eye": "s1_left.png", "right_eye": "s1_right.png" }
        }))
        .unwrap();

        let samples = build_regression_dataset(&index, dir.path(), &["s1".to_string()], "thickness");
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| (s.target - 0.72).abs() < 1e-6 && s.subject == "s1"));
    }

    #[test]
    fn test_sequence_ids_and_numeric_strings() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "7.jpg");
        touch(dir.path(), "1_R.png");

        let index = RegressionIndex::from_json(json!([
            { "id": 7, "CIMT": "0.55" },
            { "cimt_mm": 0.9 },
            { "thickness": "n/a" }
        ]))
        .unwrap();

        assert_eq!(index.subject_ids(), &["7", "1", "2"]);

        let ids: Vec<String> = index.subject_ids().to_vec();
        let samples = build_regression_dataset(&index, dir.path(), &ids, "thickness");

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].path, dir.path().join("7.jpg"));
        assert!((samples[0].target - 0.55).abs() < 1e-6);
        assert_eq!(samples[1].path, dir.path().join("1_R.png"));
    }

    #[test]
    fn test_fallback_takes_first_existing_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "p9_L.png");
        touch(dir.path(), "p9_R.png");
        touch(dir.path(), "p9.jpg");

        let index = RegressionIndex::from_json(json!({
            "p9": { "thickness": 0.61, "image": "missing.png" }
        }))
        .unwrap();

        let samples = build_regression_dataset(&index, dir.path(), &["p9".to_string()], "thickness");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].path, dir.path().join("p9_L.png"));
    }

    #[test]
    fn test_subject_without_image_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let index = RegressionIndex::from_json(json!({ "x": { "thickness": 0.5 } })).unwrap();
        let samples = build_regression_dataset(&index, dir.path(), &["x".to_string(), "unknown".to_string()], "thickness");
        assert!(samples.is_empty());
    }

    #[test]
    fn test_non_finite_target_is_skipped() {
        let accessors = target_accessors("thickness");
        let record = json!({ "thickness": "NaN", "thickness_mm": "inf", "CIMT": 0.7 });
        assert_eq!(resolve_target(&record, &accessors), Some(0.7));
    }

    #[test]
    fn test_subject_split_is_disjoint_and_deterministic() {
        let meta: serde_json::Map<String, Value> = (0..25)
            .map(|i| (format!("subj{i}"), json!({ "thickness": 0.5 })))
            .collect();
        let index = RegressionIndex::from_json(Value::Object(meta)).unwrap();

        let (train, val) = subject_split(&index, 0.8, 42);
        let (train2, val2) = subject_split(&index, 0.8, 42);
        assert_eq!(train, train2);
        assert_eq!(val, val2);
        assert_eq!(train.len(), 20);
        assert!(train.iter().all(|id| !val.contains(id)));
    }

    #[test]
    fn test_scalar_index_is_rejected() {
        assert!(matches!(
            RegressionIndex::from_json(json!(3)),
            Err(NeurolensError::DatasetIndex(_))
        ));
    }

    #[test]
    fn test_split_without_resolvable_images_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.json");
        fs::write(
            &index_path,
            json!({
                "s1": { "thickness": 0.6, "left_eye": "missing_1.png" },
                "s2": { "thickness": 0.7, "left_eye": "missing_2.png" }
            })
            .to_string(),
        )
        .unwrap();

        let err = load_regression_split(&index_path, dir.path(), "thickness", 0.8, 42).unwrap_err();
        assert!(matches!(err, NeurolensError::NoDataFound { ref modality, .. } if modality == "cimt"));
    }
}
