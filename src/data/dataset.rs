use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{NeurolensError, Result};
use crate::modality::Modality;

/// Image extensions accepted by the folder scanners (compared lowercase).
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

pub const DEFAULT_SPLIT_SEED: u64 = 42;
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
        }
    }
}

/// Supervision attached to a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Class(usize),
    Value(f32),
}

impl Target {
    pub fn class(&self) -> Option<usize> {
        match self {
            Self::Class(c) => Some(*c),
            Self::Value(_) => None,
        }
    }

    pub fn value(&self) -> Option<f32> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Class(_) => None,
        }
    }
}

/// Anything the batch loader can turn into an (image, target) pair.
pub trait LabeledSample: Clone + Send + Sync {
    fn path(&self) -> &Path;
    fn target(&self) -> Target;
}

/// Class-labeled image found by a folder scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

impl LabeledSample for ImageSample {
    fn path(&self) -> &Path {
        &self.path
    }

    fn target(&self) -> Target {
        Target::Class(self.label)
    }
}

#[derive(Debug, Clone)]
pub struct DatasetSplit<S> {
    pub train: Vec<S>,
    pub val: Vec<S>,
}

impl<S> DatasetSplit<S> {
    pub fn new(train: Vec<S>, val: Vec<S>) -> Self {
        Self { train, val }
    }

    pub fn get(&self, split: Split) -> &[S] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
        }
    }
}

/// Directory layout of a class-labeled dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanMode {
    /// `root/train/<class>/*` and `root/val/<class>/*`
    PreSplit,
    /// `root/<class>/*`, shuffled with `seed` and cut at `train_ratio`
    Raw { train_ratio: f64, seed: u64 },
}

impl ScanMode {
    pub fn raw_default() -> Self {
        Self::Raw {
            train_ratio: DEFAULT_TRAIN_RATIO,
            seed: DEFAULT_SPLIT_SEED,
        }
    }

    /// Pre-split only when enabled and both `train/` and `val/` exist under `root`.
    pub fn detect(root: &Path, prefer_split_dirs: bool) -> Self {
        if prefer_split_dirs && root.join("train").is_dir() && root.join("val").is_dir() {
            Self::PreSplit
        } else {
            Self::raw_default()
        }
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by file name.
fn list_images(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
        .map(|e| e.into_path())
        .collect()
}

/// Scan `dir/<class>/*` for every class, in class order.
pub fn collect_class_samples(dir: &Path, classes: &[String]) -> Vec<ImageSample> {
    let mut samples = Vec::new();

    for (label, class_name) in classes.iter().enumerate() {
        let class_dir = dir.join(class_name);
        if !class_dir.is_dir() {
            log::warn!("Class folder not found, skipping: {}", class_dir.display());
            continue;
        }

        samples.extend(
            list_images(&class_dir)
                .into_iter()
                .map(|path| ImageSample { path, label }),
        );
    }

    samples
}

/// Deterministic shuffle-and-cut of `items`; `floor(len * train_ratio)` go to train.
pub fn seeded_split<T>(mut items: Vec<T>, train_ratio: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let cut = ((items.len() as f64 * train_ratio) as usize).min(items.len());
    let val = items.split_off(cut);
    (items, val)
}

/// Build the (train, val) split of a class-labeled folder dataset.
///
/// Fails with `NoDataFound` when the training side is empty.
pub fn scan_labeled_folders(
    modality: Modality,
    root: &Path,
    classes: &[String],
    mode: ScanMode,
) -> Result<DatasetSplit<ImageSample>> {
    let split = match mode {
        ScanMode::PreSplit => {
            log::info!("[{}] using split dirs under {}", modality, root.display());
            DatasetSplit::new(
                collect_class_samples(&root.join("train"), classes),
                collect_class_samples(&root.join("val"), classes),
            )
        }
        ScanMode::Raw { train_ratio, seed } => {
            log::info!(
                "[{}] using raw dirs with {:.0}/{:.0} split under {}",
                modality,
                train_ratio * 100.0,
                (1.0 - train_ratio) * 100.0,
                root.display()
            );
            let (train, val) = seeded_split(collect_class_samples(root, classes), train_ratio, seed);
            DatasetSplit::new(train, val)
        }
    };

    log::info!(
        "[{}] counts: train={} val={}",
        modality,
        split.train.len(),
        split.val.len()
    );

    if split.train.is_empty() {
        return Err(NeurolensError::NoDataFound {
            modality: modality.to_string(),
            root: root.to_path_buf(),
        });
    }

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn write_image(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])).save(path).unwrap();
    }

    fn classes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_raw_split_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        for class in ["normal", "abnormal"] {
            for i in 0..10 {
                write_image(&dir.path().join(class).join(format!("{i:02}.png")));
            }
        }
        let names = classes(&["normal", "abnormal"]);

        let a = scan_labeled_folders(Modality::Brain, dir.path(), &names, ScanMode::raw_default()).unwrap();
        let b = scan_labeled_folders(Modality::Brain, dir.path(), &names, ScanMode::raw_default()).unwrap();

        assert_eq!(a.train, b.train);
        assert_eq!(a.val, b.val);
        assert_eq!(a.train.len(), 16);
        assert_eq!(a.val.len(), 4);
    }

    #[test]
    fn test_presplit_labels_follow_class_order() {
        let dir = tempfile::tempdir().unwrap();
        write_image(&dir.path().join("train/rao/a.jpg"));
        write_image(&dir.path().join("train/normal/b.PNG"));
        write_image(&dir.path().join("val/crvo/c.png"));
        fs::write(dir.path().join("train/normal/notes.txt"), "x").unwrap();

        let names = classes(&["normal", "rao", "brvo", "crvo"]);
        assert_eq!(ScanMode::detect(dir.path(), true), ScanMode::PreSplit);
        assert!(matches!(ScanMode::detect(dir.path(), false), ScanMode::Raw { .. }));

        let split = scan_labeled_folders(Modality::Eye, dir.path(), &names, ScanMode::PreSplit).unwrap();
        let labels: Vec<usize> = split.train.iter().map(|s| s.label).collect();
        assert_eq!(labels, vec![0, 1]);
        assert_eq!(split.val.len(), 1);
        assert_eq!(split.val[0].label, 3);
    }

    #[test]
    fn test_empty_root_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_labeled_folders(
            Modality::Brain,
            dir.path(),
            &classes(&["normal", "abnormal"]),
            ScanMode::raw_default(),
        )
        .unwrap_err();
        assert!(matches!(err, NeurolensError::NoDataFound { .. }));
    }

    #[test]
    fn test_seeded_split_cut() {
        let (train, val) = seeded_split((0..7).collect::<Vec<_>>(), 0.8, 42);
        assert_eq!(train.len(), 5);
        assert_eq!(val.len(), 2);
        let (train2, _) = seeded_split((0..7).collect::<Vec<_>>(), 0.8, 42);
        assert_eq!(train, train2);
    }
}
