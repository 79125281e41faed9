use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{NeurolensError, Result};
use crate::inference::backend::BackendKind;
use crate::model::{FALLBACK_EXTRACTOR, PRIMARY_EXTRACTOR};
use crate::modality::Modality;

pub const ENV_DATA_ROOT: &str = "NL_DATA_ROOT";
pub const ENV_EYE_STROKE: &str = "NL_EYE_STROKE";
pub const ENV_CIMT_DIR: &str = "NL_CIMT_DIR";
pub const ENV_BRAIN_STROKE: &str = "NL_BRAIN_STROKE";

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Filesystem layout. Unset roots fall back to their environment variable,
/// then to a default under `data_root`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_root: Option<PathBuf>,
    pub eye_stroke_dir: Option<PathBuf>,
    pub cimt_dir: Option<PathBuf>,
    pub cimt_images: Option<PathBuf>,
    pub cimt_info: Option<PathBuf>,
    pub brain_stroke_dir: Option<PathBuf>,
    pub runs_dir: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
}

impl PathsConfig {
    pub fn data_root(&self) -> PathBuf {
        self.data_root
            .clone()
            .or_else(|| env_path(ENV_DATA_ROOT))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn eye_root(&self) -> PathBuf {
        self.eye_stroke_dir
            .clone()
            .or_else(|| env_path(ENV_EYE_STROKE))
            .unwrap_or_else(|| self.data_root().join("eye_stroke"))
    }

    pub fn cimt_dir(&self) -> PathBuf {
        self.cimt_dir
            .clone()
            .or_else(|| env_path(ENV_CIMT_DIR))
            .unwrap_or_else(|| self.data_root().join("cimt"))
    }

    pub fn cimt_images(&self) -> PathBuf {
        self.cimt_images
            .clone()
            .unwrap_or_else(|| self.cimt_dir().join("data"))
    }

    pub fn cimt_info(&self) -> PathBuf {
        self.cimt_info
            .clone()
            .unwrap_or_else(|| self.cimt_dir().join("data_info.json"))
    }

    pub fn brain_root(&self) -> PathBuf {
        self.brain_stroke_dir
            .clone()
            .or_else(|| env_path(ENV_BRAIN_STROKE))
            .unwrap_or_else(|| self.data_root().join("brain_stroke"))
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.runs_dir.clone().unwrap_or_else(|| PathBuf::from("runs"))
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| PathBuf::from("exports"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSizes {
    pub eye: usize,
    pub cimt: usize,
    pub brain: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            eye: 8,
            cimt: 8,
            brain: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Loader threads; 0 loads on the training thread.
    pub num_workers: usize,
    pub batch_sizes: BatchSizes,
}

impl HardwareConfig {
    pub fn batch_size(&self, modality: Modality) -> usize {
        match modality {
            Modality::Eye => self.batch_sizes.eye,
            Modality::Cimt => self.batch_sizes.cimt,
            Modality::Brain => self.batch_sizes.brain,
        }
    }
}

/// Per-modality dataset settings. `classes` and `class_weights` only apply
/// to classification modalities; `target` only to regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalityData {
    pub image_size: u32,
    pub classes: Vec<String>,
    pub class_weights: Option<BTreeMap<String, f32>>,
    pub use_split_subdirs: bool,
    pub target: String,
}

impl Default for ModalityData {
    fn default() -> Self {
        Self {
            image_size: 512,
            classes: Vec::new(),
            class_weights: None,
            use_split_subdirs: true,
            target: crate::data::regression::DEFAULT_TARGET_FIELD.to_string(),
        }
    }
}

impl ModalityData {
    fn for_modality(modality: Modality) -> Self {
        Self {
            classes: modality.default_classes().iter().map(|c| c.to_string()).collect(),
            use_split_subdirs: modality == Modality::Eye,
            ..Self::default()
        }
    }

    /// Weight per class index; classes missing from the map weigh 1.0.
    pub fn class_weight_vector(&self) -> Option<Vec<f32>> {
        let weights = self.class_weights.as_ref()?;
        for name in weights.keys().filter(|name| !self.classes.contains(name)) {
            log::warn!("class weight for unknown class '{name}' ignored");
        }
        Some(
            self.classes
                .iter()
                .map(|c| weights.get(c).copied().unwrap_or(1.0))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub eye: ModalityData,
    pub cimt: ModalityData,
    pub brain: ModalityData,
    pub train_ratio: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            eye: ModalityData::for_modality(Modality::Eye),
            cimt: ModalityData::for_modality(Modality::Cimt),
            brain: ModalityData::for_modality(Modality::Brain),
            train_ratio: crate::data::dataset::DEFAULT_TRAIN_RATIO,
        }
    }
}

impl DataConfig {
    pub fn modality(&self, modality: Modality) -> &ModalityData {
        match modality {
            Modality::Eye => &self.eye,
            Modality::Cimt => &self.cimt,
            Modality::Brain => &self.brain,
        }
    }
}

/// Optimizer and loop hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f32,
    pub grad_clip_norm: f32,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 2,
            learning_rate: 2e-4,
            weight_decay: 1e-2,
            grad_clip_norm: 1.0,
            seed: crate::data::dataset::DEFAULT_SPLIT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub primary_extractor: String,
    pub fallback_extractor: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary_extractor: PRIMARY_EXTRACTOR.to_string(),
            fallback_extractor: FALLBACK_EXTRACTOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub backend: BackendKind,
}

/// Whole-pipeline configuration, read from YAML. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub hardware: HardwareConfig,
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub model: ModelConfig,
    pub inference: InferenceConfig,
}

impl PipelineConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        for modality in Modality::ALL {
            if self.data.modality(modality).image_size == 0 {
                return Err(NeurolensError::InvalidConfig(format!(
                    "data.{}.image_size must be positive",
                    modality
                )));
            }
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Checkpoint directory of a modality: `{runs_dir}/{modality}_best`.
    pub fn checkpoint_dir(&self, modality: Modality) -> PathBuf {
        self.paths.runs_dir().join(modality.checkpoint_name())
    }

    pub fn export_dir(&self, modality: Modality) -> PathBuf {
        self.paths.export_dir().join(modality.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.training.epochs, 2);
        assert_eq!(config.training.learning_rate, 2e-4);
        assert_eq!(config.hardware.batch_size(Modality::Cimt), 8);
        assert_eq!(config.data.eye.classes, vec!["normal", "rao", "brvo", "crvo"]);
        assert!(config.data.eye.use_split_subdirs);
        assert!(!config.data.brain.use_split_subdirs);
        assert_eq!(config.data.cimt.target, "thickness");
        assert_eq!(config.checkpoint_dir(Modality::Eye), PathBuf::from("runs/eye_best"));
    }

    #[test]
    fn test_partial_yaml_and_round_trip() {
        let yaml = r#"
paths:
  data_root: /srv/data
  runs_dir: /srv/runs
training:
  epochs: 5
data:
  brain:
    class_weights:
      abnormal: 3.0
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.weight_decay, 1e-2);
        assert_eq!(config.paths.brain_root(), PathBuf::from("/srv/data/brain_stroke"));
        assert_eq!(config.paths.cimt_info(), PathBuf::from("/srv/data/cimt/data_info.json"));
        assert_eq!(config.data.brain.class_weight_vector(), Some(vec![1.0, 3.0]));
        assert_eq!(config.data.eye.class_weight_vector(), None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs/pipeline.yaml");
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::from_yaml(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_image_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "data:\n  cimt:\n    image_size: 0\n").unwrap();

        let err = PipelineConfig::from_yaml(&path).unwrap_err();
        assert!(matches!(err, NeurolensError::InvalidConfig(ref msg) if msg.contains("cimt.image_size")));
        assert!(PipelineConfig::default().validate().is_ok());
    }
}
