use burn::module::Module;
use burn::prelude::*;
use burn::record::{BinFileRecorder, FileRecorder, FullPrecisionSettings, Recorder};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use super::state::TrainingHistory;
use crate::error::{NeurolensError, Result};
use crate::model::{ModelBlueprint, RiskModel};
use crate::modality::Modality;

pub const EXTRACTOR_RECORD: &str = "extractor";
pub const HEAD_RECORD: &str = "head";
pub const METADATA_FILE: &str = "model.json";
pub const HISTORY_FILE: &str = "history.json";

/// Everything stored next to the weights of a best checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub modality: Modality,
    pub blueprint: ModelBlueprint,
    pub image_size: u32,
    /// Class names in head order; empty for regression.
    pub classes: Vec<String>,
    pub metric_name: String,
    pub metric: f64,
    pub epoch: usize,
}

impl CheckpointMeta {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        if !path.is_file() {
            return Err(NeurolensError::CheckpointNotFound(dir.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Trained weights together with their metadata.
#[derive(Debug)]
pub struct ModelArtifact<B: Backend> {
    pub model: RiskModel<B>,
    pub meta: CheckpointMeta,
    pub history: TrainingHistory,
}

/// How completely stored weights were applied to a freshly built model.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Every component loaded.
    Strict,
    /// Components in `skipped` kept their initial parameters.
    Partial {
        loaded: Vec<&'static str>,
        skipped: Vec<NeurolensError>,
    },
}

impl LoadOutcome {
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }

    pub fn log(&self, source: &Path) {
        match self {
            Self::Strict => log::info!("Loaded all weights from {}", source.display()),
            Self::Partial { loaded, skipped } => {
                log::warn!(
                    "Partially loaded weights from {} (loaded: {:?})",
                    source.display(),
                    loaded
                );
                for err in skipped {
                    log::warn!("  {err}");
                }
            }
        }
    }
}

/// Load one component record into `fresh`, checking the parameter count.
fn load_component<B, M, R>(
    recorder: &R,
    fresh: &M,
    path: PathBuf,
    component: &'static str,
    device: &B::Device,
) -> Result<M>
where
    B: Backend,
    M: Module<B>,
    R: FileRecorder<B>,
{
    let mismatch = |reason: String| NeurolensError::WeightLoadMismatch {
        component: component.to_string(),
        reason,
    };

    let record = recorder
        .load::<M::Record>(path, device)
        .map_err(|e| mismatch(format!("{e:?}")))?;

    // burn asserts on structural mismatches (e.g. a different stage depth).
    let expected = fresh.num_params();
    let loaded = catch_unwind(AssertUnwindSafe(|| fresh.clone().load_record(record)))
        .map_err(|payload| mismatch(panic_message(payload)))?;
    if loaded.num_params() != expected {
        return Err(mismatch(format!(
            "expected {} parameters, found {}",
            expected,
            loaded.num_params()
        )));
    }
    Ok(loaded)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "record does not match the module structure".to_string()
    }
}

/// Build `blueprint` and apply the component records found in `dir`.
///
/// Each component is tried on its own; one that fails to load keeps its
/// initial parameters and is reported in `LoadOutcome::Partial`.
pub fn load_components<B, R>(
    recorder: &R,
    blueprint: &ModelBlueprint,
    dir: &Path,
    device: &B::Device,
) -> (RiskModel<B>, LoadOutcome)
where
    B: Backend,
    R: FileRecorder<B>,
{
    let fresh = blueprint.init::<B>(device);
    let mut loaded = Vec::new();
    let mut skipped = Vec::new();

    let extractor = match load_component(
        recorder,
        &fresh.extractor,
        dir.join(EXTRACTOR_RECORD),
        EXTRACTOR_RECORD,
        device,
    ) {
        Ok(extractor) => {
            loaded.push(EXTRACTOR_RECORD);
            extractor
        }
        Err(err) => {
            skipped.push(err);
            fresh.extractor
        }
    };

    let head = match load_component(recorder, &fresh.head, dir.join(HEAD_RECORD), HEAD_RECORD, device) {
        Ok(head) => {
            loaded.push(HEAD_RECORD);
            head
        }
        Err(err) => {
            skipped.push(err);
            fresh.head
        }
    };

    let outcome = if skipped.is_empty() {
        LoadOutcome::Strict
    } else {
        LoadOutcome::Partial { loaded, skipped }
    };

    (RiskModel { extractor, head }, outcome)
}

fn native_recorder() -> BinFileRecorder<FullPrecisionSettings> {
    BinFileRecorder::<FullPrecisionSettings>::new()
}

/// Write `artifact` to `dir` as binary records plus `model.json` and
/// `history.json`.
pub fn save_checkpoint<B: Backend>(artifact: &ModelArtifact<B>, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let recorder = native_recorder();

    recorder
        .record(
            artifact.model.extractor.clone().into_record(),
            dir.join(EXTRACTOR_RECORD),
        )
        .map_err(|e| NeurolensError::Recorder(format!("extractor: {e:?}")))?;
    recorder
        .record(artifact.model.head.clone().into_record(), dir.join(HEAD_RECORD))
        .map_err(|e| NeurolensError::Recorder(format!("head: {e:?}")))?;

    artifact.meta.save(dir)?;
    std::fs::write(
        dir.join(HISTORY_FILE),
        serde_json::to_string_pretty(&artifact.history)?,
    )?;

    log::info!(
        "Checkpoint saved to {} ({}={:.4} at epoch {})",
        dir.display(),
        artifact.meta.metric_name,
        artifact.meta.metric,
        artifact.meta.epoch
    );
    Ok(())
}

/// Rebuild a model from a native checkpoint directory.
pub fn load_checkpoint<B: Backend>(
    dir: &Path,
    device: &B::Device,
) -> Result<(RiskModel<B>, LoadOutcome, CheckpointMeta)> {
    if !dir.is_dir() {
        return Err(NeurolensError::CheckpointNotFound(dir.to_path_buf()));
    }
    let meta = CheckpointMeta::load(dir)?;
    let (model, outcome) = load_components(&native_recorder(), &meta.blueprint, dir, device);
    outcome.log(dir);
    Ok((model, outcome, meta))
}

#[cfg(test)]
pub(crate) fn tiny_artifact<B: Backend>(
    modality: Modality,
    device: &B::Device,
) -> ModelArtifact<B> {
    let blueprint = ModelBlueprint::new(
        crate::model::backbone::tiny_spec(),
        modality.head_kind(),
        modality.num_outputs(),
    );
    ModelArtifact {
        model: blueprint.init(device),
        meta: CheckpointMeta {
            modality,
            blueprint,
            image_size: 16,
            classes: modality.default_classes().iter().map(|c| c.to_string()).collect(),
            metric_name: "macro_f1".to_string(),
            metric: 0.5,
            epoch: 1,
        },
        history: TrainingHistory::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_save_and_load_round_trip_is_strict() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let ckpt = dir.path().join("brain_best");
        let artifact = tiny_artifact::<NdArray>(Modality::Brain, &device);
        save_checkpoint(&artifact, &ckpt).unwrap();

        let (model, outcome, meta) = load_checkpoint::<NdArray>(&ckpt, &device).unwrap();
        assert!(outcome.is_strict());
        assert_eq!(meta, artifact.meta);

        let x = Tensor::<NdArray, 4>::random([1, 3, 16, 16], Distribution::Default, &device);
        let expected = artifact.model.forward(x.clone()).into_data();
        model
            .forward(x)
            .into_data()
            .assert_approx_eq(&expected, 5);
    }

    #[test]
    fn test_missing_head_gives_partial_outcome() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let artifact = tiny_artifact::<NdArray>(Modality::Eye, &device);
        save_checkpoint(&artifact, dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("head.bin")).unwrap();

        let (model, outcome, _) = load_checkpoint::<NdArray>(dir.path(), &device).unwrap();
        match outcome {
            LoadOutcome::Partial { loaded, skipped } => {
                assert_eq!(loaded, vec![EXTRACTOR_RECORD]);
                assert!(matches!(
                    skipped.as_slice(),
                    [NeurolensError::WeightLoadMismatch { component, .. }] if component == HEAD_RECORD
                ));
            }
            LoadOutcome::Strict => panic!("head record was removed"),
        }
        assert_eq!(model.num_outputs(), 4);
    }

    #[test]
    fn test_deeper_blueprint_skips_extractor() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let artifact = tiny_artifact::<NdArray>(Modality::Brain, &device);
        save_checkpoint(&artifact, dir.path()).unwrap();

        let mut meta = artifact.meta.clone();
        for stage in meta.blueprint.extractor.stages.iter_mut() {
            stage.depth += 1;
        }
        meta.save(dir.path()).unwrap();

        let (model, outcome, _) = load_checkpoint::<NdArray>(dir.path(), &device).unwrap();
        match outcome {
            LoadOutcome::Partial { loaded, skipped } => {
                assert_eq!(loaded, vec![HEAD_RECORD]);
                assert!(matches!(
                    skipped.as_slice(),
                    [NeurolensError::WeightLoadMismatch { component, .. }] if component == EXTRACTOR_RECORD
                ));
            }
            LoadOutcome::Strict => panic!("extractor depth differs from the record"),
        }
        let x = Tensor::<NdArray, 4>::zeros([1, 3, 16, 16], &device);
        assert_eq!(model.forward(x).dims(), [1, 2]);
    }

    #[test]
    fn test_missing_directory() {
        let device = Default::default();
        let err = load_checkpoint::<NdArray>(Path::new("/nonexistent/eye_best"), &device).unwrap_err();
        assert!(matches!(err, NeurolensError::CheckpointNotFound(_)));
    }
}
