use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::backend::{open_backend, BackendKind, InferenceBackend};
use super::signal::Prediction;
use crate::error::{NeurolensError, Result};
use crate::fusion::{epwv_signal, fuse, FusionResult, ModalitySignal, RiskReport, Vitals};
use crate::modality::Modality;
use crate::training::config::PipelineConfig;

/// One patient: an image per modality plus vitals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub eye_image: PathBuf,
    pub cimt_image: PathBuf,
    pub brain_image: PathBuf,
    pub vitals: Vitals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub eye: Prediction,
    pub cimt: Prediction,
    pub brain: Prediction,
    pub epwv: f64,
    pub result: FusionResult,
}

impl Assessment {
    pub fn report(&self) -> RiskReport {
        self.result.report()
    }
}

/// Serves predictions from the stored models and fuses them.
///
/// Models are loaded on first use and kept per modality. The cache lock is
/// held while loading, so concurrent first requests load a model once; later
/// requests run on their own clone of the loaded model.
pub struct InferenceService {
    config: PipelineConfig,
    kind: BackendKind,
    cache: Mutex<HashMap<Modality, Box<dyn InferenceBackend>>>,
}

impl InferenceService {
    pub fn new(config: PipelineConfig) -> Self {
        let kind = config.inference.backend;
        Self {
            config,
            kind,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_backend(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// Directory the model of `modality` is read from for the active backend.
    pub fn model_dir(&self, modality: Modality) -> PathBuf {
        match self.kind {
            BackendKind::Native => self.config.checkpoint_dir(modality),
            BackendKind::Portable => self.config.export_dir(modality),
        }
    }

    pub fn backend(&self, modality: Modality) -> Result<Box<dyn InferenceBackend>> {
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(backend) = cache.get(&modality) {
            return Ok(backend.clone_box());
        }

        let dir = self.model_dir(modality);
        let (backend, _outcome) = open_backend(self.kind, &dir)?;
        if backend.modality() != modality {
            return Err(NeurolensError::InvalidConfig(format!(
                "{} holds a {} model, expected {}",
                dir.display(),
                backend.modality(),
                modality
            )));
        }
        log::info!("[{}] {} model loaded from {}", modality, self.kind, dir.display());

        let handle = backend.clone_box();
        cache.insert(modality, backend);
        Ok(handle)
    }

    pub fn predict(&self, modality: Modality, image: &Path) -> Result<Prediction> {
        self.backend(modality)?.predict_path(image)
    }

    /// Validate vitals, run the three image models and fuse with ePWV.
    pub fn assess(&self, request: &AssessmentRequest) -> Result<Assessment> {
        request.vitals.validate()?;

        let eye = self.predict(Modality::Eye, &request.eye_image)?;
        let cimt = self.predict(Modality::Cimt, &request.cimt_image)?;
        let brain = self.predict(Modality::Brain, &request.brain_image)?;

        let result = fuse(
            signal_of(&eye)?,
            signal_of(&cimt)?,
            signal_of(&brain)?,
            epwv_signal(&request.vitals),
        );

        log::info!(
            "Assessment: score={:.2}% tier={}",
            result.percentage(),
            result.tier
        );

        Ok(Assessment {
            eye,
            cimt,
            brain,
            epwv: request.vitals.estimated_pwv(),
            result,
        })
    }
}

fn signal_of(prediction: &Prediction) -> Result<ModalitySignal> {
    prediction.signal().ok_or_else(|| {
        NeurolensError::InvalidConfig(format!(
            "{} prediction cannot be mapped to a risk signal",
            prediction.modality
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::backend::ServingBackend;
    use crate::training::checkpoint::{save_checkpoint, tiny_artifact};
    use image::{Rgb, RgbImage};

    fn service_with_models(root: &Path) -> InferenceService {
        let mut config = PipelineConfig::default();
        config.paths.runs_dir = Some(root.join("runs"));

        let device = Default::default();
        for modality in Modality::ALL {
            let artifact = tiny_artifact::<ServingBackend>(modality, &device);
            save_checkpoint(&artifact, &config.checkpoint_dir(modality)).unwrap();
        }
        InferenceService::new(config)
    }

    fn write_image(path: &Path) {
        RgbImage::from_pixel(24, 18, Rgb([120, 80, 60])).save(path).unwrap();
    }

    #[test]
    fn test_assess_produces_report() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_models(dir.path());
        let image = dir.path().join("scan.png");
        write_image(&image);

        let request = AssessmentRequest {
            eye_image: image.clone(),
            cimt_image: image.clone(),
            brain_image: image,
            vitals: Vitals::new(45.0, 130.0, 85.0),
        };
        let assessment = service.assess(&request).unwrap();
        let report = assessment.report();

        assert!((0.0..=100.0).contains(&report.risk_score));
        assert_eq!(report.breakdown.epwv, 0.2);
        assert_eq!(report.risk_level, assessment.result.tier);
    }

    #[test]
    fn test_models_are_cached_after_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_models(dir.path());
        let image = dir.path().join("scan.png");
        write_image(&image);

        service.predict(Modality::Brain, &image).unwrap();
        std::fs::remove_dir_all(dir.path().join("runs")).unwrap();
        assert!(service.predict(Modality::Brain, &image).is_ok());
        assert!(matches!(
            service.predict(Modality::Eye, &image),
            Err(NeurolensError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_vitals_rejected_before_inference() {
        let service = InferenceService::new(PipelineConfig::default());
        let request = AssessmentRequest {
            eye_image: PathBuf::from("missing.png"),
            cimt_image: PathBuf::from("missing.png"),
            brain_image: PathBuf::from("missing.png"),
            vitals: Vitals::new(45.0, 80.0, 90.0),
        };
        assert!(matches!(
            service.assess(&request),
            Err(NeurolensError::InvalidVitalRange(_))
        ));
    }
}
