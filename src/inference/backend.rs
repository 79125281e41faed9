use burn::backend::NdArray;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::signal::{ClassPrediction, Prediction, RawSignal};
use crate::dataset::preprocessing::{ImagePreprocessor, PreprocessedImage};
use crate::error::{NeurolensError, Result};
use crate::model::RiskModel;
use crate::modality::{HeadKind, Modality};
use crate::training::checkpoint::{load_checkpoint, LoadOutcome};

/// CPU backend used to serve inference.
pub type ServingBackend = NdArray;

/// Execution engine behind a trained model.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Binary checkpoint records from training.
    #[default]
    Native,
    /// Exported graph manifest with named records.
    Portable,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Portable => write!(f, "portable"),
        }
    }
}

/// One loaded model, whatever engine runs it.
pub trait InferenceBackend: Send {
    fn kind(&self) -> BackendKind;

    fn modality(&self) -> Modality;

    /// Class names in head order; empty for regression.
    fn classes(&self) -> &[String];

    fn image_size(&self) -> u32;

    /// Raw head outputs for one preprocessed image.
    fn forward_raw(&self, image: &PreprocessedImage) -> Result<Vec<f32>>;

    fn clone_box(&self) -> Box<dyn InferenceBackend>;

    fn predict(&self, image: &PreprocessedImage) -> Result<Prediction> {
        let outputs = self.forward_raw(image)?;
        let raw = match self.modality().head_kind() {
            HeadKind::Classification => RawSignal::Class(
                ClassPrediction::from_logits(&outputs).ok_or_else(|| {
                    NeurolensError::InvalidConfig(format!("{} model returned no logits", self.modality()))
                })?,
            ),
            HeadKind::Regression => RawSignal::Value {
                value: outputs.first().copied().ok_or_else(|| {
                    NeurolensError::InvalidConfig(format!("{} model returned no value", self.modality()))
                })?,
            },
        };
        Ok(Prediction::new(self.modality(), raw, self.classes()))
    }

    fn predict_path(&self, path: &Path) -> Result<Prediction> {
        let image = ImagePreprocessor::new(self.image_size()).preprocess_path(path)?;
        self.predict(&image)
    }
}

fn forward_model<B: Backend>(
    model: &RiskModel<B>,
    image: &PreprocessedImage,
    device: &B::Device,
) -> Vec<f32> {
    model
        .forward(image.to_tensor::<B>(device))
        .into_data()
        .iter::<f32>()
        .collect()
}

/// Model loaded from a native training checkpoint.
#[derive(Debug, Clone)]
pub struct NativeBackend<B: Backend> {
    model: RiskModel<B>,
    modality: Modality,
    classes: Vec<String>,
    image_size: u32,
    device: B::Device,
}

impl<B: Backend> NativeBackend<B> {
    pub fn load(dir: &Path, device: B::Device) -> Result<(Self, LoadOutcome)> {
        let (model, outcome, meta) = load_checkpoint::<B>(dir, &device)?;
        Ok((
            Self {
                model,
                modality: meta.modality,
                classes: meta.classes,
                image_size: meta.image_size,
                device,
            },
            outcome,
        ))
    }
}

impl<B: Backend> InferenceBackend for NativeBackend<B> {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn modality(&self) -> Modality {
        self.modality
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn image_size(&self) -> u32 {
        self.image_size
    }

    fn forward_raw(&self, image: &PreprocessedImage) -> Result<Vec<f32>> {
        check_size(image, self.image_size)?;
        Ok(forward_model(&self.model, image, &self.device))
    }

    fn clone_box(&self) -> Box<dyn InferenceBackend> {
        Box::new(self.clone())
    }
}

fn check_size(image: &PreprocessedImage, expected: u32) -> Result<()> {
    if image.size() != expected as usize {
        return Err(NeurolensError::InvalidConfig(format!(
            "image preprocessed to {} but the model expects {}",
            image.size(),
            expected
        )));
    }
    Ok(())
}

#[cfg(feature = "portable")]
pub use portable::PortableBackend;

#[cfg(feature = "portable")]
mod portable {
    use super::*;
    use crate::inference::export::{load_portable, PortableManifest};

    /// Model loaded from an exported portable graph, run on the CPU.
    #[derive(Debug, Clone)]
    pub struct PortableBackend {
        model: RiskModel<ServingBackend>,
        manifest: PortableManifest,
    }

    impl PortableBackend {
        pub fn load(dir: &Path) -> Result<(Self, LoadOutcome)> {
            let device = Default::default();
            let (model, outcome, manifest) = load_portable::<ServingBackend>(dir, &device)?;
            Ok((Self { model, manifest }, outcome))
        }

        pub fn manifest(&self) -> &PortableManifest {
            &self.manifest
        }
    }

    impl InferenceBackend for PortableBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Portable
        }

        fn modality(&self) -> Modality {
            self.manifest.modality
        }

        fn classes(&self) -> &[String] {
            &self.manifest.classes
        }

        fn image_size(&self) -> u32 {
            self.manifest.image_size
        }

        fn forward_raw(&self, image: &PreprocessedImage) -> Result<Vec<f32>> {
            check_size(image, self.manifest.image_size)?;
            Ok(forward_model(&self.model, image, &Default::default()))
        }

        fn clone_box(&self) -> Box<dyn InferenceBackend> {
            Box::new(self.clone())
        }
    }
}

/// Open the model stored in `dir` with the requested engine.
pub fn open_backend(kind: BackendKind, dir: &Path) -> Result<(Box<dyn InferenceBackend>, LoadOutcome)> {
    match kind {
        BackendKind::Native => {
            let (backend, outcome) = NativeBackend::<ServingBackend>::load(dir, Default::default())?;
            Ok((Box::new(backend), outcome))
        }
        #[cfg(feature = "portable")]
        BackendKind::Portable => {
            let (backend, outcome) = PortableBackend::load(dir)?;
            Ok((Box::new(backend), outcome))
        }
        #[cfg(not(feature = "portable"))]
        BackendKind::Portable => Err(NeurolensError::BackendUnavailable(kind.to_string())),
    }
}
