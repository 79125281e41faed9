pub mod data;
pub mod dataset;
pub mod error;
pub mod fusion;
pub mod inference;
pub mod modality;
pub mod model;
pub mod training;

// Re-exports for convenience
pub use error::{NeurolensError, Result};
pub use fusion::{fuse, FusionResult, ModalitySignal, RiskReport, RiskTier, Vitals};
pub use inference::{
    AssessmentRequest, BackendKind, InferenceBackend, InferenceService, NativeBackend, Prediction,
};
pub use modality::{HeadKind, Modality};
pub use model::{assemble, ModelBlueprint, RiskModel};
pub use training::{run_modality, LoadOutcome, ModelArtifact, PipelineConfig, Trainer};
