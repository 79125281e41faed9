use std::path::PathBuf;

/// Result type for NeuroLens operations
pub type Result<T> = std::result::Result<T, NeurolensError>;

/// Main error type for NeuroLens
#[derive(Debug, thiserror::Error)]
pub enum NeurolensError {
    #[error("Cannot decode image {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },

    #[error("No training samples found for {modality} under {root}")]
    NoDataFound { modality: String, root: PathBuf },

    #[error("Checkpoint parameters do not match the model ({component}): {reason}")]
    WeightLoadMismatch { component: String, reason: String },

    #[error("Inference backend '{0}' is not available in this build")]
    BackendUnavailable(String),

    #[error("Invalid vital sign: {0}")]
    InvalidVitalRange(String),

    #[error("Unknown feature extractor: neither '{primary}' nor '{fallback}' is available")]
    UnknownExtractor { primary: String, fallback: String },

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),

    #[error("Dataset index error: {0}")]
    DatasetIndex(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Record error: {0}")]
    Recorder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl NeurolensError {
    pub fn image_decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ImageDecode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
