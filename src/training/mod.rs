pub mod checkpoint;
pub mod clipping;
pub mod config;
pub mod metrics;
pub mod state;
pub mod trainer;

pub use checkpoint::{
    load_checkpoint, load_components, save_checkpoint, CheckpointMeta, LoadOutcome, ModelArtifact,
};
pub use clipping::{clip_grad_norm, global_grad_norm};
pub use config::PipelineConfig;
pub use metrics::{macro_f1, RegressionReport};
pub use state::{BestCheckpoint, EpochMetrics, MetricGoal, TrainingHistory};
pub use trainer::{evaluate, run_modality, TrainOptions, Trainer};
