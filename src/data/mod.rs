pub mod dataloader;
pub mod dataset;
pub mod regression;
pub mod transforms;

pub use dataloader::{class_balanced_weights, Batch, BatchLoader, SamplingStrategy};
pub use dataset::{
    scan_labeled_folders, DatasetSplit, ImageSample, LabeledSample, ScanMode, Split, Target,
};
pub use regression::{
    build_regression_dataset, load_regression_split, subject_split, RecordAccessor, RegressionIndex,
    RegressionSample,
};
pub use transforms::{make_transform, Transform, TransformOp};
