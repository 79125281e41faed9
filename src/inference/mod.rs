pub mod backend;
pub mod evaluation;
pub mod export;
pub mod service;
pub mod signal;

#[cfg(feature = "portable")]
pub use backend::PortableBackend;
pub use backend::{open_backend, BackendKind, InferenceBackend, NativeBackend, ServingBackend};
pub use evaluation::{evaluate_cimt, read_cimt_csv, single_item_report, CimtGroundTruth};
pub use export::{export_portable, load_portable, PortableManifest};
pub use service::{Assessment, AssessmentRequest, InferenceService};
pub use signal::{softmax, ClassPrediction, Prediction, RawSignal};
