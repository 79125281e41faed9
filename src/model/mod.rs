pub mod backbone;
pub mod blocks;
pub mod head;
pub mod loss;
pub mod network;

pub use backbone::{
    resolve_extractor, BuiltinExtractors, ExtractorProvider, ExtractorSpec, FeatureExtractor,
    StageSpec, FALLBACK_EXTRACTOR, PRIMARY_EXTRACTOR,
};
pub use head::LinearHead;
pub use loss::{smooth_l1_loss, RiskLoss, SMOOTH_L1_BETA};
pub use network::{assemble, assemble_with, ModelBlueprint, RiskModel};
