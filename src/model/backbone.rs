use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{NeurolensError, Result};
use crate::model::blocks::{C2f, Conv};

pub const PRIMARY_EXTRACTOR: &str = "c2f_small";
pub const FALLBACK_EXTRACTOR: &str = "c2f_nano";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub out_channels: usize,
    pub depth: usize,
}

/// Serializable description of a feature extractor: enough to rebuild the
/// same module tree before loading weights into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorSpec {
    pub id: String,
    pub stem_channels: usize,
    pub stages: Vec<StageSpec>,
    pub dropout: f64,
}

impl ExtractorSpec {
    /// Width of the pooled feature vector.
    pub fn feature_dim(&self) -> usize {
        self.stages
            .last()
            .map(|s| s.out_channels)
            .unwrap_or(self.stem_channels)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        let stem = Conv::downsample(device, 3, self.stem_channels);

        let mut downsamples = Vec::with_capacity(self.stages.len());
        let mut stages = Vec::with_capacity(self.stages.len());
        let mut channels = self.stem_channels;

        for stage in &self.stages {
            downsamples.push(Conv::downsample(device, channels, stage.out_channels));
            stages.push(C2f::new(device, stage.out_channels, stage.out_channels, stage.depth, true));
            channels = stage.out_channels;
        }

        FeatureExtractor {
            stem,
            downsamples,
            stages,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Image tensor `[B, 3, H, W]` in, pooled feature vector `[B, feature_dim]` out.
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    stem: Conv<B>,
    downsamples: Vec<Conv<B>>,
    stages: Vec<C2f<B>>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
}

impl<B: Backend> FeatureExtractor<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(x);

        for (down, stage) in self.downsamples.iter().zip(&self.stages) {
            x = stage.forward(down.forward(x));
        }

        let [batch, channels, _, _] = x.dims();
        let features = self.pool.forward(x).reshape([batch, channels]);
        self.dropout.forward(features)
    }
}

/// Source of feature extractors by identifier.
pub trait ExtractorProvider {
    fn resolve(&self, id: &str) -> Option<ExtractorSpec>;
}

/// Extractors shipped with the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinExtractors;

impl ExtractorProvider for BuiltinExtractors {
    fn resolve(&self, id: &str) -> Option<ExtractorSpec> {
        let (stem_channels, stages): (usize, &[(usize, usize)]) = match id {
            "c2f_small" => (32, &[(64, 1), (128, 2), (256, 2), (512, 1)]),
            "c2f_nano" => (16, &[(32, 1), (64, 1), (128, 1), (256, 1)]),
            _ => return None,
        };

        Some(ExtractorSpec {
            id: id.to_string(),
            stem_channels,
            stages: stages
                .iter()
                .map(|&(out_channels, depth)| StageSpec { out_channels, depth })
                .collect(),
            dropout: 0.1,
        })
    }
}

/// Primary extractor, or the fallback when the provider cannot supply it.
pub fn resolve_extractor(
    provider: &dyn ExtractorProvider,
    primary: &str,
    fallback: &str,
) -> Result<ExtractorSpec> {
    if let Some(spec) = provider.resolve(primary) {
        return Ok(spec);
    }

    log::warn!("Feature extractor '{primary}' unavailable, falling back to '{fallback}'");
    provider
        .resolve(fallback)
        .ok_or_else(|| NeurolensError::UnknownExtractor {
            primary: primary.to_string(),
            fallback: fallback.to_string(),
        })
}

/// Small extractor for fast model tests.
#[cfg(test)]
pub(crate) fn tiny_spec() -> ExtractorSpec {
    ExtractorSpec {
        id: "tiny".into(),
        stem_channels: 4,
        stages: vec![StageSpec { out_channels: 8, depth: 1 }],
        dropout: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    struct OnlyNano;

    impl ExtractorProvider for OnlyNano {
        fn resolve(&self, id: &str) -> Option<ExtractorSpec> {
            (id == FALLBACK_EXTRACTOR).then(|| BuiltinExtractors.resolve(id)).flatten()
        }
    }

    #[test]
    fn test_feature_shape() {
        let device = Default::default();
        let extractor = tiny_spec().init::<NdArray>(&device);
        let x = Tensor::<NdArray, 4>::random([2, 3, 16, 16], Distribution::Default, &device);
        assert_eq!(extractor.forward(x).dims(), [2, 8]);
    }

    #[test]
    fn test_primary_then_fallback() {
        let spec = resolve_extractor(&BuiltinExtractors, PRIMARY_EXTRACTOR, FALLBACK_EXTRACTOR).unwrap();
        assert_eq!(spec.id, PRIMARY_EXTRACTOR);
        assert_eq!(spec.feature_dim(), 512);

        let spec = resolve_extractor(&OnlyNano, PRIMARY_EXTRACTOR, FALLBACK_EXTRACTOR).unwrap();
        assert_eq!(spec.id, FALLBACK_EXTRACTOR);

        assert!(matches!(
            resolve_extractor(&BuiltinExtractors, "vit", "resnet"),
            Err(NeurolensError::UnknownExtractor { .. })
        ));
    }
}
