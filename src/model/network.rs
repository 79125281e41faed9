use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::backbone::{
    resolve_extractor, BuiltinExtractors, ExtractorProvider, ExtractorSpec, FeatureExtractor,
    FALLBACK_EXTRACTOR, PRIMARY_EXTRACTOR,
};
use super::head::LinearHead;
use crate::error::Result;
use crate::modality::HeadKind;

/// Everything needed to rebuild a model before loading its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBlueprint {
    pub extractor: ExtractorSpec,
    pub head: HeadKind,
    pub num_outputs: usize,
}

impl ModelBlueprint {
    pub fn new(extractor: ExtractorSpec, head: HeadKind, num_outputs: usize) -> Self {
        let num_outputs = match head {
            HeadKind::Classification => num_outputs,
            HeadKind::Regression => 1,
        };
        Self {
            extractor,
            head,
            num_outputs,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> RiskModel<B> {
        RiskModel {
            extractor: self.extractor.init(device),
            head: LinearHead::new(device, self.extractor.feature_dim(), self.num_outputs),
        }
    }
}

/// Blueprint on the built-in extractors (primary, then fallback).
pub fn assemble(kind: HeadKind, num_outputs: usize) -> Result<ModelBlueprint> {
    assemble_with(&BuiltinExtractors, PRIMARY_EXTRACTOR, FALLBACK_EXTRACTOR, kind, num_outputs)
}

pub fn assemble_with(
    provider: &dyn ExtractorProvider,
    primary: &str,
    fallback: &str,
    kind: HeadKind,
    num_outputs: usize,
) -> Result<ModelBlueprint> {
    let extractor = resolve_extractor(provider, primary, fallback)?;
    log::info!(
        "Assembled {:?} model on '{}' ({} features -> {} outputs)",
        kind,
        extractor.id,
        extractor.feature_dim(),
        num_outputs
    );
    Ok(ModelBlueprint::new(extractor, kind, num_outputs))
}

/// Feature extractor plus linear head.
#[derive(Module, Debug)]
pub struct RiskModel<B: Backend> {
    pub extractor: FeatureExtractor<B>,
    pub head: LinearHead<B>,
}

impl<B: Backend> RiskModel<B> {
    /// Raw head outputs `[B, num_outputs]` (logits for classification).
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.extractor.forward(x))
    }

    /// Regression output squeezed to `[B]`.
    pub fn forward_regression(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        self.forward(x).squeeze::<1>(1)
    }

    pub fn num_outputs(&self) -> usize {
        self.head.num_outputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backbone::tiny_spec;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_classification_and_regression_shapes() {
        let device = Default::default();
        let x = Tensor::<NdArray, 4>::random([3, 3, 16, 16], Distribution::Default, &device);

        let cls = ModelBlueprint::new(tiny_spec(), HeadKind::Classification, 4).init::<NdArray>(&device);
        assert_eq!(cls.forward(x.clone()).dims(), [3, 4]);

        let reg = ModelBlueprint::new(tiny_spec(), HeadKind::Regression, 7).init::<NdArray>(&device);
        assert_eq!(reg.num_outputs(), 1);
        assert_eq!(reg.forward_regression(x).dims(), [3]);
    }

    #[test]
    fn test_assemble_records_extractor() {
        let blueprint = assemble(HeadKind::Classification, 2).unwrap();
        assert_eq!(blueprint.extractor.id, PRIMARY_EXTRACTOR);
        assert_eq!(blueprint.num_outputs, 2);

        let json = serde_json::to_string(&blueprint).unwrap();
        let back: ModelBlueprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blueprint);
    }
}
