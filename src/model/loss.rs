use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;

pub const SMOOTH_L1_BETA: f32 = 0.05;

/// Training objective for one head kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskLoss {
    /// Cross-entropy, optionally weighted per class.
    Classification { class_weights: Option<Vec<f32>> },
    /// Smooth-L1 (Huber) with transition point `beta`.
    Regression { beta: f32 },
}

impl RiskLoss {
    pub fn classification(class_weights: Option<Vec<f32>>) -> Self {
        Self::Classification { class_weights }
    }

    pub fn regression() -> Self {
        Self::Regression { beta: SMOOTH_L1_BETA }
    }

    pub fn classification_loss<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let weights = match self {
            Self::Classification { class_weights } => class_weights.clone(),
            Self::Regression { .. } => None,
        };

        CrossEntropyLossConfig::new()
            .with_weights(weights)
            .init(&logits.device())
            .forward(logits, targets)
    }

    pub fn regression_loss<B: Backend>(&self, predictions: Tensor<B, 1>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
        let beta = match self {
            Self::Regression { beta } => *beta,
            Self::Classification { .. } => SMOOTH_L1_BETA,
        };
        smooth_l1_loss(predictions, targets, beta)
    }
}

/// Mean smooth-L1: `0.5 * d² / beta` below `beta`, `d - 0.5 * beta` above.
pub fn smooth_l1_loss<B: Backend>(predictions: Tensor<B, 1>, targets: Tensor<B, 1>, beta: f32) -> Tensor<B, 1> {
    let diff = (predictions - targets).abs();
    let quadratic = diff.clone().powf_scalar(2.0).mul_scalar(0.5 / beta);
    let linear = diff.clone().sub_scalar(0.5 * beta);
    let small = diff.lower_elem(beta);

    linear.mask_where(small, quadratic).mean()
}
