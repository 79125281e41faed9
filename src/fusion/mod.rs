//! Fusion engine: combines the four per-modality signals into one score and tier.
//!
//! Everything in this module is pure and independent of any model backend.

pub mod epwv;
pub mod signals;
pub mod tier;

use serde::{Deserialize, Serialize};

pub use epwv::{epwv_bucket, epwv_signal, estimated_pwv, mean_blood_pressure, Vitals};
pub use signals::{cimt_bucket, cimt_signal, BrainFinding, EyeFinding, ModalitySignal};
pub use tier::RiskTier;

/// Fusion weights; they sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub eye: f64,
    pub cimt: f64,
    pub brain: f64,
    pub epwv: f64,
}

pub const FUSION_WEIGHTS: FusionWeights = FusionWeights {
    eye: 0.22,
    cimt: 0.35,
    brain: 0.10,
    epwv: 0.33,
};

/// Per-modality scalars that went into a fused score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub eye: f64,
    pub cimt: f64,
    pub brain: f64,
    pub epwv: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    /// Fused score in `[0, 1]`
    pub score: f64,
    pub tier: RiskTier,
    pub breakdown: SignalBreakdown,
}

/// Response shape handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// Fused score as a percentage, 2 decimals
    pub risk_score: f64,
    pub risk_level: RiskTier,
    pub recommendation: String,
    /// Per-modality scalars, 3 decimals
    pub breakdown: SignalBreakdown,
}

pub fn fuse(
    eye: ModalitySignal,
    cimt: ModalitySignal,
    brain: ModalitySignal,
    epwv: ModalitySignal,
) -> FusionResult {
    let w = FUSION_WEIGHTS;
    let score = (w.eye * eye.value()
        + w.cimt * cimt.value()
        + w.brain * brain.value()
        + w.epwv * epwv.value())
    .clamp(0.0, 1.0);

    FusionResult {
        score,
        tier: RiskTier::from_percentage(score * 100.0),
        breakdown: SignalBreakdown {
            eye: eye.value(),
            cimt: cimt.value(),
            brain: brain.value(),
            epwv: epwv.value(),
        },
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl FusionResult {
    pub fn percentage(&self) -> f64 {
        self.score * 100.0
    }

    pub fn report(&self) -> RiskReport {
        RiskReport {
            risk_score: round_to(self.percentage(), 2),
            risk_level: self.tier,
            recommendation: self.tier.recommendation().to_string(),
            breakdown: SignalBreakdown {
                eye: round_to(self.breakdown.eye, 3),
                cimt: round_to(self.breakdown.cimt, 3),
                brain: round_to(self.breakdown.brain, 3),
                epwv: round_to(self.breakdown.epwv, 3),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(v: f64) -> ModalitySignal {
        ModalitySignal::new(v).unwrap()
    }

    #[test]
    fn test_weights_sum_to_one() {
        let w = FUSION_WEIGHTS;
        assert!((w.eye + w.cimt + w.brain + w.epwv - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_worked_example() {
        // age 45, SBP 130, DBP 85 -> MBP 103, ePWV ~ -0.90 -> below 9 -> 0.20
        let vitals = Vitals::new(45.0, 130.0, 85.0);
        let epwv = epwv_signal(&vitals);
        assert_eq!(epwv.value(), 0.20);

        let result = fuse(
            EyeFinding::Crvo.signal(),
            cimt_signal(0.55),
            BrainFinding::Abnormal.signal(),
            epwv,
        );

        // 0.22*0.80 + 0.35*0.20 + 0.10*0.90 + 0.33*0.20
        assert!((result.score - 0.402).abs() < 1e-12, "got {}", result.score);
        assert_eq!(result.tier, RiskTier::Medium);

        let report = result.report();
        assert_eq!(report.risk_score, 40.2);
        assert_eq!(report.risk_level, RiskTier::Medium);
        assert_eq!(report.breakdown.eye, 0.8);
    }

    #[test]
    fn test_extremes() {
        let low = fuse(sig(0.0), sig(0.0), sig(0.0), sig(0.0));
        assert_eq!(low.score, 0.0);
        assert_eq!(low.tier, RiskTier::Low);

        let high = fuse(sig(1.0), sig(1.0), sig(1.0), sig(1.0));
        assert!(high.score <= 1.0 && high.score > 0.999);
        assert_eq!(high.tier, RiskTier::High);
    }

    #[test]
    fn test_score_monotone_in_each_signal() {
        let grid = [0.0, 0.1, 0.2, 0.5, 0.55, 0.8, 0.9, 1.0];
        for &base in &grid {
            for pos in 0..4 {
                let mut prev = f64::NEG_INFINITY;
                for &v in &grid {
                    let mut inputs = [base; 4];
                    inputs[pos] = v;
                    let r = fuse(sig(inputs[0]), sig(inputs[1]), sig(inputs[2]), sig(inputs[3]));
                    assert!((0.0..=1.0).contains(&r.score));
                    assert!(r.score >= prev);
                    prev = r.score;
                }
            }
        }
    }

    #[test]
    fn test_score_in_range_for_valid_vitals() {
        for age in (0..=120).step_by(3) {
            for (sbp, dbp) in [(90.0, 60.0), (130.0, 85.0), (200.0, 120.0), (300.0, 199.0)] {
                let vitals = Vitals::new(age as f64, sbp, dbp);
                assert!(vitals.validate().is_ok());
                for eye in EyeFinding::ALL {
                    for brain in BrainFinding::ALL {
                        let r = fuse(eye.signal(), cimt_signal(0.7), brain.signal(), epwv_signal(&vitals));
                        assert!((0.0..=1.0).contains(&r.score));
                    }
                }
            }
        }
    }
}
