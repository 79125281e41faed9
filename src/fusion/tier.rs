use serde::{Deserialize, Serialize};
use std::fmt;

/// Discretization of a continuous score or measurement into three levels.
///
/// Used both for the fused risk score and for the CIMT / ePWV buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Exclusive upper bound (percent) of the Low tier.
    pub const LOW_UPPER_PERCENT: f64 = 30.0;
    /// Exclusive upper bound (percent) of the Medium tier.
    pub const MEDIUM_UPPER_PERCENT: f64 = 60.0;

    /// Tier of a fused score expressed on the percentage scale (`score * 100`).
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage < Self::LOW_UPPER_PERCENT {
            Self::Low
        } else if percentage < Self::MEDIUM_UPPER_PERCENT {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Scalar a bucketed measurement contributes to fusion.
    pub fn bucket_scalar(&self) -> f64 {
        match self {
            Self::Low => 0.20,
            Self::Medium => 0.55,
            Self::High => 0.90,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::Low => "Low stroke risk. Maintain a healthy lifestyle and routine check-ups.",
            Self::Medium => {
                "Moderate stroke risk. Follow-up with a physician and blood pressure monitoring recommended."
            }
            Self::High => "High stroke risk. Prompt consultation with a specialist is advised.",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_are_exact() {
        assert_eq!(RiskTier::from_percentage(29.999), RiskTier::Low);
        assert_eq!(RiskTier::from_percentage(30.0), RiskTier::Medium);
        assert_eq!(RiskTier::from_percentage(59.999), RiskTier::Medium);
        assert_eq!(RiskTier::from_percentage(60.0), RiskTier::High);
        assert_eq!(RiskTier::from_percentage(0.0), RiskTier::Low);
        assert_eq!(RiskTier::from_percentage(100.0), RiskTier::High);
    }

    #[test]
    fn test_bucket_scalars() {
        assert_eq!(RiskTier::Low.bucket_scalar(), 0.20);
        assert_eq!(RiskTier::Medium.bucket_scalar(), 0.55);
        assert_eq!(RiskTier::High.bucket_scalar(), 0.90);
    }
}
