//! Per-modality scaling rules: every modality output is mapped onto a
//! `ModalitySignal` in `[0, 1]` through a fixed table.

use serde::{Deserialize, Serialize};

use super::tier::RiskTier;

/// Scalar contribution of one modality to the fused score, always in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ModalitySignal(f64);

impl ModalitySignal {
    /// Returns `None` when `value` is outside `[0, 1]` or NaN.
    pub fn new(value: f64) -> Option<Self> {
        (0.0..=1.0).contains(&value).then_some(Self(value))
    }

    const fn from_table(value: f64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Retinal finding, in the class order the eye model is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeFinding {
    Normal,
    Rao,
    Brvo,
    Crvo,
}

impl EyeFinding {
    pub const ALL: [EyeFinding; 4] = [Self::Normal, Self::Rao, Self::Brvo, Self::Crvo];

    pub fn from_class_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(label))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Rao => "rao",
            Self::Brvo => "brvo",
            Self::Crvo => "crvo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Rao => "RAO",
            Self::Brvo => "BRVO",
            Self::Crvo => "CRVO",
        }
    }

    pub fn risk_label(&self) -> &'static str {
        match self {
            Self::Normal => "Low Risk",
            Self::Brvo => "Medium Risk",
            Self::Crvo => "High Risk",
            Self::Rao => "Very High Risk",
        }
    }

    pub fn signal(&self) -> ModalitySignal {
        ModalitySignal::from_table(match self {
            Self::Normal => 0.10,
            Self::Brvo => 0.50,
            Self::Crvo => 0.80,
            Self::Rao => 1.00,
        })
    }
}

/// Brain finding, in the class order the brain model is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrainFinding {
    Normal,
    Abnormal,
}

impl BrainFinding {
    pub const ALL: [BrainFinding; 2] = [Self::Normal, Self::Abnormal];

    pub fn from_class_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(label))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Abnormal => "abnormal",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Abnormal => "Abnormal",
        }
    }

    pub fn risk_label(&self) -> &'static str {
        match self {
            Self::Normal => "Low Risk",
            Self::Abnormal => "High Risk",
        }
    }

    pub fn signal(&self) -> ModalitySignal {
        ModalitySignal::from_table(match self {
            Self::Normal => 0.20,
            Self::Abnormal => 0.90,
        })
    }
}

/// CIMT lower bound (mm) of the Medium bucket.
pub const CIMT_MEDIUM_MM: f64 = 0.6;
/// CIMT upper bound (mm, inclusive) of the Medium bucket.
pub const CIMT_HIGH_MM: f64 = 0.8;

/// Buckets a CIMT measurement in millimeters. Non-finite values land in `High`.
pub fn cimt_bucket(mm: f64) -> RiskTier {
    if mm < CIMT_MEDIUM_MM {
        RiskTier::Low
    } else if (CIMT_MEDIUM_MM..=CIMT_HIGH_MM).contains(&mm) {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

pub fn cimt_signal(mm: f64) -> ModalitySignal {
    ModalitySignal::from_table(cimt_bucket(mm).bucket_scalar())
}

pub(crate) fn bucket_signal(tier: RiskTier) -> ModalitySignal {
    ModalitySignal::from_table(tier.bucket_scalar())
}
