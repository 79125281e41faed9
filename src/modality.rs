use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NeurolensError;

/// Which kind of head a modality is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadKind {
    Classification,
    Regression,
}

/// Image modalities backed by a trained model.
///
/// The clinical-formula modality (ePWV) has no model and lives in `fusion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Retinal image, 4 classes.
    Eye,
    /// Carotid intima-media thickness, regression in millimeters.
    Cimt,
    /// Brain image, 2 classes.
    Brain,
}

/// Eye classes in training order.
pub const EYE_CLASSES: [&str; 4] = ["normal", "rao", "brvo", "crvo"];
/// Brain classes in training order.
pub const BRAIN_CLASSES: [&str; 2] = ["normal", "abnormal"];

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Eye, Modality::Cimt, Modality::Brain];

    pub fn head_kind(&self) -> HeadKind {
        match self {
            Self::Eye | Self::Brain => HeadKind::Classification,
            Self::Cimt => HeadKind::Regression,
        }
    }

    /// Default class names; empty for the regression modality.
    pub fn default_classes(&self) -> &'static [&'static str] {
        match self {
            Self::Eye => &EYE_CLASSES,
            Self::Brain => &BRAIN_CLASSES,
            Self::Cimt => &[],
        }
    }

    pub fn num_outputs(&self) -> usize {
        match self.head_kind() {
            HeadKind::Classification => self.default_classes().len(),
            HeadKind::Regression => 1,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::Eye => "eye",
            Self::Cimt => "cimt",
            Self::Brain => "brain",
        }
    }

    /// Name of the best-checkpoint artifact in the checkpoint store.
    pub fn checkpoint_name(&self) -> String {
        format!("{}_best", self.slug())
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Modality {
    type Err = NeurolensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eye" | "retinal" | "a" => Ok(Self::Eye),
            "cimt" | "b" => Ok(Self::Cimt),
            "brain" | "c" => Ok(Self::Brain),
            other => Err(NeurolensError::InvalidConfig(format!(
                "unknown modality '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_kinds() {
        assert_eq!(Modality::Eye.head_kind(), HeadKind::Classification);
        assert_eq!(Modality::Brain.head_kind(), HeadKind::Classification);
        assert_eq!(Modality::Cimt.head_kind(), HeadKind::Regression);
        assert_eq!(Modality::Eye.num_outputs(), 4);
        assert_eq!(Modality::Cimt.num_outputs(), 1);
    }

    #[test]
    fn test_parse_and_checkpoint_name() {
        assert_eq!("Brain".parse::<Modality>().unwrap(), Modality::Brain);
        assert_eq!("A".parse::<Modality>().unwrap(), Modality::Eye);
        assert!("lung".parse::<Modality>().is_err());
        assert_eq!(Modality::Cimt.checkpoint_name(), "cimt_best");
    }
}
