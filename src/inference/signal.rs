use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fusion::{cimt_bucket, cimt_signal, BrainFinding, EyeFinding, ModalitySignal, RiskTier};
use crate::modality::Modality;

/// Softmax with the row max subtracted first; the denominator is clamped at 1e-9.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let denom = exps.iter().sum::<f32>().max(1e-9);
    exps.into_iter().map(|e| e / denom).collect()
}

/// Arg-max class of a logit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub index: usize,
    /// Probability of `index`, in `[0, 1]`
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

impl ClassPrediction {
    /// `None` for an empty row.
    pub fn from_logits(logits: &[f32]) -> Option<Self> {
        let probabilities = softmax(logits);
        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            })?;
        Some(Self {
            index,
            confidence,
            probabilities,
        })
    }

    pub fn confidence_percent(&self) -> f32 {
        self.confidence * 100.0
    }
}

/// Decoded model output before it is scaled for fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawSignal {
    Class(ClassPrediction),
    /// Regression output, millimeters for CIMT
    Value { value: f32 },
}

/// Prediction for one image of one modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub modality: Modality,
    /// Class name of the winning class, when classifying
    pub label: Option<String>,
    pub raw: RawSignal,
}

impl Prediction {
    pub fn new(modality: Modality, raw: RawSignal, classes: &[String]) -> Self {
        let label = match &raw {
            RawSignal::Class(c) => classes.get(c.index).cloned(),
            RawSignal::Value { .. } => None,
        };
        Self { modality, label, raw }
    }

    fn eye_finding(&self, index: usize) -> Option<EyeFinding> {
        self.label
            .as_deref()
            .and_then(EyeFinding::from_label)
            .or_else(|| EyeFinding::from_class_index(index))
    }

    fn brain_finding(&self, index: usize) -> Option<BrainFinding> {
        self.label
            .as_deref()
            .and_then(BrainFinding::from_label)
            .or_else(|| BrainFinding::from_class_index(index))
    }

    /// Fusion scalar; `None` when the class cannot be mapped or the output
    /// kind does not match the modality.
    pub fn signal(&self) -> Option<ModalitySignal> {
        match (self.modality, &self.raw) {
            (Modality::Eye, RawSignal::Class(c)) => self.eye_finding(c.index).map(|f| f.signal()),
            (Modality::Brain, RawSignal::Class(c)) => self.brain_finding(c.index).map(|f| f.signal()),
            (Modality::Cimt, RawSignal::Value { value }) => Some(cimt_signal(*value as f64)),
            _ => None,
        }
    }

    /// CIMT risk bucket of a regression output.
    pub fn cimt_tier(&self) -> Option<RiskTier> {
        match self.raw {
            RawSignal::Value { value } => Some(cimt_bucket(value as f64)),
            RawSignal::Class(_) => None,
        }
    }
}

pub const CIMT_THRESHOLDS: &str = "Risk Thresholds:\n  Low:    < 0.6 mm\n  Medium: 0.6 - 0.8 mm\n  High:   > 0.8 mm";

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.modality)?;
        match (&self.raw, self.modality) {
            (RawSignal::Class(c), Modality::Eye) => {
                let finding = self.eye_finding(c.index);
                writeln!(
                    f,
                    "Prediction: {}",
                    finding.map(|x| x.display_name()).unwrap_or("Unknown")
                )?;
                writeln!(f, "Confidence: {:.2}%", c.confidence_percent())?;
                write!(f, "Risk Level: {}", finding.map(|x| x.risk_label()).unwrap_or("Unknown"))
            }
            (RawSignal::Class(c), _) => {
                let finding = self.brain_finding(c.index);
                writeln!(
                    f,
                    "Prediction: {}",
                    finding.map(|x| x.display_name()).unwrap_or("Unknown")
                )?;
                writeln!(f, "Confidence: {:.2}%", c.confidence_percent())?;
                write!(f, "Risk Level: {}", finding.map(|x| x.risk_label()).unwrap_or("Unknown"))
            }
            (RawSignal::Value { value }, _) => {
                writeln!(f, "Predicted CIMT: {:.3} mm", value)?;
                writeln!(f, "Risk Category:  {} Risk", cimt_bucket(*value as f64))?;
                write!(f, "{CIMT_THRESHOLDS}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(classes: &[&str]) -> Vec<String> {
        classes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let p = softmax(&[1000.0, 1000.0, -1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
        assert!((p[1] - 0.5).abs() < 1e-6);
        assert!(p[2].abs() < 1e-6);
        assert!(p.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_argmax_keeps_first_on_ties() {
        let pred = ClassPrediction::from_logits(&[2.0, 2.0, 1.0]).unwrap();
        assert_eq!(pred.index, 0);
        assert!(ClassPrediction::from_logits(&[]).is_none());
    }

    #[test]
    fn test_eye_signal_uses_class_name() {
        let raw = RawSignal::Class(ClassPrediction::from_logits(&[0.0, 0.0, 0.0, 5.0]).unwrap());
        let pred = Prediction::new(Modality::Eye, raw, &names(&["normal", "rao", "brvo", "crvo"]));
        assert_eq!(pred.label.as_deref(), Some("crvo"));
        assert_eq!(pred.signal().unwrap().value(), 0.80);
    }

    #[test]
    fn test_brain_signal_follows_configured_class_order() {
        let raw = RawSignal::Class(ClassPrediction::from_logits(&[5.0, 0.0]).unwrap());
        let pred = Prediction::new(Modality::Brain, raw, &names(&["abnormal", "normal"]));
        assert_eq!(pred.label.as_deref(), Some("abnormal"));
        assert_eq!(pred.signal().unwrap().value(), 0.90);
        assert!(pred.to_string().contains("Risk Level: High"));
    }

    #[test]
    fn test_cimt_signal_and_display() {
        let pred = Prediction::new(Modality::Cimt, RawSignal::Value { value: 0.72 }, &[]);
        assert_eq!(pred.signal().unwrap().value(), 0.55);
        assert_eq!(pred.cimt_tier(), Some(RiskTier::Medium));
        let text = pred.to_string();
        assert!(text.contains("Predicted CIMT: 0.720 mm"));
        assert!(text.contains("Risk Category:  Medium Risk"));
    }

    #[test]
    fn test_mismatched_output_has_no_signal() {
        let pred = Prediction::new(Modality::Brain, RawSignal::Value { value: 0.5 }, &[]);
        assert!(pred.signal().is_none());
    }
}
