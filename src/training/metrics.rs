use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::fusion::cimt_bucket;

/// Macro-averaged F1 over the labels present in either `y_true` or `y_pred`.
/// A label with no true or predicted positives scores 0. Empty input gives 0.0.
pub fn macro_f1(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let labels: BTreeSet<usize> = y_true.iter().chain(y_pred).copied().collect();
    if labels.is_empty() {
        return 0.0;
    }

    let total: f64 = labels
        .iter()
        .map(|&label| {
            let mut tp = 0usize;
            let mut fp = 0usize;
            let mut fn_ = 0usize;
            for (&t, &p) in y_true.iter().zip(y_pred) {
                match (t == label, p == label) {
                    (true, true) => tp += 1,
                    (false, true) => fp += 1,
                    (true, false) => fn_ += 1,
                    (false, false) => {}
                }
            }
            let denom = 2 * tp + fp + fn_;
            if denom == 0 {
                0.0
            } else {
                2.0 * tp as f64 / denom as f64
            }
        })
        .sum();

    total / labels.len() as f64
}

pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mse = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64;
    mse.sqrt()
}

/// Coefficient of determination; the total sum of squares is offset by 1e-12
/// so a constant ground truth does not divide by zero.
pub fn r2(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum::<f64>() + 1e-12;
    1.0 - ss_res / ss_tot
}

/// Share of predictions landing in the same CIMT bucket as the ground truth.
pub fn bucket_accuracy(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let hits = y_true
        .iter()
        .zip(y_pred)
        .filter(|(t, p)| cimt_bucket(**t) == cimt_bucket(**p))
        .count();
    hits as f64 / y_true.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub count: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub risk_accuracy: f64,
}

impl RegressionReport {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        Self {
            count: y_true.len(),
            mae: mae(y_true, y_pred),
            rmse: rmse(y_true, y_pred),
            r2: r2(y_true, y_pred),
            risk_accuracy: bucket_accuracy(y_true, y_pred),
        }
    }
}

impl std::fmt::Display for RegressionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MAE={:.4}  RMSE={:.4}  R²={:.4}  Risk accuracy={:.4}",
            self.mae, self.rmse, self.r2, self.risk_accuracy
        )
    }
}
