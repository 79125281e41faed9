use serde::{Deserialize, Serialize};

use crate::modality::HeadKind;

/// Direction in which the validation metric improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricGoal {
    Maximize,
    Minimize,
}

impl MetricGoal {
    /// Macro-F1 for classification, MAE for regression.
    pub fn for_head(kind: HeadKind) -> Self {
        match kind {
            HeadKind::Classification => Self::Maximize,
            HeadKind::Regression => Self::Minimize,
        }
    }

    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::Maximize => "macro_f1",
            Self::Minimize => "mae",
        }
    }

    /// Strict improvement; ties and NaN never improve.
    pub fn improves(&self, candidate: f64, best: Option<f64>) -> bool {
        if candidate.is_nan() {
            return false;
        }
        match best {
            None => true,
            Some(best) => match self {
                Self::Maximize => candidate > best,
                Self::Minimize => candidate < best,
            },
        }
    }
}

/// Metrics of one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub total_epochs: usize,
    pub train_loss: f64,
    pub val_metric: f64,
}

/// Snapshot retained for the best validation metric seen so far.
#[derive(Debug)]
pub struct BestCheckpoint<T> {
    goal: MetricGoal,
    best: Option<(T, f64, usize)>,
}

impl<T> BestCheckpoint<T> {
    pub fn new(goal: MetricGoal) -> Self {
        Self { goal, best: None }
    }

    pub fn goal(&self) -> MetricGoal {
        self.goal
    }

    /// Keeps `snapshot()` when `metric` strictly improves. Returns whether it did.
    pub fn offer(&mut self, epoch: usize, metric: f64, snapshot: impl FnOnce() -> T) -> bool {
        if !self.goal.improves(metric, self.best_metric()) {
            return false;
        }
        self.best = Some((snapshot(), metric, epoch));
        true
    }

    pub fn best_metric(&self) -> Option<f64> {
        self.best.as_ref().map(|(_, metric, _)| *metric)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best.as_ref().map(|(_, _, epoch)| *epoch)
    }

    /// `(snapshot, metric, epoch)` of the best epoch.
    pub fn into_best(self) -> Option<(T, f64, usize)> {
        self.best
    }
}

/// Per-epoch metrics collected over a training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        log::debug!("epoch {} recorded, history len {}", metrics.epoch, self.epochs.len() + 1);
        self.epochs.push(metrics);
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}
