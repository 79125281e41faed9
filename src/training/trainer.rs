use burn::module::AutodiffModule;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use super::checkpoint::{save_checkpoint, CheckpointMeta, ModelArtifact};
use super::clipping::clip_grad_norm;
use super::config::PipelineConfig;
use super::metrics::{macro_f1, mae};
use super::state::{BestCheckpoint, EpochMetrics, MetricGoal, TrainingHistory};
use crate::data::dataset::{scan_labeled_folders, DatasetSplit, LabeledSample, ScanMode, Split};
use crate::data::regression::load_regression_split;
use crate::data::{class_balanced_weights, make_transform, BatchLoader, SamplingStrategy};
use crate::error::Result;
use crate::model::{assemble_with, BuiltinExtractors, RiskLoss, RiskModel};
use crate::modality::{HeadKind, Modality};

/// Hyperparameters of one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub num_workers: usize,
    pub image_size: u32,
    pub learning_rate: f64,
    pub weight_decay: f32,
    pub grad_clip_norm: f32,
    pub seed: u64,
    /// Class names in label order; empty for regression.
    pub classes: Vec<String>,
    /// Per-class weights, used by both the loss and the sampler.
    pub class_weights: Option<Vec<f32>>,
    pub primary_extractor: String,
    pub fallback_extractor: String,
}

impl TrainOptions {
    pub fn from_config(config: &PipelineConfig, modality: Modality) -> Self {
        let data = config.data.modality(modality);
        let (classes, class_weights) = match modality.head_kind() {
            HeadKind::Classification => (data.classes.clone(), data.class_weight_vector()),
            HeadKind::Regression => (Vec::new(), None),
        };

        Self {
            epochs: config.training.epochs,
            batch_size: config.hardware.batch_size(modality),
            num_workers: config.hardware.num_workers,
            image_size: data.image_size,
            learning_rate: config.training.learning_rate,
            weight_decay: config.training.weight_decay,
            grad_clip_norm: config.training.grad_clip_norm,
            seed: config.training.seed,
            classes,
            class_weights,
            primary_extractor: config.model.primary_extractor.clone(),
            fallback_extractor: config.model.fallback_extractor.clone(),
        }
    }

    fn num_outputs(&self, kind: HeadKind) -> usize {
        match kind {
            HeadKind::Classification => self.classes.len(),
            HeadKind::Regression => 1,
        }
    }
}

pub struct Trainer<B: AutodiffBackend> {
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Train a fresh model on `split` and return the snapshot with the best
    /// validation metric. Every configured epoch runs.
    pub fn train<S: LabeledSample>(
        &self,
        modality: Modality,
        split: &DatasetSplit<S>,
        options: &TrainOptions,
    ) -> Result<ModelArtifact<B::InnerBackend>> {
        let kind = modality.head_kind();
        let blueprint = assemble_with(
            &BuiltinExtractors,
            &options.primary_extractor,
            &options.fallback_extractor,
            kind,
            options.num_outputs(kind),
        )?;
        let goal = MetricGoal::for_head(kind);

        let loss_fn = match kind {
            HeadKind::Classification => RiskLoss::classification(options.class_weights.clone()),
            HeadKind::Regression => RiskLoss::regression(),
        };

        let sampling = match &options.class_weights {
            Some(weights) if kind == HeadKind::Classification => SamplingStrategy::weighted(
                &class_balanced_weights(&split.train, weights),
                options.seed,
            )?,
            _ => SamplingStrategy::Shuffle { seed: options.seed },
        };

        let train_loader = BatchLoader::<B, S>::new(
            split.train.clone(),
            make_transform(options.image_size, Split::Train, kind),
            options.batch_size,
            self.device.clone(),
        )
        .with_sampling(sampling)
        .with_seed(options.seed)
        .with_workers(options.num_workers)?;

        let val_loader = BatchLoader::<B::InnerBackend, S>::new(
            split.val.clone(),
            make_transform(options.image_size, Split::Val, kind),
            options.batch_size,
            self.device.clone(),
        )
        .with_workers(options.num_workers)?;

        log::info!(
            "[{}] training {} epochs on {} samples ({} batches/epoch), validating on {}",
            modality,
            options.epochs,
            train_loader.len(),
            train_loader.num_batches(),
            val_loader.len()
        );

        let mut model: RiskModel<B> = blueprint.init(&self.device);
        let mut optimizer = AdamWConfig::new()
            .with_weight_decay(options.weight_decay)
            .init::<B, RiskModel<B>>();

        let mut best = BestCheckpoint::new(goal);
        let mut history = TrainingHistory::new();

        let pb = ProgressBar::new(options.epochs as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style);
        }

        for epoch in 1..=options.epochs {
            let epoch_start = Instant::now();

            let mut total_loss = 0.0f64;
            let mut count = 0usize;

            for (batch_idx, batch) in train_loader.iter_epoch(epoch).enumerate() {
                let batch = batch?;
                let loss = match kind {
                    HeadKind::Classification => {
                        let targets = batch.class_targets(&self.device);
                        loss_fn.classification_loss(model.forward(batch.images), targets)
                    }
                    HeadKind::Regression => {
                        let targets = batch.value_targets(&self.device);
                        loss_fn.regression_loss(model.forward_regression(batch.images), targets)
                    }
                };

                let loss_value = loss.clone().into_scalar().elem::<f32>();
                if !loss_value.is_finite() {
                    log::warn!("[{}] non-finite loss at batch {}, skipped", modality, batch_idx + 1);
                    continue;
                }
                total_loss += loss_value as f64;
                count += 1;

                let grads = loss.backward();
                let mut grads = GradientsParams::from_grads(grads, &model);
                clip_grad_norm::<B, _>(&model, &mut grads, options.grad_clip_norm);
                model = optimizer.step(options.learning_rate, model, grads);
            }

            let train_loss = if count > 0 { total_loss / count as f64 } else { 0.0 };

            let valid_model = model.valid();
            let val_metric = evaluate(&valid_model, &val_loader, kind)?;

            history.push(EpochMetrics {
                epoch,
                total_epochs: options.epochs,
                train_loss,
                val_metric,
            });

            let improved = best.offer(epoch, val_metric, || valid_model.clone());

            log::info!(
                "[{}] epoch {}/{} loss={:.4} val_{}={:.4}{} ({:.1}s)",
                modality,
                epoch,
                options.epochs,
                train_loss,
                goal.metric_name(),
                val_metric,
                if improved { " *" } else { "" },
                epoch_start.elapsed().as_secs_f32()
            );

            pb.set_message(format!(
                "Epoch {}: loss={:.4}, val_{}={:.4}",
                epoch,
                train_loss,
                goal.metric_name(),
                val_metric
            ));
            pb.inc(1);
        }
        pb.finish_with_message("Training completed!");

        // Zero epochs still yield the initial weights.
        let (model, metric, epoch) = best
            .into_best()
            .unwrap_or_else(|| (model.valid(), 0.0, 0));

        Ok(ModelArtifact {
            model,
            meta: CheckpointMeta {
                modality,
                blueprint,
                image_size: options.image_size,
                classes: options.classes.clone(),
                metric_name: goal.metric_name().to_string(),
                metric,
                epoch,
            },
            history,
        })
    }
}

/// One full pass over `loader`: macro-F1 for classification, MAE for
/// regression. An empty loader scores 0.0.
pub fn evaluate<B: Backend, S: LabeledSample>(
    model: &RiskModel<B>,
    loader: &BatchLoader<B, S>,
    kind: HeadKind,
) -> Result<f64> {
    match kind {
        HeadKind::Classification => {
            let mut y_true = Vec::new();
            let mut y_pred = Vec::new();
            for batch in loader.iter_epoch(0) {
                let batch = batch?;
                y_true.extend(batch.targets.iter().filter_map(|t| t.class()));
                let preds = model.forward(batch.images).argmax(1).into_data();
                y_pred.extend(preds.iter::<i64>().map(|p| p as usize));
            }
            Ok(macro_f1(&y_true, &y_pred))
        }
        HeadKind::Regression => {
            let mut y_true = Vec::new();
            let mut y_pred = Vec::new();
            for batch in loader.iter_epoch(0) {
                let batch = batch?;
                y_true.extend(batch.targets.iter().filter_map(|t| t.value()).map(f64::from));
                let preds = model.forward_regression(batch.images).into_data();
                y_pred.extend(preds.iter::<f32>().map(f64::from));
            }
            Ok(mae(&y_true, &y_pred))
        }
    }
}

/// Dataset for `modality` as laid out in `config`.
fn scan_classification(config: &PipelineConfig, modality: Modality) -> Result<DatasetSplit<crate::data::ImageSample>> {
    let data = config.data.modality(modality);
    let root = match modality {
        Modality::Eye => config.paths.eye_root(),
        _ => config.paths.brain_root(),
    };
    let mode = match ScanMode::detect(&root, data.use_split_subdirs) {
        ScanMode::Raw { .. } => ScanMode::Raw {
            train_ratio: config.data.train_ratio,
            seed: config.training.seed,
        },
        mode => mode,
    };
    scan_labeled_folders(modality, &root, &data.classes, mode)
}

/// Build the dataset, train and write the best checkpoint of one modality.
pub fn run_modality<B: AutodiffBackend>(
    config: &PipelineConfig,
    modality: Modality,
    device: B::Device,
) -> Result<ModelArtifact<B::InnerBackend>> {
    config.validate()?;
    let options = TrainOptions::from_config(config, modality);
    let trainer = Trainer::<B>::new(device);

    let artifact = match modality {
        Modality::Eye | Modality::Brain => {
            let split = scan_classification(config, modality)?;
            trainer.train(modality, &split, &options)?
        }
        Modality::Cimt => {
            let split = load_regression_split(
                &config.paths.cimt_info(),
                &config.paths.cimt_images(),
                &config.data.cimt.target,
                config.data.train_ratio,
                config.training.seed,
            )?;
            trainer.train(modality, &split, &options)?
        }
    };

    save_checkpoint(&artifact, &config.checkpoint_dir(modality))?;
    Ok(artifact)
}
