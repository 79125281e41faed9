use burn::prelude::*;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::Arc;

use super::dataset::{LabeledSample, Target};
use super::transforms::Transform;
use crate::dataset::preprocessing::{load_image, PreprocessedImage};
use crate::error::{NeurolensError, Result};

/// Order in which samples are drawn each epoch.
#[derive(Debug, Clone)]
pub enum SamplingStrategy {
    Sequential,
    /// Permutation reseeded per epoch.
    Shuffle { seed: u64 },
    /// `len` draws with replacement, proportional to per-sample weights.
    Weighted { dist: WeightedIndex<f64>, seed: u64 },
}

impl SamplingStrategy {
    pub fn weighted(weights: &[f64], seed: u64) -> Result<Self> {
        let dist = WeightedIndex::new(weights)
            .map_err(|e| NeurolensError::InvalidConfig(format!("sample weights: {e}")))?;
        Ok(Self::Weighted { dist, seed })
    }
}

/// Per-sample weights from per-class weights; classes without an entry weigh 1.0.
pub fn class_balanced_weights<S: LabeledSample>(samples: &[S], class_weights: &[f32]) -> Vec<f64> {
    samples
        .iter()
        .map(|s| {
            s.target()
                .class()
                .and_then(|c| class_weights.get(c))
                .map(|w| *w as f64)
                .unwrap_or(1.0)
        })
        .collect()
}

// splitmix64 finalizer
fn mix_seed(seed: u64, epoch: usize, index: usize) -> u64 {
    let mut z = seed
        .wrapping_add((epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add((index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub struct Batch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Vec<Target>,
}

impl<B: Backend> Batch<B> {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn class_targets(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        let labels: Vec<i64> = self
            .targets
            .iter()
            .map(|t| t.class().unwrap_or_default() as i64)
            .collect();
        let n = labels.len();
        Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [n]), device)
    }

    pub fn value_targets(&self, device: &B::Device) -> Tensor<B, 1> {
        let values: Vec<f32> = self
            .targets
            .iter()
            .map(|t| t.value().unwrap_or_default())
            .collect();
        let n = values.len();
        Tensor::<B, 1>::from_data(TensorData::new(values, [n]), device)
    }
}

/// Decodes, augments and batches samples.
///
/// With `num_workers > 0` images are loaded on a dedicated rayon pool; every
/// worker owns a clone of the transform and every draw gets its own RNG
/// seeded from `(seed, epoch, draw index)`, so batches do not depend on
/// scheduling.
pub struct BatchLoader<B: Backend, S: LabeledSample> {
    samples: Arc<Vec<S>>,
    transform: Transform,
    batch_size: usize,
    sampling: SamplingStrategy,
    seed: u64,
    pool: Option<Arc<rayon::ThreadPool>>,
    device: B::Device,
}

impl<B: Backend, S: LabeledSample> BatchLoader<B, S> {
    pub fn new(samples: Vec<S>, transform: Transform, batch_size: usize, device: B::Device) -> Self {
        Self {
            samples: Arc::new(samples),
            transform,
            batch_size: batch_size.max(1),
            sampling: SamplingStrategy::Sequential,
            seed: 0,
            pool: None,
            device,
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingStrategy) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// `0` loads on the calling thread.
    pub fn with_workers(mut self, num_workers: usize) -> Result<Self> {
        self.pool = if num_workers == 0 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(num_workers)
                .thread_name(|i| format!("neurolens-loader-{i}"))
                .build()
                .map_err(|e| NeurolensError::InvalidConfig(format!("worker pool: {e}")))?;
            Some(Arc::new(pool))
        };
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    pub fn samples(&self) -> &[S] {
        &self.samples
    }

    /// Sample indices drawn in `epoch`.
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let n = self.samples.len();
        match &self.sampling {
            SamplingStrategy::Sequential => (0..n).collect(),
            SamplingStrategy::Shuffle { seed } => {
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut StdRng::seed_from_u64(mix_seed(*seed, epoch, usize::MAX)));
                order
            }
            SamplingStrategy::Weighted { dist, seed } => {
                let mut rng = StdRng::seed_from_u64(mix_seed(*seed, epoch, usize::MAX));
                (0..n).map(|_| dist.sample(&mut rng)).collect()
            }
        }
    }

    pub fn iter_epoch(&self, epoch: usize) -> EpochIter<'_, B, S> {
        EpochIter {
            loader: self,
            order: self.epoch_order(epoch),
            epoch,
            cursor: 0,
        }
    }

    fn load_batch(&self, epoch: usize, draws: &[(usize, usize)]) -> Result<Batch<B>> {
        let samples = self.samples.as_slice();
        let seed = self.seed;

        let loaded: Vec<Result<PreprocessedImage>> = match &self.pool {
            Some(pool) => pool.install(|| {
                draws
                    .par_iter()
                    .map_init(
                        || self.transform.clone(),
                        |transform, &(draw, idx)| load_one(samples, transform, seed, epoch, draw, idx),
                    )
                    .collect()
            }),
            None => draws
                .iter()
                .map(|&(draw, idx)| load_one(samples, &self.transform, seed, epoch, draw, idx))
                .collect(),
        };

        let size = self.transform.size() as usize;
        let mut data = Vec::with_capacity(draws.len() * 3 * size * size);
        for image in loaded {
            data.extend_from_slice(image?.data());
        }

        let targets = draws.iter().map(|&(_, idx)| samples[idx].target()).collect();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(data, [draws.len(), 3, size, size]),
            &self.device,
        );

        Ok(Batch { images, targets })
    }
}

fn load_one<S: LabeledSample>(
    samples: &[S],
    transform: &Transform,
    seed: u64,
    epoch: usize,
    draw: usize,
    idx: usize,
) -> Result<PreprocessedImage> {
    let img = load_image(samples[idx].path())?;
    let mut rng = StdRng::seed_from_u64(mix_seed(seed, epoch, draw));
    Ok(transform.apply(&img, &mut rng))
}

pub struct EpochIter<'a, B: Backend, S: LabeledSample> {
    loader: &'a BatchLoader<B, S>,
    order: Vec<usize>,
    epoch: usize,
    cursor: usize,
}

impl<B: Backend, S: LabeledSample> Iterator for EpochIter<'_, B, S> {
    type Item = Result<Batch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let draws: Vec<(usize, usize)> = (self.cursor..end).map(|d| (d, self.order[d])).collect();
        self.cursor = end;

        Some(self.loader.load_batch(self.epoch, &draws))
    }
}
