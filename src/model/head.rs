use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

/// Linear head over the pooled features: class logits or a single regression output.
#[derive(Module, Debug)]
pub struct LinearHead<B: Backend> {
    fc: Linear<B>,
    num_outputs: usize,
}

impl<B: Backend> LinearHead<B> {
    pub fn new(device: &B::Device, in_features: usize, num_outputs: usize) -> Self {
        log::debug!("LinearHead init: {in_features} -> {num_outputs}");

        Self {
            fc: LinearConfig::new(in_features, num_outputs).init(device),
            num_outputs,
        }
    }

    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.fc.forward(features)
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }
}
