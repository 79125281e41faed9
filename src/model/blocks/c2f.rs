use super::{Bottleneck, Conv};
use burn::prelude::*;

/// CSP block: split the projected input in two halves, run one half through
/// `n` bottlenecks, concatenate every intermediate output and fuse.
#[derive(Module, Debug)]
pub struct C2f<B: Backend> {
    cv1: Conv<B>,
    cv2: Conv<B>,
    bottlenecks: Vec<Bottleneck<B>>,
    split_channels: usize,
}

impl<B: Backend> C2f<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        n: usize,
        shortcut: bool,
    ) -> Self {
        let hidden = (out_channels / 2).max(1);
        let bottlenecks = (0..n)
            .map(|_| Bottleneck::new(device, hidden, hidden, shortcut, 1.0))
            .collect();

        Self {
            cv1: Conv::pointwise(device, in_channels, hidden * 2),
            cv2: Conv::pointwise(device, hidden * (2 + n), out_channels),
            bottlenecks,
            split_channels: hidden,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.cv1.forward(x);

        let passthrough = x.clone().narrow(1, 0, self.split_channels);
        let mut branch = x.narrow(1, self.split_channels, self.split_channels);

        let mut outputs = Vec::with_capacity(self.bottlenecks.len() + 2);
        outputs.push(passthrough);
        outputs.push(branch.clone());

        for bottleneck in &self.bottlenecks {
            branch = bottleneck.forward(branch);
            outputs.push(branch.clone());
        }

        self.cv2.forward(Tensor::cat(outputs, 1))
    }
}
