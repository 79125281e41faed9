use crate::model::blocks::Conv;
use burn::prelude::*;

/// Two 3×3 convolutions with an optional residual connection.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    cv1: Conv<B>,
    cv2: Conv<B>,
    add: bool,
}

impl<B: Backend> Bottleneck<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        shortcut: bool,
        expansion: f64,
    ) -> Self {
        let hidden = ((out_channels as f64 * expansion) as usize).max(1);

        Self {
            cv1: Conv::same(device, in_channels, hidden),
            cv2: Conv::same(device, hidden, out_channels),
            // residual only when shapes line up
            add: shortcut && in_channels == out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = self.cv2.forward(self.cv1.forward(x.clone()));
        if self.add {
            x + y
        } else {
            y
        }
    }
}
