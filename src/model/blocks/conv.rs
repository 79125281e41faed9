use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// Conv2d (no bias) → BatchNorm → SiLU.
///
/// Odd kernels are padded by `kernel / 2`, so a stride-1 block keeps the
/// spatial size and a stride-2 block halves it (rounding up).
#[derive(Module, Debug)]
pub struct Conv<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Conv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    /// 1×1 channel projection.
    pub fn pointwise(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self::new(device, in_channels, out_channels, 1, 1)
    }

    /// 3×3, stride 1.
    pub fn same(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self::new(device, in_channels, out_channels, 3, 1)
    }

    /// 3×3, stride 2.
    pub fn downsample(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self::new(device, in_channels, out_channels, 3, 2)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        activation::silu(self.bn.forward(self.conv.forward(x)))
    }
}
