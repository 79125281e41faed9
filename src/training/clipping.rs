use burn::module::{ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    total: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Rescale<'a> {
    grads: &'a mut GradientsParams,
    scale: f32,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register(id, grad.mul_scalar(self.scale));
        }
    }
}

/// L2 norm over every gradient of `module`, taken as one vector.
pub fn global_grad_norm<B: AutodiffBackend, M: Module<B>>(module: &M, grads: &GradientsParams) -> f32 {
    let mut visitor = SquaredNorm { grads, total: 0.0 };
    module.visit(&mut visitor);
    visitor.total.sqrt() as f32
}

/// Scale all gradients of `module` together so their global norm is at most
/// `max_norm`. Returns the norm before clipping.
///
/// A non-finite norm leaves the gradients untouched.
pub fn clip_grad_norm<B: AutodiffBackend, M: Module<B>>(
    module: &M,
    grads: &mut GradientsParams,
    max_norm: f32,
) -> f32 {
    let total = global_grad_norm::<B, M>(module, grads);
    if total.is_finite() && total > max_norm {
        let mut visitor = Rescale {
            grads,
            scale: max_norm / (total + 1e-6),
        };
        module.visit(&mut visitor);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = Autodiff<NdArray>;

    fn linear_with_grads(weight: [f32; 2], bias: f32) -> (Linear<TestBackend>, GradientsParams) {
        let device = Default::default();
        let linear = LinearConfig::new(2, 1).init::<TestBackend>(&device);
        let mut grads = GradientsParams::new();
        grads.register(
            linear.weight.id,
            Tensor::<NdArray, 2>::from_floats([[weight[0]], [weight[1]]], &device),
        );
        if let Some(b) = &linear.bias {
            grads.register(b.id, Tensor::<NdArray, 1>::from_floats([bias], &device));
        }
        (linear, grads)
    }

    #[test]
    fn test_clips_the_joint_norm_of_small_tensors() {
        // weight norm ~0.85 and bias norm 0.8 are each under 1, together ~1.17
        let (linear, mut grads) = linear_with_grads([0.6, 0.6], 0.8);
        let before = clip_grad_norm::<TestBackend, _>(&linear, &mut grads, 1.0);
        assert!((before - 1.36f32.sqrt()).abs() < 1e-4);

        let after = global_grad_norm::<TestBackend, _>(&linear, &grads);
        assert!((after - 1.0).abs() < 1e-4);

        let bias = grads
            .get::<NdArray, 1>(linear.bias.as_ref().unwrap().id)
            .unwrap()
            .into_scalar();
        assert!((bias - 0.8 / 1.36f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_small_norm_is_untouched() {
        let (linear, mut grads) = linear_with_grads([0.3, 0.4], 0.0);
        let before = clip_grad_norm::<TestBackend, _>(&linear, &mut grads, 1.0);
        assert!((before - 0.5).abs() < 1e-5);
        let weight = grads.get::<NdArray, 2>(linear.weight.id).unwrap().into_data();
        weight.assert_approx_eq(&TensorData::from([[0.3f32], [0.4]]), 5);
    }
}
