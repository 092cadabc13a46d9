//! Time-distributed fully connected layer

use ndarray::{Array3, Axis};
use rand::Rng;

use super::param::Param;

/// `y = x W^T + b`, applied independently at every timestep of a
/// `(batch, seq_len, in_features)` input.
#[derive(Debug, Clone)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    /// `(out_features, in_features)`
    pub weight: Param,
    /// `(1, out_features)`
    pub bias: Param,
}

/// Input kept for the backward pass
#[derive(Debug, Clone)]
pub struct LinearCache {
    input: Array3<f32>,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features as f32).sqrt();
        Self {
            in_features,
            out_features,
            weight: Param::uniform(out_features, in_features, bound, rng),
            bias: Param::uniform(1, out_features, bound, rng),
        }
    }

    pub fn forward(&self, x: &Array3<f32>) -> Array3<f32> {
        let (batch, seq_len, _) = x.dim();
        let mut out = Array3::<f32>::zeros((batch, seq_len, self.out_features));

        for t in 0..seq_len {
            let mut y = x.index_axis(Axis(1), t).dot(&self.weight.value.t());
            y += &self.bias.value;
            out.index_axis_mut(Axis(1), t).assign(&y);
        }

        out
    }

    pub fn forward_train(&self, x: &Array3<f32>) -> (Array3<f32>, LinearCache) {
        (self.forward(x), LinearCache { input: x.clone() })
    }

    /// Accumulate parameter gradients, return the gradient w.r.t. the input
    pub fn backward(&mut self, cache: &LinearCache, grad_out: &Array3<f32>) -> Array3<f32> {
        let (batch, seq_len, _) = grad_out.dim();
        let mut grad_in = Array3::<f32>::zeros((batch, seq_len, self.in_features));

        for t in 0..seq_len {
            let x_t = cache.input.index_axis(Axis(1), t);
            let g_t = grad_out.index_axis(Axis(1), t);

            self.weight.grad += &g_t.t().dot(&x_t);
            self.bias.grad += &g_t.sum_axis(Axis(0)).insert_axis(Axis(0));
            grad_in.index_axis_mut(Axis(1), t).assign(&g_t.dot(&self.weight.value));
        }

        grad_in
    }

    pub fn params(&self) -> [&Param; 2] {
        [&self.weight, &self.bias]
    }

    pub fn params_mut(&mut self) -> [&mut Param; 2] {
        [&mut self.weight, &mut self.bias]
    }
}
