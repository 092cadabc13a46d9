//! Minimal CPU neural-network building blocks on top of ndarray

pub mod linear;
pub mod lstm;
pub mod optim;
pub mod param;

pub use linear::{Linear, LinearCache};
pub use lstm::{Lstm, LstmCache};
pub use optim::{Adam, AdamState};
pub use param::{NamedTensor, Param};

use ndarray::{Array3, Zip};
use rand::Rng;

/// Inverted dropout: kept activations are scaled by `1 / (1 - p)`
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    pub p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> Self {
        Self { p }
    }

    /// Random mask of zeros and `1 / (1 - p)`
    pub fn mask<R: Rng + ?Sized>(&self, shape: (usize, usize, usize), rng: &mut R) -> Array3<f32> {
        if self.p <= 0.0 {
            return Array3::ones(shape);
        }
        let keep = 1.0 - self.p;
        let scale = 1.0 / keep;
        Array3::from_shape_fn(shape, |_| if rng.gen::<f32>() < keep { scale } else { 0.0 })
    }
}

/// Mean squared error and its gradient w.r.t. `pred`
pub fn mse_loss(pred: &Array3<f32>, target: &Array3<f32>) -> (f32, Array3<f32>) {
    let n = pred.len().max(1) as f32;
    let diff = pred - target;
    let loss = diff.iter().map(|d| d * d).sum::<f32>() / n;
    let grad = diff * (2.0 / n);
    (loss, grad)
}

/// Mean squared error without the gradient
pub fn mse(pred: &Array3<f32>, target: &Array3<f32>) -> f32 {
    let mut total = 0.0f32;
    Zip::from(pred).and(target).for_each(|&p, &t| total += (p - t) * (p - t));
    total / pred.len().max(1) as f32
}
