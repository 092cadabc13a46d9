//! Trainable parameter storage

use ndarray::Array2;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Weight matrix or bias row with its accumulated gradient.
///
/// Biases are stored as `(1, n)` so every parameter is two-dimensional.
#[derive(Debug, Clone)]
pub struct Param {
    pub value: Array2<f32>,
    pub grad: Array2<f32>,
}

impl Param {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            value: Array2::zeros((rows, cols)),
            grad: Array2::zeros((rows, cols)),
        }
    }

    /// Values drawn from `U(-bound, bound)`
    pub fn uniform<R: Rng + ?Sized>(rows: usize, cols: usize, bound: f32, rng: &mut R) -> Self {
        let dist = Uniform::new_inclusive(-bound, bound);
        let value = Array2::from_shape_fn((rows, cols), |_| dist.sample(rng));
        Self {
            value,
            grad: Array2::zeros((rows, cols)),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.value.dim()
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    pub fn to_tensor(&self, name: &str) -> NamedTensor {
        NamedTensor {
            name: name.to_string(),
            shape: self.shape(),
            data: self.value.iter().copied().collect(),
        }
    }
}

/// Serializable copy of one parameter, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub name: String,
    pub shape: (usize, usize),
    pub data: Vec<f32>,
}
