//! Adam optimizer

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use super::param::{NamedTensor, Param};

pub const DEFAULT_BETAS: (f32, f32) = (0.9, 0.999);
pub const DEFAULT_EPS: f32 = 1e-8;

/// Adam with bias-corrected first and second moment estimates.
///
/// Moment buffers are created on the first `step` and follow the parameter
/// order passed in, which must stay the same across steps.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    step: u64,
    exp_avg: Vec<Array2<f32>>,
    exp_avg_sq: Vec<Array2<f32>>,
}

/// Serializable optimizer state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub lr: f32,
    pub betas: (f32, f32),
    pub eps: f32,
    pub step: u64,
    pub exp_avg: Vec<NamedTensor>,
    pub exp_avg_sq: Vec<NamedTensor>,
}

impl Adam {
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: DEFAULT_BETAS.0,
            beta2: DEFAULT_BETAS.1,
            eps: DEFAULT_EPS,
            step: 0,
            exp_avg: Vec::new(),
            exp_avg_sq: Vec::new(),
        }
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub fn steps_taken(&self) -> u64 {
        self.step
    }

    pub fn step(&mut self, params: &mut [&mut Param]) {
        if self.exp_avg.len() != params.len() {
            self.exp_avg = params.iter().map(|p| Array2::zeros(p.shape())).collect();
            self.exp_avg_sq = params.iter().map(|p| Array2::zeros(p.shape())).collect();
        }

        self.step += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.step as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.step as i32);
        let (lr, beta1, beta2, eps) = (self.lr, self.beta1, self.beta2, self.eps);

        for ((param, m), v) in params
            .iter_mut()
            .zip(self.exp_avg.iter_mut())
            .zip(self.exp_avg_sq.iter_mut())
        {
            let Param { value, grad } = &mut **param;
            Zip::from(value)
                .and(&*grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }

    pub fn state(&self) -> AdamState {
        let tensors = |bufs: &[Array2<f32>], prefix: &str| -> Vec<NamedTensor> {
            bufs.iter()
                .enumerate()
                .map(|(i, b)| NamedTensor {
                    name: format!("{}.{}", prefix, i),
                    shape: b.dim(),
                    data: b.iter().copied().collect(),
                })
                .collect()
        };

        AdamState {
            lr: self.lr,
            betas: (self.beta1, self.beta2),
            eps: self.eps,
            step: self.step,
            exp_avg: tensors(&self.exp_avg, "exp_avg"),
            exp_avg_sq: tensors(&self.exp_avg_sq, "exp_avg_sq"),
        }
    }

    /// Restore from a saved state; moment shapes must match `shapes`
    pub fn load_state(&mut self, state: &AdamState, shapes: &[(usize, usize)]) -> PipelineResult<()> {
        if state.exp_avg.len() != state.exp_avg_sq.len() {
            return Err(PipelineError::Checkpoint(
                "optimizer moment buffers differ in length".to_string(),
            ));
        }
        if !state.exp_avg.is_empty() && state.exp_avg.len() != shapes.len() {
            return Err(PipelineError::Checkpoint(format!(
                "optimizer holds {} buffers, model has {} parameters",
                state.exp_avg.len(),
                shapes.len()
            )));
        }

        let restore = |tensors: &[NamedTensor]| -> PipelineResult<Vec<Array2<f32>>> {
            tensors
                .iter()
                .zip(shapes)
                .map(|(t, &shape)| {
                    if t.shape != shape {
                        return Err(PipelineError::Checkpoint(format!(
                            "optimizer buffer {} has shape {:?}, expected {:?}",
                            t.name, t.shape, shape
                        )));
                    }
                    Ok(Array2::from_shape_vec(shape, t.data.clone())?)
                })
                .collect()
        };

        self.exp_avg = restore(&state.exp_avg)?;
        self.exp_avg_sq = restore(&state.exp_avg_sq)?;
        self.lr = state.lr;
        self.beta1 = state.betas.0;
        self.beta2 = state.betas.1;
        self.eps = state.eps;
        self.step = state.step;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_first_step_moves_by_lr() {
        let mut p = Param::zeros(1, 2);
        p.value = array![[1.0, -1.0]];
        p.grad = array![[0.5, -2.0]];

        let mut adam = Adam::new(0.1);
        adam.step(&mut [&mut p]);

        // Bias-corrected first step is lr * sign(g)
        assert!((p.value[[0, 0]] - 0.9).abs() < 1e-5);
        assert!((p.value[[0, 1]] + 0.9).abs() < 1e-5);
        assert_eq!(adam.steps_taken(), 1);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut p = Param::zeros(1, 1);
        p.value[[0, 0]] = 5.0;
        let mut adam = Adam::new(0.1);

        for _ in 0..1000 {
            p.zero_grad();
            p.grad[[0, 0]] = 2.0 * (p.value[[0, 0]] - 2.0);
            adam.step(&mut [&mut p]);
        }

        assert!((p.value[[0, 0]] - 2.0).abs() < 5e-2);
    }

    #[test]
    fn test_state_round_trip() {
        let mut p = Param::zeros(2, 3);
        p.grad.fill(0.25);
        let mut adam = Adam::new(1e-3);
        adam.step(&mut [&mut p]);
        adam.step(&mut [&mut p]);

        let state = adam.state();
        let mut restored = Adam::new(0.5);
        restored.load_state(&state, &[(2, 3)]).unwrap();

        assert_eq!(restored.state(), state);
    }

    #[test]
    fn test_load_state_rejects_wrong_shape() {
        let mut p = Param::zeros(2, 3);
        let mut adam = Adam::new(1e-3);
        adam.step(&mut [&mut p]);

        let err = Adam::new(1e-3).load_state(&adam.state(), &[(3, 2)]).unwrap_err();
        assert!(matches!(err, PipelineError::Checkpoint(_)));
    }
}
