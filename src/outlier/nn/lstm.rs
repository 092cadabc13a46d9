//! Single-layer, batch-first LSTM with backpropagation through time

use ndarray::{s, Array2, Array3, Axis};
use rand::Rng;

use super::param::Param;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Gate layout in the stacked weights is input, forget, cell, output.
/// Initial hidden and cell states are zero.
#[derive(Debug, Clone)]
pub struct Lstm {
    pub input_size: usize,
    pub hidden_size: usize,
    /// `(4 * hidden, input)`
    pub weight_ih: Param,
    /// `(4 * hidden, hidden)`
    pub weight_hh: Param,
    pub bias_ih: Param,
    pub bias_hh: Param,
}

/// Activations of one timestep
#[derive(Debug, Clone)]
struct LstmStep {
    x: Array2<f32>,
    h_prev: Array2<f32>,
    c_prev: Array2<f32>,
    i: Array2<f32>,
    f: Array2<f32>,
    g: Array2<f32>,
    o: Array2<f32>,
    tanh_c: Array2<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct LstmCache {
    steps: Vec<LstmStep>,
}

impl Lstm {
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (hidden_size as f32).sqrt();
        let gates = 4 * hidden_size;
        Self {
            input_size,
            hidden_size,
            weight_ih: Param::uniform(gates, input_size, bound, rng),
            weight_hh: Param::uniform(gates, hidden_size, bound, rng),
            bias_ih: Param::uniform(1, gates, bound, rng),
            bias_hh: Param::uniform(1, gates, bound, rng),
        }
    }

    /// Hidden state at every timestep, `(batch, seq_len, hidden)`
    pub fn forward(&self, x: &Array3<f32>) -> Array3<f32> {
        self.run(x, None)
    }

    pub fn forward_train(&self, x: &Array3<f32>) -> (Array3<f32>, LstmCache) {
        let mut cache = LstmCache::default();
        let out = self.run(x, Some(&mut cache.steps));
        (out, cache)
    }

    fn run(&self, x: &Array3<f32>, mut steps: Option<&mut Vec<LstmStep>>) -> Array3<f32> {
        let (batch, seq_len, _) = x.dim();
        let hs = self.hidden_size;

        let mut h = Array2::<f32>::zeros((batch, hs));
        let mut c = Array2::<f32>::zeros((batch, hs));
        let mut out = Array3::<f32>::zeros((batch, seq_len, hs));

        for t in 0..seq_len {
            let x_t = x.index_axis(Axis(1), t).to_owned();

            let mut gates = x_t.dot(&self.weight_ih.value.t()) + h.dot(&self.weight_hh.value.t());
            gates += &self.bias_ih.value;
            gates += &self.bias_hh.value;

            let i = gates.slice(s![.., 0..hs]).mapv(sigmoid);
            let f = gates.slice(s![.., hs..2 * hs]).mapv(sigmoid);
            let g = gates.slice(s![.., 2 * hs..3 * hs]).mapv(f32::tanh);
            let o = gates.slice(s![.., 3 * hs..4 * hs]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f32::tanh);
            let h_next = &o * &tanh_c;

            out.index_axis_mut(Axis(1), t).assign(&h_next);

            if let Some(steps) = steps.as_deref_mut() {
                steps.push(LstmStep {
                    x: x_t,
                    h_prev: h,
                    c_prev: c,
                    i,
                    f,
                    g,
                    o,
                    tanh_c,
                });
            }

            h = h_next;
            c = c_next;
        }

        out
    }

    /// Accumulate parameter gradients over all timesteps and return the
    /// gradient w.r.t. the input sequence.
    pub fn backward(&mut self, cache: &LstmCache, grad_out: &Array3<f32>) -> Array3<f32> {
        let (batch, seq_len, _) = grad_out.dim();
        let hs = self.hidden_size;

        let mut grad_in = Array3::<f32>::zeros((batch, seq_len, self.input_size));
        let mut dh_next = Array2::<f32>::zeros((batch, hs));
        let mut dc_next = Array2::<f32>::zeros((batch, hs));

        for t in (0..seq_len).rev() {
            let step = &cache.steps[t];

            let dh = &grad_out.index_axis(Axis(1), t) + &dh_next;
            let d_o = &dh * &step.tanh_c;
            let dc = &dh * &step.o * step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;

            let di = &dc * &step.g;
            let dg = &dc * &step.i;
            let df = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            // Back through the gate nonlinearities
            let mut dgates = Array2::<f32>::zeros((batch, 4 * hs));
            dgates
                .slice_mut(s![.., 0..hs])
                .assign(&(di * step.i.mapv(|v| v * (1.0 - v))));
            dgates
                .slice_mut(s![.., hs..2 * hs])
                .assign(&(df * step.f.mapv(|v| v * (1.0 - v))));
            dgates
                .slice_mut(s![.., 2 * hs..3 * hs])
                .assign(&(dg * step.g.mapv(|v| 1.0 - v * v)));
            dgates
                .slice_mut(s![.., 3 * hs..4 * hs])
                .assign(&(d_o * step.o.mapv(|v| v * (1.0 - v))));

            self.weight_ih.grad += &dgates.t().dot(&step.x);
            self.weight_hh.grad += &dgates.t().dot(&step.h_prev);
            let db = dgates.sum_axis(Axis(0)).insert_axis(Axis(0));
            self.bias_ih.grad += &db;
            self.bias_hh.grad += &db;

            grad_in
                .index_axis_mut(Axis(1), t)
                .assign(&dgates.dot(&self.weight_ih.value));
            dh_next = dgates.dot(&self.weight_hh.value);
        }

        grad_in
    }

    pub fn params(&self) -> [&Param; 4] {
        [&self.weight_ih, &self.weight_hh, &self.bias_ih, &self.bias_hh]
    }

    pub fn params_mut(&mut self) -> [&mut Param; 4] {
        [
            &mut self.weight_ih,
            &mut self.weight_hh,
            &mut self.bias_ih,
            &mut self.bias_hh,
        ]
    }
}
