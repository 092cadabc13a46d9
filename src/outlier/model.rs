//! LSTM autoencoder
//!
//! Encoder: LSTM(n_features -> hidden) -> dropout -> LSTM(hidden -> internal)
//! -> dropout -> Linear(internal -> 1). Decoder: LSTM(1 -> internal) -> dropout
//! -> LSTM(internal -> hidden) -> dropout -> Linear(hidden -> n_features).
//! Every layer is applied per timestep, so the output keeps the input shape.

use ndarray::Array3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use super::nn::{Dropout, Linear, LinearCache, Lstm, LstmCache, NamedTensor, Param};

pub const LATENT_SIZE: usize = 1;
pub const DROPOUT_RATE: f32 = 0.1;

const LSTM_PARAMS: [&str; 4] = ["weight_ih", "weight_hh", "bias_ih", "bias_hh"];
const LINEAR_PARAMS: [&str; 2] = ["weight", "bias"];

/// Anything that maps a `(batch, seq_len, n_features)` batch to a
/// reconstruction of the same shape.
pub trait Reconstructor: Send + Sync {
    fn reconstruct(&self, batch: &Array3<f32>) -> Array3<f32>;
}

/// Sizes needed to rebuild a model from saved weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub sequence_length: usize,
    pub n_features: usize,
    pub internal_size: usize,
    pub hidden_size: usize,
    pub latent_size: usize,
}

/// Serializable weights of an `LstmAutoencoder`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub architecture: ModelArchitecture,
    pub tensors: Vec<NamedTensor>,
}

/// Intermediate activations and dropout masks of one training forward pass
pub struct ForwardCache {
    encoder_lstm1: LstmCache,
    mask1: Array3<f32>,
    encoder_lstm2: LstmCache,
    mask2: Array3<f32>,
    latent_space: LinearCache,
    decoder_lstm1: LstmCache,
    mask3: Array3<f32>,
    decoder_lstm2: LstmCache,
    mask4: Array3<f32>,
    output_layer: LinearCache,
}

#[derive(Debug, Clone)]
pub struct LstmAutoencoder {
    architecture: ModelArchitecture,
    dropout: Dropout,
    encoder_lstm1: Lstm,
    encoder_lstm2: Lstm,
    latent_space: Linear,
    decoder_lstm1: Lstm,
    decoder_lstm2: Lstm,
    output_layer: Linear,
    rng: StdRng,
}

impl LstmAutoencoder {
    /// Build with weights drawn from a generator seeded with `seed`
    pub fn new(
        sequence_length: usize,
        n_features: usize,
        internal_size: usize,
        hidden_size: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let encoder_lstm1 = Lstm::new(n_features, hidden_size, &mut rng);
        let encoder_lstm2 = Lstm::new(hidden_size, internal_size, &mut rng);
        let latent_space = Linear::new(internal_size, LATENT_SIZE, &mut rng);
        let decoder_lstm1 = Lstm::new(LATENT_SIZE, internal_size, &mut rng);
        let decoder_lstm2 = Lstm::new(internal_size, hidden_size, &mut rng);
        let output_layer = Linear::new(hidden_size, n_features, &mut rng);

        Self {
            architecture: ModelArchitecture {
                sequence_length,
                n_features,
                internal_size,
                hidden_size,
                latent_size: LATENT_SIZE,
            },
            dropout: Dropout::new(DROPOUT_RATE),
            encoder_lstm1,
            encoder_lstm2,
            latent_space,
            decoder_lstm1,
            decoder_lstm2,
            output_layer,
            rng,
        }
    }

    pub fn with_dropout_rate(mut self, p: f32) -> Self {
        self.dropout = Dropout::new(p);
        self
    }

    pub fn architecture(&self) -> ModelArchitecture {
        self.architecture
    }

    /// Inference pass, dropout disabled
    pub fn forward(&self, x: &Array3<f32>) -> Array3<f32> {
        let h = self.encoder_lstm1.forward(x);
        let h = self.encoder_lstm2.forward(&h);
        let z = self.latent_space.forward(&h);
        let h = self.decoder_lstm1.forward(&z);
        let h = self.decoder_lstm2.forward(&h);
        self.output_layer.forward(&h)
    }

    /// Training pass with dropout; keeps what `backward` needs
    pub fn forward_train(&mut self, x: &Array3<f32>) -> (Array3<f32>, ForwardCache) {
        let (h, encoder_lstm1) = self.encoder_lstm1.forward_train(x);
        let mask1 = self.dropout.mask(h.dim(), &mut self.rng);
        let h = h * &mask1;

        let (h, encoder_lstm2) = self.encoder_lstm2.forward_train(&h);
        let mask2 = self.dropout.mask(h.dim(), &mut self.rng);
        let h = h * &mask2;

        let (z, latent_space) = self.latent_space.forward_train(&h);

        let (h, decoder_lstm1) = self.decoder_lstm1.forward_train(&z);
        let mask3 = self.dropout.mask(h.dim(), &mut self.rng);
        let h = h * &mask3;

        let (h, decoder_lstm2) = self.decoder_lstm2.forward_train(&h);
        let mask4 = self.dropout.mask(h.dim(), &mut self.rng);
        let h = h * &mask4;

        let (out, output_layer) = self.output_layer.forward_train(&h);

        let cache = ForwardCache {
            encoder_lstm1,
            mask1,
            encoder_lstm2,
            mask2,
            latent_space,
            decoder_lstm1,
            mask3,
            decoder_lstm2,
            mask4,
            output_layer,
        };
        (out, cache)
    }

    /// Accumulate gradients of every parameter given `dLoss/dOutput`
    pub fn backward(&mut self, cache: &ForwardCache, grad_out: &Array3<f32>) {
        let g = self.output_layer.backward(&cache.output_layer, grad_out);
        let g = g * &cache.mask4;
        let g = self.decoder_lstm2.backward(&cache.decoder_lstm2, &g);
        let g = g * &cache.mask3;
        let g = self.decoder_lstm1.backward(&cache.decoder_lstm1, &g);
        let g = self.latent_space.backward(&cache.latent_space, &g);
        let g = g * &cache.mask2;
        let g = self.encoder_lstm2.backward(&cache.encoder_lstm2, &g);
        let g = g * &cache.mask1;
        self.encoder_lstm1.backward(&cache.encoder_lstm1, &g);
    }

    pub fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    /// Parameters in a fixed order matching `param_names`
    pub fn params(&self) -> Vec<&Param> {
        let mut params = Vec::with_capacity(20);
        params.extend(self.encoder_lstm1.params());
        params.extend(self.encoder_lstm2.params());
        params.extend(self.latent_space.params());
        params.extend(self.decoder_lstm1.params());
        params.extend(self.decoder_lstm2.params());
        params.extend(self.output_layer.params());
        params
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = Vec::with_capacity(20);
        params.extend(self.encoder_lstm1.params_mut());
        params.extend(self.encoder_lstm2.params_mut());
        params.extend(self.latent_space.params_mut());
        params.extend(self.decoder_lstm1.params_mut());
        params.extend(self.decoder_lstm2.params_mut());
        params.extend(self.output_layer.params_mut());
        params
    }

    /// Dotted parameter names, e.g. `encoder_lstm1.weight_ih`
    pub fn param_names() -> Vec<String> {
        let layers: [(&str, &[&str]); 6] = [
            ("encoder_lstm1", &LSTM_PARAMS),
            ("encoder_lstm2", &LSTM_PARAMS),
            ("latent_space", &LINEAR_PARAMS),
            ("decoder_lstm1", &LSTM_PARAMS),
            ("decoder_lstm2", &LSTM_PARAMS),
            ("output_layer", &LINEAR_PARAMS),
        ];

        layers
            .iter()
            .flat_map(|(layer, names)| names.iter().map(move |n| format!("{}.{}", layer, n)))
            .collect()
    }

    pub fn param_shapes(&self) -> Vec<(usize, usize)> {
        self.params().iter().map(|p| p.shape()).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.params().iter().map(|p| p.value.len()).sum()
    }

    pub fn state_dict(&self) -> ModelState {
        let tensors = Self::param_names()
            .iter()
            .zip(self.params())
            .map(|(name, p)| p.to_tensor(name))
            .collect();

        ModelState {
            architecture: self.architecture,
            tensors,
        }
    }

    /// Copy saved weights in. Architecture, names and shapes must all match.
    pub fn load_state_dict(&mut self, state: &ModelState) -> PipelineResult<()> {
        if state.architecture != self.architecture {
            return Err(PipelineError::Checkpoint(format!(
                "architecture mismatch: saved {:?}, model {:?}",
                state.architecture, self.architecture
            )));
        }

        let names = Self::param_names();
        if state.tensors.len() != names.len() {
            return Err(PipelineError::Checkpoint(format!(
                "expected {} tensors, found {}",
                names.len(),
                state.tensors.len()
            )));
        }

        for ((name, tensor), param) in names.iter().zip(&state.tensors).zip(self.params()) {
            if &tensor.name != name || tensor.shape != param.shape() {
                return Err(PipelineError::Checkpoint(format!(
                    "tensor {} {:?} does not match {} {:?}",
                    tensor.name,
                    tensor.shape,
                    name,
                    param.shape()
                )));
            }
        }

        for (tensor, param) in state.tensors.iter().zip(self.params_mut()) {
            param.value = ndarray::Array2::from_shape_vec(tensor.shape, tensor.data.clone())?;
            param.zero_grad();
        }

        Ok(())
    }
}

impl Reconstructor for LstmAutoencoder {
    fn reconstruct(&self, batch: &Array3<f32>) -> Array3<f32> {
        self.forward(batch)
    }
}
