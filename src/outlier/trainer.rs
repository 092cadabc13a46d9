//! Mini-batch training loop for the autoencoder

use std::path::Path;

use crate::error::PipelineResult;
use super::checkpoint::{self, TrainerCheckpoint};
use super::config::Device;
use super::model::LstmAutoencoder;
use super::nn::{mse, mse_loss, Adam};
use super::split::DataLoader;

/// Trains an `LstmAutoencoder` to reconstruct its input with MSE loss and Adam
pub struct AutoencoderTrainer {
    model: LstmAutoencoder,
    device: Device,
    epochs: usize,
    learning_rate: f32,
    log_interval: usize,
    optimizer: Adam,
    pub train_losses: Vec<f64>,
    pub test_losses: Vec<f64>,
}

impl AutoencoderTrainer {
    pub fn new(
        model: LstmAutoencoder,
        device: Device,
        epochs: usize,
        learning_rate: f32,
        log_interval: usize,
    ) -> Self {
        Self {
            model,
            device,
            epochs,
            learning_rate,
            log_interval: log_interval.max(1),
            optimizer: Adam::new(learning_rate),
            train_losses: Vec::new(),
            test_losses: Vec::new(),
        }
    }

    pub fn model(&self) -> &LstmAutoencoder {
        &self.model
    }

    pub fn into_model(self) -> LstmAutoencoder {
        self.model
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// One pass over the loader with dropout on; returns the mean batch loss
    pub fn train_epoch(&mut self, loader: &mut DataLoader<'_>) -> PipelineResult<f64> {
        let size = loader.num_samples();
        let batches = loader.next_epoch();
        if batches.is_empty() {
            tracing::warn!("Training loader is empty, skipping epoch");
            return Ok(0.0);
        }

        let mut total = 0.0f64;
        let mut current = 0usize;

        for (batch_idx, indices) in batches.iter().enumerate() {
            let batch = loader.load(indices)?;
            current += indices.len();

            self.model.zero_grad();
            let (pred, cache) = self.model.forward_train(&batch);
            let (loss, grad) = mse_loss(&pred, &batch);
            self.model.backward(&cache, &grad);
            self.optimizer.step(&mut self.model.params_mut());

            total += loss as f64;

            if batch_idx % self.log_interval == 0 {
                tracing::debug!("loss: {:>7.6} [{:>5}/{:>5}]", loss, current, size);
            }
        }

        Ok(total / batches.len() as f64)
    }

    /// Mean batch loss over the loader without dropout or updates
    pub fn test_epoch(&self, loader: &mut DataLoader<'_>) -> PipelineResult<f64> {
        let batches = loader.next_epoch();
        if batches.is_empty() {
            tracing::warn!("Test loader is empty, skipping evaluation");
            return Ok(0.0);
        }

        let mut total = 0.0f64;
        for indices in &batches {
            let batch = loader.load(indices)?;
            total += mse(&self.model.forward(&batch), &batch) as f64;
        }

        let avg = total / batches.len() as f64;
        tracing::debug!("Test error: avg loss {:>8.6}", avg);
        Ok(avg)
    }

    /// Train for `epochs` (or the configured count), evaluating on `test`
    /// after each epoch when given.
    pub fn fit(
        &mut self,
        train: &mut DataLoader<'_>,
        mut test: Option<&mut DataLoader<'_>>,
        epochs: Option<usize>,
    ) -> PipelineResult<()> {
        let epochs = epochs.unwrap_or(self.epochs);

        tracing::info!(
            epochs,
            train_windows = train.num_samples(),
            parameters = self.model.num_parameters(),
            device = %self.device,
            "Training started"
        );

        for epoch in 1..=epochs {
            let train_loss = self.train_epoch(train)?;
            self.train_losses.push(train_loss);

            let test_loss = match test.as_deref_mut() {
                Some(loader) => {
                    let loss = self.test_epoch(loader)?;
                    self.test_losses.push(loss);
                    Some(loss)
                }
                None => None,
            };

            tracing::debug!(epoch, train_loss, ?test_loss, "Epoch finished");
        }

        tracing::info!(
            final_train_loss = ?self.train_losses.last(),
            final_test_loss = ?self.test_losses.last(),
            "Training complete"
        );
        Ok(())
    }

    pub fn checkpoint(&self) -> TrainerCheckpoint {
        TrainerCheckpoint {
            model: self.model.state_dict(),
            optimizer: self.optimizer.state(),
            train_losses: self.train_losses.clone(),
            test_losses: self.test_losses.clone(),
        }
    }

    pub fn save_checkpoint(&self, path: &Path) -> PipelineResult<()> {
        checkpoint::save(&self.checkpoint(), path)
    }

    /// Restore weights, optimizer state and loss history.
    ///
    /// Nothing changes unless the whole checkpoint is accepted.
    pub fn load_checkpoint(&mut self, path: &Path) -> PipelineResult<()> {
        let saved = checkpoint::load(path)?;

        let mut model = self.model.clone();
        model.load_state_dict(&saved.model)?;
        let mut optimizer = self.optimizer.clone();
        optimizer.load_state(&saved.optimizer, &model.param_shapes())?;

        self.model = model;
        self.optimizer = optimizer;
        self.train_losses = saved.train_losses;
        self.test_losses = saved.test_losses;
        Ok(())
    }
}
