//! Analysis configuration
//!
//! Requests carry an `AnalysisConfig` where every field has a default. It is
//! validated and then resolved once into a `ResolvedConfig` with a concrete
//! seed, device and scaler.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{PipelineError, PipelineResult};
use super::scaler::{Normalization, Scaler};

/// Accelerator names recognised in requests but not available in this build
const ACCELERATORS: [&str; 5] = ["cuda", "mtia", "xpu", "mps", "hpu"];

/// Seeds are drawn from this range when none is given
const SEED_RANGE: std::ops::Range<u64> = 1..1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatasetConfig {
    #[validate(range(min = 1))]
    pub sequence_length: usize,

    #[validate(range(min = 1))]
    pub stride: usize,

    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub test_size: f64,

    pub shuffle: bool,

    /// Missing or `null` leaves values unscaled
    pub normalize: Option<Normalization>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sequence_length: 32,
            stride: 1,
            test_size: 0.2,
            shuffle: false,
            normalize: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HyperparameterConfig {
    #[validate(range(min = 1))]
    pub batch_size: usize,

    #[validate(range(min = 1))]
    pub hidden_size: usize,

    #[validate(range(min = 1))]
    pub internal_size: usize,

    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub learning_rate: f64,
}

impl Default for HyperparameterConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            hidden_size: 32,
            internal_size: 16,
            learning_rate: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TrainingConfig {
    #[validate(range(min = 1))]
    pub epochs: usize,

    #[validate(range(min = 1))]
    pub log_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            log_interval: 10,
        }
    }
}

/// Full request-level configuration of one LSTM-AE analysis
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AnalysisConfig {
    #[validate(range(min = 1))]
    pub seed: Option<u64>,

    #[validate(range(exclusive_min = 0.0))]
    pub threshold: f64,

    pub device: Option<String>,

    #[validate(nested)]
    pub dataset: DatasetConfig,

    #[validate(nested)]
    pub hyperparameters: HyperparameterConfig,

    #[validate(nested)]
    pub training: TrainingConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            seed: None,
            threshold: 3.5,
            device: None,
            dataset: DatasetConfig::default(),
            hyperparameters: HyperparameterConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Validate, then fix the seed and device for the run
    pub fn resolve(self) -> PipelineResult<ResolvedConfig> {
        self.validate()?;

        let device = match self.device.as_deref() {
            Some(name) => Device::parse(name)?,
            None => Device::best_available(),
        };
        let seed = self
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen_range(SEED_RANGE));
        let scaler = self.dataset.normalize.and_then(Normalization::scaler);

        Ok(ResolvedConfig {
            dataset: self.dataset,
            hyperparameters: self.hyperparameters,
            training: self.training,
            seed,
            threshold: self.threshold,
            device,
            scaler,
        })
    }
}

/// Configuration with every optional choice made; immutable for the run
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub dataset: DatasetConfig,
    pub hyperparameters: HyperparameterConfig,
    pub training: TrainingConfig,
    pub seed: u64,
    pub threshold: f64,
    pub device: Device,
    pub scaler: Option<Scaler>,
}

/// Compute device used for training and inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl Device {
    pub fn best_available() -> Self {
        Device::Cpu
    }

    pub fn parse(name: &str) -> PipelineResult<Self> {
        let name = name.trim().to_ascii_lowercase();
        if name == "cpu" {
            return Ok(Device::Cpu);
        }
        if ACCELERATORS.contains(&name.as_str()) {
            return Err(PipelineError::InvalidConfig(format!(
                "device '{}' is not available, only cpu is supported",
                name
            )));
        }
        Err(PipelineError::InvalidConfig(format!("unknown device '{}'", name)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
