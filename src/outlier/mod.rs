//! LSTM autoencoder outlier detection
//!
//! Windows a dataset, trains an autoencoder to reconstruct the windows,
//! averages reconstruction error per timestep, flags timesteps by modified
//! z-score and merges flagged runs into anomaly intervals.

pub mod checkpoint;
pub mod config;
pub mod grouping;
pub mod model;
pub mod nn;
pub mod run;
pub mod scaler;
pub mod scoring;
pub mod split;
pub mod trainer;
pub mod windows;

pub use config::{AnalysisConfig, Device, ResolvedConfig};
pub use grouping::{group_anomalies, group_timestamps};
pub use model::{LstmAutoencoder, Reconstructor};
pub use run::{detect_outliers, run_analysis, train_lstmae, DetectionOutcome, RunOptions};
pub use scaler::{Normalization, Scaler};
pub use scoring::{modified_z_scores, outlier_mask, reconstruct_series, ReconstructionProfile};
pub use split::{train_test_split, DataLoader, TrainTestSplit};
pub use trainer::AutoencoderTrainer;
pub use windows::WindowedSeries;
