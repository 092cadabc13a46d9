//! End-to-end LSTM-AE analysis of one dataset

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{AnalysisStatus, NewAnomaly};
use crate::storage::AnalysisStore;
use super::config::ResolvedConfig;
use super::grouping::group_anomalies;
use super::model::LstmAutoencoder;
use super::scoring::{outlier_mask, reconstruct_series, ReconstructionProfile};
use super::split::{train_test_split, DataLoader};
use super::trainer::AutoencoderTrainer;
use super::windows::WindowedSeries;

/// Single feature per timestep
const N_FEATURES: usize = 1;

/// Process-level options that are not part of a request
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// When set, the trained model is checkpointed to `<dir>/analysis-<id>.ckpt`
    pub checkpoint_dir: Option<PathBuf>,
}

impl RunOptions {
    pub fn checkpoint_path(&self, analysis_id: i64) -> Option<PathBuf> {
        self.checkpoint_dir
            .as_ref()
            .map(|dir| dir.join(format!("analysis-{}.ckpt", analysis_id)))
    }
}

/// Result of the compute-only part of an analysis
#[derive(Debug)]
pub struct DetectionOutcome {
    pub profile: ReconstructionProfile,
    pub outlier_mask: Vec<bool>,
    pub anomalies: Vec<NewAnomaly>,
    pub train_losses: Vec<f64>,
    pub test_losses: Vec<f64>,
}

/// Run one analysis and keep its status in sync.
///
/// The analysis moves to `processing` before any model work. On success the
/// anomalies are stored and the status becomes `completed`; on any failure
/// the status becomes `error` and the failure is returned.
pub async fn run_analysis(
    store: Arc<dyn AnalysisStore>,
    dataset_id: i64,
    analysis_id: i64,
    config: ResolvedConfig,
    options: &RunOptions,
) -> PipelineResult<usize> {
    store
        .update_analysis_status(analysis_id, AnalysisStatus::Processing)
        .await?;

    let started = Instant::now();
    tracing::info!(dataset_id, analysis_id, seed = config.seed, "Analysis started");

    let result = match execute(store.as_ref(), dataset_id, analysis_id, config, options).await {
        Ok(count) => store
            .update_analysis_status(analysis_id, AnalysisStatus::Completed)
            .await
            .map(|_| count),
        Err(err) => Err(err),
    };

    match result {
        Ok(count) => {
            tracing::info!(
                dataset_id,
                analysis_id,
                anomalies = count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Analysis completed"
            );
            Ok(count)
        }
        Err(err) => {
            tracing::error!(dataset_id, analysis_id, error = %err, "Analysis failed");
            if let Err(status_err) = store
                .update_analysis_status(analysis_id, AnalysisStatus::Error)
                .await
            {
                tracing::error!(analysis_id, error = %status_err, "Failed to record error status");
            }
            Err(err)
        }
    }
}

async fn execute(
    store: &dyn AnalysisStore,
    dataset_id: i64,
    analysis_id: i64,
    config: ResolvedConfig,
    options: &RunOptions,
) -> PipelineResult<usize> {
    let series = WindowedSeries::load(
        store,
        dataset_id,
        config.dataset.sequence_length,
        config.dataset.stride,
        config.scaler,
    )
    .await?;

    let checkpoint = options.checkpoint_path(analysis_id);
    let outcome = tokio::task::spawn_blocking(move || {
        detect_outliers(&series, analysis_id, &config, checkpoint.as_deref())
    })
    .await
    .map_err(|e| PipelineError::Task(e.to_string()))??;

    let count = outcome.anomalies.len();
    store.replace_anomalies(analysis_id, &outcome.anomalies).await?;

    Ok(count)
}

/// Train on the series, score every timestep and group the outliers
pub fn detect_outliers(
    series: &WindowedSeries,
    analysis_id: i64,
    config: &ResolvedConfig,
    checkpoint: Option<&Path>,
) -> PipelineResult<DetectionOutcome> {
    if series.is_empty() {
        return Err(PipelineError::InsufficientData {
            samples: series.num_samples(),
            sequence_length: series.sequence_length(),
        });
    }

    let trainer = train_lstmae(series, config)?;
    if let Some(path) = checkpoint {
        trainer.save_checkpoint(path)?;
    }

    let profile = reconstruct_series(series, trainer.model(), config.hyperparameters.batch_size)?;
    let mask = outlier_mask(&profile.error, config.threshold);
    let anomalies = group_anomalies(analysis_id, series.timestamps(), &mask);

    tracing::debug!(
        analysis_id,
        flagged = mask.iter().filter(|m| **m).count(),
        intervals = anomalies.len(),
        "Scoring finished"
    );

    Ok(DetectionOutcome {
        profile,
        outlier_mask: mask,
        anomalies,
        train_losses: trainer.train_losses.clone(),
        test_losses: trainer.test_losses.clone(),
    })
}

/// Split windows, build the model and fit it.
///
/// Everything random derives from `config.seed`: the split permutation, the
/// weight init, dropout masks and per-epoch reshuffling.
pub fn train_lstmae(
    series: &WindowedSeries,
    config: &ResolvedConfig,
) -> PipelineResult<AutoencoderTrainer> {
    let seed = config.seed;
    let mut split_rng = StdRng::seed_from_u64(seed);
    let split = train_test_split(
        series.len(),
        config.dataset.test_size,
        config.dataset.shuffle,
        Some(&mut split_rng),
    )?;

    tracing::debug!(
        train = split.train.len(),
        test = split.test.len(),
        "Windows split"
    );

    let model = LstmAutoencoder::new(
        config.dataset.sequence_length,
        N_FEATURES,
        config.hyperparameters.internal_size,
        config.hyperparameters.hidden_size,
        seed,
    );

    let mut trainer = AutoencoderTrainer::new(
        model,
        config.device,
        config.training.epochs,
        config.hyperparameters.learning_rate as f32,
        config.training.log_interval,
    );

    let batch_size = config.hyperparameters.batch_size;
    let shuffle = config.dataset.shuffle;
    let mut train_loader = DataLoader::new(
        series,
        split.train,
        batch_size,
        shuffle,
        StdRng::seed_from_u64(seed.wrapping_add(1)),
    );
    let mut test_loader = DataLoader::new(
        series,
        split.test,
        batch_size,
        shuffle,
        StdRng::seed_from_u64(seed.wrapping_add(2)),
    );

    let test = if test_loader.is_empty() {
        None
    } else {
        Some(&mut test_loader)
    };
    trainer.fit(&mut train_loader, test, None)?;

    Ok(trainer)
}
