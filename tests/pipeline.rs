//! End-to-end analysis runs against the in-memory store

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use lstmae_outliers::models::{AnalysisStatus, CreateAnalysis, Sample, LSTMAE_METHOD};
use lstmae_outliers::outlier::{
    detect_outliers, modified_z_scores, run_analysis, train_lstmae, AnalysisConfig,
    AutoencoderTrainer, Device, LstmAutoencoder, ResolvedConfig, RunOptions, WindowedSeries,
};
use lstmae_outliers::storage::{AnalysisStore, MemoryStore};
use lstmae_outliers::PipelineError;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn series_with_spike(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            let base = (i as f64 * 0.25).sin();
            let value = if i == n / 2 { base + 12.0 } else { base };
            Sample::new(start_time() + Duration::seconds(60 * i as i64), value)
        })
        .collect()
}

fn config(seq_len: usize, epochs: usize) -> ResolvedConfig {
    let mut config = AnalysisConfig::default();
    config.seed = Some(42);
    config.threshold = 3.5;
    config.dataset.sequence_length = seq_len;
    config.dataset.stride = 1;
    config.hyperparameters.hidden_size = 16;
    config.hyperparameters.internal_size = 8;
    config.training.epochs = epochs;
    config.resolve().unwrap()
}

async fn setup(store: &MemoryStore, samples: &[Sample]) -> (i64, i64) {
    let dataset = store.create_dataset("synthetic", None).await.unwrap();
    if !samples.is_empty() {
        store.insert_samples(dataset.id, samples).await.unwrap();
    }
    let analysis = store
        .create_analysis(CreateAnalysis {
            dataset_id: dataset.id,
            detection_method: LSTMAE_METHOD.to_string(),
            name: "integration".to_string(),
            description: Some("spike at the midpoint".to_string()),
        })
        .await
        .unwrap();
    (dataset.id, analysis.id)
}

#[tokio::test]
async fn test_full_run_completes() {
    let store = Arc::new(MemoryStore::new());
    let samples = series_with_spike(100);
    let (dataset_id, analysis_id) = setup(&store, &samples).await;

    let count = run_analysis(store.clone(), dataset_id, analysis_id, config(16, 5), &RunOptions::default())
        .await
        .unwrap();

    let analysis = store.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Completed);

    let anomalies = store.list_anomalies(analysis_id).await.unwrap();
    assert_eq!(anomalies.len(), count);

    let first = samples[0].time;
    let last = samples[samples.len() - 1].time;
    for anomaly in &anomalies {
        assert_eq!(anomaly.analysis_id, analysis_id);
        assert!(anomaly.start <= anomaly.end);
        assert!(anomaly.start >= first && anomaly.end <= last);
    }
    for pair in anomalies.windows(2) {
        assert!(pair[0].end < pair[1].start);
    }
}

#[test]
fn test_trained_model_flags_single_spike_in_constant_series() {
    let spike = 50;
    let samples: Vec<Sample> = (0..100)
        .map(|i| {
            let value = if i == spike { 5.0 } else { 0.5 };
            Sample::new(start_time() + Duration::seconds(60 * i as i64), value)
        })
        .collect();
    let mut cfg = config(16, 30);
    cfg.seed = 7;

    let series = WindowedSeries::from_samples(1, &samples, 16, 1, None).unwrap();
    let outcome = detect_outliers(&series, 1, &cfg, None).unwrap();

    let z = modified_z_scores(&outcome.profile.error);
    assert!(z[spike] > 3.5, "z-score at spike was {}", z[spike]);
    assert!(outcome.outlier_mask[spike]);

    let at = samples[spike].time;
    assert!(outcome.anomalies.iter().any(|a| a.start <= at && at <= a.end));
}

#[tokio::test]
async fn test_rerun_replaces_anomalies() {
    let store = Arc::new(MemoryStore::new());
    let (dataset_id, analysis_id) = setup(&store, &series_with_spike(60)).await;

    let first = run_analysis(store.clone(), dataset_id, analysis_id, config(8, 2), &RunOptions::default())
        .await
        .unwrap();
    let second = run_analysis(store.clone(), dataset_id, analysis_id, config(8, 2), &RunOptions::default())
        .await
        .unwrap();

    // Same seed, same intervals, no duplicates
    assert_eq!(first, second);
    assert_eq!(store.list_anomalies(analysis_id).await.unwrap().len(), second);
}

#[tokio::test]
async fn test_empty_dataset_sets_error_status() {
    let store = Arc::new(MemoryStore::new());
    let (dataset_id, analysis_id) = setup(&store, &[]).await;

    let err = run_analysis(store.clone(), dataset_id, analysis_id, config(8, 1), &RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyData(id) if id == dataset_id));

    let analysis = store.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Error);
    assert!(store.list_anomalies(analysis_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_short_dataset_sets_error_status() {
    let store = Arc::new(MemoryStore::new());
    let (dataset_id, analysis_id) = setup(&store, &series_with_spike(10)).await;

    let err = run_analysis(store.clone(), dataset_id, analysis_id, config(16, 1), &RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData { samples: 10, sequence_length: 16 }));

    let analysis = store.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Error);
}

#[tokio::test]
async fn test_missing_and_empty_datasets_are_distinct() {
    let store = MemoryStore::new();
    let dataset = store.create_dataset("empty", None).await.unwrap();

    let missing = WindowedSeries::load(&store, dataset.id + 100, 8, 1, None).await.unwrap_err();
    assert!(matches!(missing, PipelineError::NotFound(_)));

    let empty = WindowedSeries::load(&store, dataset.id, 8, 1, None).await.unwrap_err();
    assert!(matches!(empty, PipelineError::EmptyData(_)));
}

#[tokio::test]
async fn test_checkpoint_written_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let (dataset_id, analysis_id) = setup(&store, &series_with_spike(40)).await;
    let options = RunOptions {
        checkpoint_dir: Some(dir.path().to_path_buf()),
    };

    run_analysis(store.clone(), dataset_id, analysis_id, config(8, 2), &options)
        .await
        .unwrap();

    let path = options.checkpoint_path(analysis_id).unwrap();
    let mut trainer = AutoencoderTrainer::new(LstmAutoencoder::new(8, 1, 8, 16, 1), Device::Cpu, 2, 1e-3, 10);
    trainer.load_checkpoint(&path).unwrap();
    assert_eq!(trainer.train_losses.len(), 2);
}

#[test]
fn test_checkpoint_round_trip_preserves_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trained.ckpt");

    let samples = series_with_spike(50);
    let cfg = config(10, 3);
    let series = WindowedSeries::from_samples(1, &samples, 10, 1, None).unwrap();

    let trained = train_lstmae(&series, &cfg).unwrap();
    trained.save_checkpoint(&path).unwrap();

    let fresh = LstmAutoencoder::new(10, 1, 8, 16, 999);
    let mut restored = AutoencoderTrainer::new(fresh, Device::Cpu, 3, 1e-3, 10);
    restored.load_checkpoint(&path).unwrap();

    assert_eq!(restored.train_losses, trained.train_losses);
    assert_eq!(restored.test_losses, trained.test_losses);
    for (a, b) in restored.model().params().iter().zip(trained.model().params()) {
        assert_eq!(a.value, b.value);
    }

    let batch = series.batch(&[0, 5, 20]).unwrap();
    assert_eq!(restored.model().forward(&batch), trained.model().forward(&batch));
}
