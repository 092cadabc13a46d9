//! Background execution of analyses
//!
//! Jobs are queued on an mpsc channel and started in submission order. A
//! semaphore caps how many analyses train at once.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};

use crate::error::{PipelineError, PipelineResult};
use crate::outlier::{run_analysis, ResolvedConfig, RunOptions};
use crate::storage::AnalysisStore;

/// One analysis to run
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub dataset_id: i64,
    pub analysis_id: i64,
    pub config: ResolvedConfig,
}

struct QueuedJob {
    job: AnalysisJob,
    reply: oneshot::Sender<PipelineResult<usize>>,
}

/// Completion of a submitted job; dropping it does not cancel the job
pub struct JobHandle {
    analysis_id: i64,
    rx: oneshot::Receiver<PipelineResult<usize>>,
}

impl JobHandle {
    pub fn analysis_id(&self) -> i64 {
        self.analysis_id
    }

    /// Number of anomaly intervals stored, or the failure that ended the run
    pub async fn wait(self) -> PipelineResult<usize> {
        self.rx
            .await
            .map_err(|_| PipelineError::Task(format!("analysis {} was dropped", self.analysis_id)))?
    }
}

#[derive(Clone)]
pub struct AnalysisWorker {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl AnalysisWorker {
    /// Start the dispatcher task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn AnalysisStore>, max_concurrent: usize, options: RunOptions) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedJob>();
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let options = Arc::new(options);

        tokio::spawn(async move {
            while let Some(QueuedJob { job, reply }) = rx.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let store = store.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let result = run_analysis(
                        store,
                        job.dataset_id,
                        job.analysis_id,
                        job.config,
                        &options,
                    )
                    .await;
                    let _ = reply.send(result);
                });
            }
            tracing::debug!("Analysis queue closed");
        });

        tracing::info!(max_concurrent, "Analysis worker started");
        Self { tx }
    }

    pub fn submit(&self, job: AnalysisJob) -> PipelineResult<JobHandle> {
        let analysis_id = job.analysis_id;
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(QueuedJob { job, reply })
            .map_err(|_| PipelineError::Task("analysis worker is not running".to_string()))?;

        tracing::debug!(analysis_id, "Analysis queued");
        Ok(JobHandle { analysis_id, rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisStatus, CreateAnalysis, LSTMAE_METHOD};
    use crate::outlier::AnalysisConfig;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_failed_job_reports_error_and_status() {
        let store = Arc::new(MemoryStore::new());
        let dataset = store.create_dataset("empty", None).await.unwrap();
        let analysis = store
            .create_analysis(CreateAnalysis {
                dataset_id: dataset.id,
                detection_method: LSTMAE_METHOD.to_string(),
                name: "nothing to see".to_string(),
                description: None,
            })
            .await
            .unwrap();

        let worker = AnalysisWorker::spawn(store.clone(), 1, RunOptions::default());
        let handle = worker
            .submit(AnalysisJob {
                dataset_id: dataset.id,
                analysis_id: analysis.id,
                config: AnalysisConfig::default().resolve().unwrap(),
            })
            .unwrap();
        assert_eq!(handle.analysis_id(), analysis.id);

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyData(_)));

        let stored = store.get_analysis(analysis.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Error);
    }

    #[tokio::test]
    async fn test_unknown_analysis_fails_fast() {
        let store = Arc::new(MemoryStore::new());
        let worker = AnalysisWorker::spawn(store, 2, RunOptions::default());

        let err = worker
            .submit(AnalysisJob {
                dataset_id: 1,
                analysis_id: 42,
                config: AnalysisConfig::default().resolve().unwrap(),
            })
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::AnalysisNotFound(42)));
    }
}
