//! Storage seam for datasets, analyses and anomalies
//!
//! The pipeline only talks to `AnalysisStore`; `PgStore` backs the service
//! and `MemoryStore` backs tests and local runs without a database.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    Analysis, AnalysisPatch, AnalysisStatus, Anomaly, CreateAnalysis, Dataset, NewAnomaly, Sample,
};

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// All samples of a dataset in ascending time order
    async fn get_ordered_samples(&self, dataset_id: i64) -> PipelineResult<Vec<Sample>>;

    async fn dataset_exists(&self, dataset_id: i64) -> PipelineResult<bool>;

    async fn get_dataset(&self, dataset_id: i64) -> PipelineResult<Option<Dataset>>;

    async fn create_dataset(&self, name: &str, description: Option<&str>) -> PipelineResult<Dataset>;

    /// Upsert samples by timestamp; returns rows written
    async fn insert_samples(&self, dataset_id: i64, samples: &[Sample]) -> PipelineResult<u64>;

    async fn create_analysis(&self, data: CreateAnalysis) -> PipelineResult<Analysis>;

    async fn get_analysis(&self, analysis_id: i64) -> PipelineResult<Option<Analysis>>;

    async fn list_analyses(&self, dataset_id: i64) -> PipelineResult<Vec<Analysis>>;

    /// Apply a partial update; `None` when the analysis does not exist
    async fn update_analysis(
        &self,
        analysis_id: i64,
        patch: &AnalysisPatch,
    ) -> PipelineResult<Option<Analysis>>;

    async fn create_anomalies(&self, anomalies: &[NewAnomaly]) -> PipelineResult<u64>;

    /// Drop existing anomalies of the analysis and store `anomalies` atomically
    async fn replace_anomalies(
        &self,
        analysis_id: i64,
        anomalies: &[NewAnomaly],
    ) -> PipelineResult<u64>;

    async fn list_anomalies(&self, analysis_id: i64) -> PipelineResult<Vec<Anomaly>>;

    async fn update_analysis_status(
        &self,
        analysis_id: i64,
        status: AnalysisStatus,
    ) -> PipelineResult<Analysis> {
        self.update_analysis(analysis_id, &AnalysisPatch::status(status))
            .await?
            .ok_or(PipelineError::AnalysisNotFound(analysis_id))
    }
}
