//! Postgres-backed store

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::PipelineResult;
use crate::models::{
    Analysis, AnalysisPatch, Anomaly, CreateAnalysis, Dataset, NewAnomaly, Sample,
};
use super::AnalysisStore;

/// Every call checks a connection out of the shared pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AnalysisStore for PgStore {
    async fn get_ordered_samples(&self, dataset_id: i64) -> PipelineResult<Vec<Sample>> {
        Ok(Sample::list_ordered(&self.pool, dataset_id).await?)
    }

    async fn dataset_exists(&self, dataset_id: i64) -> PipelineResult<bool> {
        Ok(Dataset::exists(&self.pool, dataset_id).await?)
    }

    async fn get_dataset(&self, dataset_id: i64) -> PipelineResult<Option<Dataset>> {
        Ok(Dataset::find_by_id(&self.pool, dataset_id).await?)
    }

    async fn create_dataset(&self, name: &str, description: Option<&str>) -> PipelineResult<Dataset> {
        Ok(Dataset::create(&self.pool, name, description).await?)
    }

    async fn insert_samples(&self, dataset_id: i64, samples: &[Sample]) -> PipelineResult<u64> {
        Ok(Sample::insert_many(&self.pool, dataset_id, samples).await?)
    }

    async fn create_analysis(&self, data: CreateAnalysis) -> PipelineResult<Analysis> {
        Ok(Analysis::create(&self.pool, data).await?)
    }

    async fn get_analysis(&self, analysis_id: i64) -> PipelineResult<Option<Analysis>> {
        Ok(Analysis::find_by_id(&self.pool, analysis_id).await?)
    }

    async fn list_analyses(&self, dataset_id: i64) -> PipelineResult<Vec<Analysis>> {
        Ok(Analysis::list_by_dataset(&self.pool, dataset_id).await?)
    }

    async fn update_analysis(
        &self,
        analysis_id: i64,
        patch: &AnalysisPatch,
    ) -> PipelineResult<Option<Analysis>> {
        Ok(Analysis::update(&self.pool, analysis_id, patch).await?)
    }

    async fn create_anomalies(&self, anomalies: &[NewAnomaly]) -> PipelineResult<u64> {
        Ok(Anomaly::create_many(&self.pool, anomalies).await?)
    }

    async fn replace_anomalies(
        &self,
        analysis_id: i64,
        anomalies: &[NewAnomaly],
    ) -> PipelineResult<u64> {
        Ok(Anomaly::replace_for_analysis(&self.pool, analysis_id, anomalies).await?)
    }

    async fn list_anomalies(&self, analysis_id: i64) -> PipelineResult<Vec<Anomaly>> {
        Ok(Anomaly::list_by_analysis(&self.pool, analysis_id).await?)
    }
}
