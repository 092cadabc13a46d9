//! In-process store for tests and database-less runs

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    Analysis, AnalysisPatch, AnalysisStatus, Anomaly, CreateAnalysis, Dataset, NewAnomaly, Sample,
};
use super::AnalysisStore;

#[derive(Default)]
struct Tables {
    datasets: BTreeMap<i64, Dataset>,
    datapoints: BTreeMap<i64, BTreeMap<DateTime<Utc>, f64>>,
    analyses: BTreeMap<i64, Analysis>,
    anomalies: BTreeMap<i64, Anomaly>,
    next_dataset_id: i64,
    next_analysis_id: i64,
    next_anomaly_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn insert_anomalies(&mut self, anomalies: &[NewAnomaly]) -> PipelineResult<u64> {
        // Reject the whole batch before touching anything
        if let Some(missing) = anomalies
            .iter()
            .find(|a| !self.analyses.contains_key(&a.analysis_id))
        {
            return Err(PipelineError::AnalysisNotFound(missing.analysis_id));
        }

        for anomaly in anomalies {
            let id = Self::next_id(&mut self.next_anomaly_id);
            self.anomalies.insert(
                id,
                Anomaly {
                    id,
                    analysis_id: anomaly.analysis_id,
                    start: anomaly.start,
                    end: anomaly.end,
                    validated: false,
                    anomaly_type: anomaly.anomaly_type,
                },
            );
        }

        Ok(anomalies.len() as u64)
    }
}

/// Cheap to clone; clones share the same tables
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn get_ordered_samples(&self, dataset_id: i64) -> PipelineResult<Vec<Sample>> {
        let tables = self.tables.read();
        Ok(tables
            .datapoints
            .get(&dataset_id)
            .map(|points| points.iter().map(|(&time, &value)| Sample::new(time, value)).collect())
            .unwrap_or_default())
    }

    async fn dataset_exists(&self, dataset_id: i64) -> PipelineResult<bool> {
        Ok(self.tables.read().datasets.contains_key(&dataset_id))
    }

    async fn get_dataset(&self, dataset_id: i64) -> PipelineResult<Option<Dataset>> {
        Ok(self.tables.read().datasets.get(&dataset_id).cloned())
    }

    async fn create_dataset(&self, name: &str, description: Option<&str>) -> PipelineResult<Dataset> {
        let mut tables = self.tables.write();
        let id = Tables::next_id(&mut tables.next_dataset_id);
        let dataset = Dataset {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        tables.datasets.insert(id, dataset.clone());
        Ok(dataset)
    }

    async fn insert_samples(&self, dataset_id: i64, samples: &[Sample]) -> PipelineResult<u64> {
        let mut tables = self.tables.write();
        if !tables.datasets.contains_key(&dataset_id) {
            return Err(PipelineError::NotFound(dataset_id));
        }

        let points = tables.datapoints.entry(dataset_id).or_default();
        for sample in samples {
            points.insert(sample.time, sample.value);
        }
        Ok(samples.len() as u64)
    }

    async fn create_analysis(&self, data: CreateAnalysis) -> PipelineResult<Analysis> {
        let mut tables = self.tables.write();
        if !tables.datasets.contains_key(&data.dataset_id) {
            return Err(PipelineError::NotFound(data.dataset_id));
        }

        let id = Tables::next_id(&mut tables.next_analysis_id);
        let now = Utc::now();
        let analysis = Analysis {
            id,
            dataset_id: data.dataset_id,
            detection_method: data.detection_method,
            name: data.name,
            description: data.description,
            status: AnalysisStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        tables.analyses.insert(id, analysis.clone());
        Ok(analysis)
    }

    async fn get_analysis(&self, analysis_id: i64) -> PipelineResult<Option<Analysis>> {
        Ok(self.tables.read().analyses.get(&analysis_id).cloned())
    }

    async fn list_analyses(&self, dataset_id: i64) -> PipelineResult<Vec<Analysis>> {
        Ok(self
            .tables
            .read()
            .analyses
            .values()
            .filter(|a| a.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    async fn update_analysis(
        &self,
        analysis_id: i64,
        patch: &AnalysisPatch,
    ) -> PipelineResult<Option<Analysis>> {
        let mut tables = self.tables.write();
        Ok(tables.analyses.get_mut(&analysis_id).map(|analysis| {
            patch.apply(analysis);
            analysis.updated_at = Utc::now();
            analysis.clone()
        }))
    }

    async fn create_anomalies(&self, anomalies: &[NewAnomaly]) -> PipelineResult<u64> {
        self.tables.write().insert_anomalies(anomalies)
    }

    async fn replace_anomalies(
        &self,
        analysis_id: i64,
        anomalies: &[NewAnomaly],
    ) -> PipelineResult<u64> {
        let mut tables = self.tables.write();
        if !tables.analyses.contains_key(&analysis_id) {
            return Err(PipelineError::AnalysisNotFound(analysis_id));
        }

        let kept: BTreeMap<i64, Anomaly> = tables
            .anomalies
            .iter()
            .filter(|(_, a)| a.analysis_id != analysis_id)
            .map(|(&id, a)| (id, a.clone()))
            .collect();
        let previous = std::mem::replace(&mut tables.anomalies, kept);

        match tables.insert_anomalies(anomalies) {
            Ok(inserted) => Ok(inserted),
            Err(err) => {
                tables.anomalies = previous;
                Err(err)
            }
        }
    }

    async fn list_anomalies(&self, analysis_id: i64) -> PipelineResult<Vec<Anomaly>> {
        let mut anomalies: Vec<Anomaly> = self
            .tables
            .read()
            .anomalies
            .values()
            .filter(|a| a.analysis_id == analysis_id)
            .cloned()
            .collect();
        anomalies.sort_by_key(|a| a.start);
        Ok(anomalies)
    }
}
