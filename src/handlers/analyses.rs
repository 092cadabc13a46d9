//! Analysis and anomaly read handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::models::{Analysis, Anomaly};
use crate::{AppError, AppResult, AppState};

/// Get single analysis with its current status
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Analysis>> {
    let analysis = state
        .store
        .get_analysis(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))?;

    Ok(Json(analysis))
}

/// Anomaly intervals stored for an analysis
pub async fn anomalies(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<Anomaly>>> {
    if state.store.get_analysis(id).await?.is_none() {
        return Err(AppError::NotFound("Analysis not found".to_string()));
    }

    let anomalies = state.store.list_anomalies(id).await?;
    Ok(Json(anomalies))
}

/// Analyses run against a dataset
pub async fn list_for_dataset(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
) -> AppResult<Json<Vec<Analysis>>> {
    if !state.store.dataset_exists(dataset_id).await? {
        return Err(AppError::NotFound("Dataset not found".to_string()));
    }

    let analyses = state.store.list_analyses(dataset_id).await?;
    Ok(Json(analyses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use chrono::{TimeZone, Utc};

    use crate::config::Config;
    use crate::models::{AnalysisStatus, CreateAnalysis, NewAnomaly, LSTMAE_METHOD};
    use crate::outlier::RunOptions;
    use crate::storage::{AnalysisStore, MemoryStore};
    use crate::worker::AnalysisWorker;

    fn test_state(store: Arc<MemoryStore>) -> AppState {
        let worker = AnalysisWorker::spawn(store.clone(), 1, RunOptions::default());
        AppState {
            store,
            worker,
            config: Config {
                database_url: String::new(),
                port: 0,
                analysis_workers: 1,
                checkpoint_dir: None,
                environment: "test".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let store = Arc::new(MemoryStore::new());
        let dataset = store.create_dataset("sensor", Some("lab")).await.unwrap();
        let analysis = store
            .create_analysis(CreateAnalysis {
                dataset_id: dataset.id,
                detection_method: LSTMAE_METHOD.to_string(),
                name: "first".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store
            .create_anomalies(&[NewAnomaly::point(analysis.id, t0, t0)])
            .await
            .unwrap();

        let state = test_state(store);

        let Json(found) = get(State(state.clone()), Path(analysis.id)).await.unwrap();
        assert_eq!(found.status, AnalysisStatus::Pending);

        let Json(listed) = list_for_dataset(State(state.clone()), Path(dataset.id)).await.unwrap();
        assert_eq!(listed.len(), 1);

        let Json(intervals) = anomalies(State(state), Path(analysis.id)).await.unwrap();
        assert_eq!(intervals.len(), 1);
        assert!(!intervals[0].validated);
    }

    #[tokio::test]
    async fn test_missing_resources() {
        let state = test_state(Arc::new(MemoryStore::new()));

        let err = get(State(state.clone()), Path(5)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = anomalies(State(state.clone()), Path(5)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = list_for_dataset(State(state), Path(5)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
