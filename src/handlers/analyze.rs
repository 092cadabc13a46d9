//! Analysis submission handler

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisStatus, CreateAnalysis, LSTMAE_METHOD};
use crate::outlier::AnalysisConfig;
use crate::worker::AnalysisJob;
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis_id: i64,
    pub status: AnalysisStatus,
}

/// Create an LSTM-AE analysis of a dataset and queue it.
///
/// Returns as soon as the analysis row exists; progress is visible through
/// the analysis status.
pub async fn create_lstmae_analysis(
    State(state): State<AppState>,
    Path(dataset_id): Path<i64>,
    Query(params): Query<AnalyzeParams>,
    Json(config): Json<AnalysisConfig>,
) -> AppResult<(StatusCode, Json<AnalyzeResponse>)> {
    if params.name.trim().is_empty() {
        return Err(AppError::ValidationError("name must not be empty".to_string()));
    }

    let config = config.resolve()?;

    if !state.store.dataset_exists(dataset_id).await? {
        return Err(AppError::NotFound(format!("Dataset with id={} does not exist", dataset_id)));
    }

    let analysis = state
        .store
        .create_analysis(CreateAnalysis {
            dataset_id,
            detection_method: LSTMAE_METHOD.to_string(),
            name: params.name,
            description: params.description,
        })
        .await?;

    state.worker.submit(AnalysisJob {
        dataset_id,
        analysis_id: analysis.id,
        config,
    })?;

    tracing::info!(dataset_id, analysis_id = analysis.id, "LSTM-AE analysis submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            analysis_id: analysis.id,
            status: analysis.status,
        }),
    ))
}
