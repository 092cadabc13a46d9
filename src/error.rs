//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Result type for the outlier-detection pipeline
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while windowing, training, scoring or persisting an analysis
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Dataset referenced by id does not exist
    #[error("Dataset with id={0} does not exist")]
    NotFound(i64),

    /// Dataset exists but holds no samples
    #[error("No datapoints found for dataset_id={0}")]
    EmptyData(i64),

    #[error("Analysis with id={0} does not exist")]
    AnalysisNotFound(i64),

    /// Fewer samples than one window needs
    #[error("Dataset has {samples} samples, fewer than sequence_length={sequence_length}")]
    InsufficientData { samples: usize, sequence_length: usize },

    /// Window or sample index outside valid bounds
    #[error("Index {index} out of range [0, {len})")]
    IndexRange { index: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Background task panicked or was dropped
    #[error("Task error: {0}")]
    Task(String),
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::Shape(err.to_string())
    }
}

impl From<validator::ValidationErrors> for PipelineError {
    fn from(err: validator::ValidationErrors) -> Self {
        PipelineError::InvalidConfig(err.to_string())
    }
}

#[derive(Debug)]
pub enum AppError {
    // Resource errors
    NotFound(String),

    // Validation errors
    ValidationError(String),

    // Database errors
    DatabaseError(String),

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::ValidationError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.as_str()),
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred")
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(_) | PipelineError::AnalysisNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            PipelineError::EmptyData(_)
            | PipelineError::InsufficientData { .. }
            | PipelineError::IndexRange { .. }
            | PipelineError::InvalidConfig(_) => AppError::ValidationError(err.to_string()),
            PipelineError::Storage(e) => AppError::DatabaseError(e.to_string()),
            other => AppError::InternalError(other.to_string()),
        }
    }
}
