//! Time-series outlier detection service
//!
//! Runs LSTM autoencoder analyses over stored datasets and records the
//! anomaly intervals they find.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     LSTMAE OUTLIERS                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────┐   ┌────────────────────┐  │
//! │  │  API      │──▶│  Analysis    │──▶│  Pipeline          │  │
//! │  │  (Axum)   │   │  Worker      │   │  window → train →  │  │
//! │  │           │   │  (queue)     │   │  score → group     │  │
//! │  └─────┬─────┘   └──────┬───────┘   └─────────┬──────────┘  │
//! │        └────────────────┼─────────────────────┘             │
//! │                         ▼                                   │
//! │                 ┌───────────────┐                           │
//! │                 │ AnalysisStore │ (PostgreSQL / memory)     │
//! │                 └───────────────┘                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod outlier;
pub mod storage;
pub mod worker;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult, PipelineError, PipelineResult};

use storage::AnalysisStore;
use worker::AnalysisWorker;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AnalysisStore>,
    pub worker: AnalysisWorker,
    pub config: config::Config,
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/v1/analyze/:dataset_id/lstmae",
            post(handlers::analyze::create_lstmae_analysis),
        )
        .route("/api/v1/analyses/:id", get(handlers::analyses::get))
        .route("/api/v1/analyses/:id/anomalies", get(handlers::analyses::anomalies))
        .route(
            "/api/v1/datasets/:dataset_id/analyses",
            get(handlers::analyses::list_for_dataset),
        );

    Router::new()
        .route("/health", get(handlers::health::check))
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
