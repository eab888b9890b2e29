//! REST API Server
//!
//! Exposes insight generation, ingestion and SQL validation over HTTP.

use crate::error::InsightError;
use crate::pipeline::{IngestReport, InsightPipeline, InsightResponse};
use crate::sql_guard::ValidationVerdict;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// API State - Shared between handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<InsightPipeline>,
}

/// Request body for POST /insights
#[derive(Deserialize)]
pub struct InsightsRequest {
    pub dashboard_id: i64,
    #[serde(default)]
    pub query_context: Option<String>,
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub sql: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// Handler error, rendered as `{error, kind}` with a status per kind
pub struct ApiError(InsightError);

impl From<InsightError> for ApiError {
    fn from(err: InsightError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &InsightError) -> StatusCode {
    match err {
        InsightError::MetadataFetch { .. } | InsightError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn get_insights(
    State(state): State<ApiState>,
    Path(dashboard_id): Path<i64>,
) -> Result<Json<InsightResponse>, ApiError> {
    Ok(Json(state.pipeline.run(dashboard_id, None).await?))
}

async fn post_insights(
    State(state): State<ApiState>,
    Json(request): Json<InsightsRequest>,
) -> Result<Json<InsightResponse>, ApiError> {
    let response = state
        .pipeline
        .run(request.dashboard_id, request.query_context.as_deref())
        .await?;
    Ok(Json(response))
}

async fn ingest(
    State(state): State<ApiState>,
    Path(dashboard_id): Path<i64>,
) -> Result<Json<IngestReport>, ApiError> {
    Ok(Json(state.pipeline.ingest_dashboard(dashboard_id).await?))
}

async fn validate_sql(
    State(state): State<ApiState>,
    Json(request): Json<ValidateRequest>,
) -> Json<ValidationVerdict> {
    Json(state.pipeline.validate(&request.sql))
}

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/insights", post(post_insights))
        .route("/insights/:dashboard_id", get(get_insights))
        .route("/ingest/:dashboard_id", post(ingest))
        .route("/validate", post(validate_sql))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `addr` until the process is stopped
pub async fn start_server(addr: &str, state: ApiState) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Insights API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
