//! HTTP inbound adapter.
//!
//! Thin JSON layer over [`JobOrchestrator`]: shape validation, status
//! polling and static serving of rendered and staged files.

use crate::application::{JobOrchestrator, Submission};
use crate::config::RenderConfig;
use crate::domain::jobs::{JobStatus, RenderJob, RenderPath, RenderRequest};
use crate::error::RenderError;
use crate::ports::job_store::JobStore;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::error;

/// Polling view of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_path: Option<RenderPath>,
}

impl From<RenderJob> for JobView {
    fn from(job: RenderJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress_percent: job.progress_percent,
            output_location: job.output_location,
            error_detail: job.error_detail,
            render_path: job.render_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJob {
    pub job_id: String,
    pub status: JobStatus,
    pub progress_percent: u8,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        let status = match &e {
            RenderError::Validation(_) => StatusCode::BAD_REQUEST,
            RenderError::JobNotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                error!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router<R>(orchestrator: Arc<JobOrchestrator<R>>, config: &RenderConfig) -> Router
where
    R: JobStore + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::<R>))
        .route("/api/render", get(list_active::<R>).post(submit_render::<R>))
        .route("/api/render/:job_id", get(render_status::<R>))
        .nest_service("/generated", ServeDir::new(&config.output_dir))
        .nest_service("/temp", ServeDir::new(&config.scratch_dir))
        .layer(cors)
        .with_state(orchestrator)
}

pub async fn submit_render<R>(
    State(orchestrator): State<Arc<JobOrchestrator<R>>>,
    Json(request): Json<RenderRequest>,
) -> Result<(StatusCode, Json<Submission>), ApiError>
where
    R: JobStore + 'static,
{
    request.validate()?;
    let submission = orchestrator.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

pub async fn render_status<R>(
    State(orchestrator): State<Arc<JobOrchestrator<R>>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError>
where
    R: JobStore + 'static,
{
    match orchestrator.get_status(&job_id).await? {
        Some(job) => Ok(Json(job.into())),
        None => Err(RenderError::JobNotFound(job_id).into()),
    }
}

pub async fn list_active<R>(
    State(orchestrator): State<Arc<JobOrchestrator<R>>>,
) -> Result<Json<Vec<ActiveJob>>, ApiError>
where
    R: JobStore + 'static,
{
    let jobs = orchestrator
        .list_active()
        .await?
        .into_iter()
        .map(|job| ActiveJob {
            job_id: job.id,
            status: job.status,
            progress_percent: job.progress_percent,
        })
        .collect();
    Ok(Json(jobs))
}

pub async fn health<R>(State(orchestrator): State<Arc<JobOrchestrator<R>>>) -> impl IntoResponse
where
    R: JobStore + 'static,
{
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "primaryEngine": orchestrator.pipeline().engine().is_available(),
        "fallbackEncoder": true,
    }))
}
