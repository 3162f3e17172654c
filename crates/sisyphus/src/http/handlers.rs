//! HTTP intake (C5). Handlers are short and delegate to C2/C3/C4; the
//! status and environments handlers never block on compilation work.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use olympus_common::error::AppError;
use olympus_common::types::{CompilationJob, JobId};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::pool::Admission;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    time: chrono::DateTime<Utc>,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        time: Utc::now(),
    })
}

/// GET /api/v1/environments
pub async fn environments(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.summaries())
}

/// POST /api/v1/compile
pub async fn submit_compile(
    State(state): State<AppState>,
    Json(request): Json<olympus_common::types::CompilationRequest>,
) -> ApiResult<impl IntoResponse> {
    if state.pool.available_slots() == 0 {
        return Err(ApiError(AppError::NoWorkersAvailable));
    }

    // Minimal validation only; full semantic validation (decode, environment
    // lookup) happens inside the compiler on the worker.
    if let Err(e) = request.validate() {
        return Err(ApiError(AppError::Validation(e.to_string())));
    }

    let job_id: JobId = Uuid::new_v4();
    let job = CompilationJob::new(job_id, request);

    state.store.store(job.clone()).await?;

    // Not synchronized with the available-slots check above: a small race
    // exists between that check and this enqueue. Accepted as-is — the
    // queue's own bound is the real invariant enforced.
    match state.pool.try_submit(job) {
        Admission::Accepted => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "job_id": job_id, "status": "queued" })),
        )),
        Admission::RejectedQueueFull => Err(ApiError(AppError::QueueFull)),
    }
}

/// GET /api/v1/compile/{job_id}
pub async fn poll_compile(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if let Some(result) = state.store.get_result(job_id).await? {
        let body = serde_json::to_value(result)
            .map_err(|e| ApiError(AppError::Internal(format!("serialize result: {e}"))))?;
        return Ok((StatusCode::OK, Json(body)));
    }

    match state.store.get(job_id).await? {
        Some(job) => Ok((
            StatusCode::OK,
            Json(json!({ "job_id": job.id, "status": job.status })),
        )),
        None => Err(ApiError(AppError::NotFound(format!("job {job_id} not found")))),
    }
}

/// GET /api/v1/workers/stats
pub async fn worker_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.stats())
}
