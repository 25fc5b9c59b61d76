use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobInput, JobKind, JobStatus, JobStatusView};
use crate::routes::{owner_id, ApiError};

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<Uuid>,
}

/// POST /api/v1/jobs: submit a job. Body is `{"kind": ..., "input": {...}}`.
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<JobInput>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let owner = owner_id(&headers)?;
    let job = state.jobs.submit(owner, input).await?;

    let scan_id = job.input.owned_scan().map(|(id, _, _)| id);
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            kind: job.kind(),
            status: job.status,
            scan_id,
        }),
    ))
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusView>, ApiError> {
    let owner = owner_id(&headers)?;
    state
        .jobs
        .get_status(owner, job_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("job"))
}
