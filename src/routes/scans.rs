use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::scan::ScanStatusView;
use crate::routes::{owner_id, ApiError};

/// GET /api/v1/scans/{scan_id}
pub async fn get_scan_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<ScanStatusView>, ApiError> {
    let owner = owner_id(&headers)?;
    state
        .jobs
        .get_scan_status(owner, scan_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("scan"))
}
