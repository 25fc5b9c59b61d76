use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::candidate::Candidate;
use crate::models::job::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanKind {
    Area,
    ListRescan,
}

/// Pipeline state reported in progress payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Pending,
    CandidateFetch,
    DetailScoring,
    Filtering,
    LightweightCheck,
    VerifiedCheck,
    Diagnostics,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaFilters {
    #[serde(default)]
    pub below_review_avg: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanParams {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub vertical: String,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub filters: AreaFilters,
    #[serde(default)]
    pub list_id: Option<i64>,
}

/// Progress snapshot written to both the job result and the scan summary.
///
/// Every write replaces the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub candidate_queries_done: u32,
    pub candidate_queries_total: u32,
    pub raw_candidates_collected: u32,
    pub processed: u32,
    pub accepted: u32,
    pub failed: u32,
    pub total_candidates: u32,
    pub scored_candidates: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partial_results: Vec<Candidate>,
}

impl ScanProgress {
    pub fn phase(phase: ScanPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }
}

/// A scan row, mirrored alongside its job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub scan_id: Uuid,
    pub owner_id: i64,
    pub job_id: Uuid,
    pub kind: ScanKind,
    pub params: ScanParams,
    pub status: JobStatus,
    pub summary: Option<ScanProgress>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a scan-scoped poller sees.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatusView {
    pub scan_id: Uuid,
    pub job_id: Uuid,
    pub kind: ScanKind,
    pub status: JobStatus,
    pub phase: Option<ScanPhase>,
    pub summary: ScanProgress,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Scan> for ScanStatusView {
    fn from(scan: Scan) -> Self {
        let summary = scan.summary.unwrap_or_default();
        let phase = match scan.status {
            JobStatus::Pending => None,
            JobStatus::Completed => Some(ScanPhase::Completed),
            _ => Some(summary.phase),
        };
        Self {
            scan_id: scan.scan_id,
            job_id: scan.job_id,
            kind: scan.kind,
            status: scan.status,
            phase,
            summary,
            error: scan.error,
            created_at: scan.created_at,
            completed_at: scan.completed_at,
        }
    }
}
