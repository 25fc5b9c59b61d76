use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::candidate::Candidate;
use crate::models::criteria::{AccuracyMode, SearchIntent};
use crate::models::diagnostic::Diagnostic;
use crate::models::scan::{AreaFilters, ScanKind, ScanParams, ScanPhase, ScanProgress};

/// Status of a job. Transitions only move forward:
/// pending → running → completed | failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    SimpleEnrichment,
    AreaScan,
    ListRescan,
    DeepScan,
    NlFind,
}

fn default_area_limit() -> u32 {
    20
}

fn default_max_prospects() -> u32 {
    25
}

fn default_deep_concurrency() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EnrichmentInput {
    #[garde(length(min = 1, max = 200))]
    pub place_id: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub business_name: String,

    #[garde(length(min = 1, max = 200))]
    pub city: String,

    #[garde(length(max = 100))]
    pub state: Option<String>,

    #[garde(length(max = 500))]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AreaScanInput {
    #[garde(skip)]
    #[serde(default = "Uuid::new_v4")]
    pub scan_id: Uuid,

    #[garde(length(min = 1, max = 200))]
    pub city: String,

    #[garde(length(max = 100))]
    pub state: Option<String>,

    #[garde(length(min = 1, max = 100))]
    pub vertical: String,

    #[garde(range(min = 1, max = 100))]
    #[serde(default = "default_area_limit")]
    pub limit: u32,

    #[garde(skip)]
    #[serde(default)]
    pub filters: AreaFilters,
}

/// One prospect-list member to re-diagnose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMember {
    #[serde(default)]
    pub diagnostic_id: Option<i64>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    /// Last diagnostic payload for this member.
    #[serde(default)]
    pub previous: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ListRescanInput {
    #[garde(skip)]
    #[serde(default = "Uuid::new_v4")]
    pub scan_id: Uuid,

    #[garde(skip)]
    pub list_id: i64,

    #[garde(length(max = 500))]
    #[serde(default)]
    pub members: Vec<ListMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeepScanInput {
    #[garde(skip)]
    pub scan_id: Uuid,

    #[garde(range(min = 1, max = 25))]
    #[serde(default = "default_max_prospects")]
    pub max_prospects: u32,

    #[garde(range(min = 1, max = 5))]
    #[serde(default = "default_deep_concurrency")]
    pub concurrency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NlFindInput {
    #[garde(length(min = 1, max = 500))]
    pub query: String,

    /// Parsed at submission time.
    #[garde(skip)]
    #[serde(default)]
    pub intent: Option<SearchIntent>,

    #[garde(skip)]
    #[serde(default)]
    pub accuracy_mode: AccuracyMode,
}

/// Typed job input, one variant per job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "input", rename_all = "snake_case")]
pub enum JobInput {
    SimpleEnrichment(EnrichmentInput),
    AreaScan(AreaScanInput),
    ListRescan(ListRescanInput),
    DeepScan(DeepScanInput),
    NlFind(NlFindInput),
}

impl JobInput {
    pub fn kind(&self) -> JobKind {
        match self {
            JobInput::SimpleEnrichment(_) => JobKind::SimpleEnrichment,
            JobInput::AreaScan(_) => JobKind::AreaScan,
            JobInput::ListRescan(_) => JobKind::ListRescan,
            JobInput::DeepScan(_) => JobKind::DeepScan,
            JobInput::NlFind(_) => JobKind::NlFind,
        }
    }

    /// Validate the variant's payload.
    pub fn validate_payload(&self) -> Result<(), garde::Report> {
        match self {
            JobInput::SimpleEnrichment(i) => i.validate(),
            JobInput::AreaScan(i) => i.validate(),
            JobInput::ListRescan(i) => i.validate(),
            JobInput::DeepScan(i) => i.validate(),
            JobInput::NlFind(i) => i.validate(),
        }
    }

    /// Scan row owned by this job, for the kinds that mirror one.
    pub fn owned_scan(&self) -> Option<(Uuid, ScanKind, ScanParams)> {
        match self {
            JobInput::AreaScan(i) => Some((
                i.scan_id,
                ScanKind::Area,
                ScanParams {
                    city: i.city.clone(),
                    state: i.state.clone(),
                    vertical: i.vertical.clone(),
                    limit: i.limit,
                    filters: i.filters.clone(),
                    list_id: None,
                },
            )),
            JobInput::ListRescan(i) => Some((
                i.scan_id,
                ScanKind::ListRescan,
                ScanParams {
                    vertical: "list_rescan".to_string(),
                    list_id: Some(i.list_id),
                    ..Default::default()
                },
            )),
            _ => None,
        }
    }

    /// Split into the `kind` column and the `input` JSON column.
    pub fn to_parts(&self) -> Result<(JobKind, Value), serde_json::Error> {
        let payload = match self {
            JobInput::SimpleEnrichment(i) => serde_json::to_value(i)?,
            JobInput::AreaScan(i) => serde_json::to_value(i)?,
            JobInput::ListRescan(i) => serde_json::to_value(i)?,
            JobInput::DeepScan(i) => serde_json::to_value(i)?,
            JobInput::NlFind(i) => serde_json::to_value(i)?,
        };
        Ok((self.kind(), payload))
    }

    /// Rebuild from the stored `kind` and `input` columns.
    pub fn from_parts(kind: JobKind, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            JobKind::SimpleEnrichment => JobInput::SimpleEnrichment(serde_json::from_value(payload)?),
            JobKind::AreaScan => JobInput::AreaScan(serde_json::from_value(payload)?),
            JobKind::ListRescan => JobInput::ListRescan(serde_json::from_value(payload)?),
            JobKind::DeepScan => JobInput::DeepScan(serde_json::from_value(payload)?),
            JobKind::NlFind => JobInput::NlFind(serde_json::from_value(payload)?),
        })
    }
}

/// A background job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_id: i64,
    pub input: JobInput,
    pub status: JobStatus,
    /// Latest progress snapshot while running, final payload once completed.
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn kind(&self) -> JobKind {
        self.input.kind()
    }
}

/// Terminal state written by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Failed(String),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed(_) => JobStatus::Completed,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }
}

// ── Results ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub place_id: Option<String>,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaScanResult {
    pub scan_id: Uuid,
    pub summary: ScanProgress,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberChange {
    pub business_name: String,
    pub place_id: Option<String>,
    pub previous_diagnostic_id: Option<i64>,
    pub changed: bool,
    pub deltas: Vec<FieldDelta>,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRescanResult {
    pub scan_id: Uuid,
    pub summary: ScanProgress,
    pub rescanned: u32,
    pub failed: u32,
    pub changed: u32,
    pub members: Vec<MemberChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepScanResult {
    pub scan_id: Uuid,
    pub built: u32,
    pub failed: u32,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlFindResult {
    pub intent: SearchIntent,
    pub accuracy_mode: AccuracyMode,
    pub summary: ScanProgress,
    pub candidates: Vec<Candidate>,
}

/// Typed handler output, one variant per job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    SimpleEnrichment(EnrichmentResult),
    AreaScan(AreaScanResult),
    ListRescan(ListRescanResult),
    DeepScan(DeepScanResult),
    NlFind(NlFindResult),
}

/// What a job poller sees.
impl JobResult {
    /// Final summary for the scan row of kinds that own one.
    pub fn scan_summary(&self) -> Option<&ScanProgress> {
        match self {
            JobResult::AreaScan(r) => Some(&r.summary),
            JobResult::ListRescan(r) => Some(&r.summary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub phase: Option<ScanPhase>,
    pub progress: Option<ScanProgress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partial_results: Vec<Candidate>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        let kind = job.kind();
        let (phase, progress, result) = match job.status {
            JobStatus::Pending => (None, None, None),
            JobStatus::Completed => (Some(ScanPhase::Completed), None, job.result),
            JobStatus::Running | JobStatus::Failed => {
                let progress = job
                    .result
                    .and_then(|v| serde_json::from_value::<ScanProgress>(v).ok());
                (progress.as_ref().map(|p| p.phase), progress, None)
            }
        };
        let partial_results = progress
            .as_ref()
            .map(|p| p.partial_results.clone())
            .unwrap_or_default();

        Self {
            job_id: job.id,
            kind,
            status: job.status,
            phase,
            progress,
            partial_results,
            result,
            error: job.error,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}
