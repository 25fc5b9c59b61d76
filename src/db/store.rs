use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::job::{Job, JobInput, JobOutcome, JobStatus};
use crate::models::scan::{Scan, ScanProgress};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("payload serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    Decode(String),

    #[error("scan {0} already exists")]
    ScanExists(Uuid),
}

/// Persistence for jobs and the scans they mirror.
///
/// Writes to a single job (or scan) id are serialized by the store. Status
/// only moves forward, so every write is conditional on the current status
/// and reports whether it applied.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a pending job. Kinds that own a scan get their scan row in the
    /// same write.
    async fn create_job(&self, owner_id: i64, input: &JobInput) -> Result<Job, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Take the oldest pending job and mark it running.
    async fn claim_next(&self) -> Result<Option<Job>, StoreError>;

    /// Replace the stored result of a running job with a progress payload.
    async fn update_progress(&self, id: Uuid, payload: &Value) -> Result<bool, StoreError>;

    /// Move a running job to its terminal state. A failed job keeps its last
    /// progress payload as `result`.
    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, StoreError>;

    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<Scan>, StoreError>;

    /// Replace the summary of a non-terminal scan and mark it running.
    async fn update_scan_summary(
        &self,
        scan_id: Uuid,
        summary: &ScanProgress,
    ) -> Result<bool, StoreError>;

    /// Move a non-terminal scan to `completed` or `failed`. A `None` summary
    /// keeps the stored one.
    async fn finalize_scan(
        &self,
        scan_id: Uuid,
        status: JobStatus,
        summary: Option<&ScanProgress>,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;
}
