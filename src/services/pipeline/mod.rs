//! Multi-phase scan pipeline: candidate fetch, detail scoring, filtering,
//! lightweight and verified checks.
//!
//! Every phase mutates one [`ScanProgress`] snapshot and pushes the whole
//! snapshot through a [`ProgressSink`].

pub mod candidate_fetch;
pub mod detail_scoring;
pub mod filtering;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::store::{JobStore, StoreError};
use crate::models::scan::ScanProgress;
use crate::services::cache::ScanCaches;
use crate::services::diagnostic::DiagnosticBuilder;
use crate::services::fetcher::{FetchError, RateLimitedFetcher};
use crate::services::website::WebsiteProbe;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub area_radius_km: f64,
    pub probe_radius_km: f64,
    pub max_pages: u32,
    /// Concurrent homepage signal probes during scoring.
    pub probe_pool: usize,
    /// Concurrent lightweight homepage checks.
    pub lightweight_pool: usize,
    /// Concurrent full enrichments in verified mode.
    pub verify_pool: usize,
    /// Most candidates a verified check will enrich.
    pub verify_quota: usize,
    pub progress_every: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            area_radius_km: 12.0,
            probe_radius_km: 3.0,
            max_pages: 2,
            probe_pool: 5,
            lightweight_pool: 6,
            verify_pool: 3,
            verify_quota: 25,
            progress_every: 5,
        }
    }
}

/// Candidates scored for a requested result limit.
pub fn scored_cap_target(limit: u32) -> usize {
    let limit = limit as usize;
    (limit * 2).max(limit).min(50)
}

/// Unique candidates after which candidate fetch stops early.
pub fn target_unique(limit: u32) -> usize {
    let cap = scored_cap_target(limit);
    (cap * 2).max(cap + 10).min(140)
}

/// Candidates kept after deduplication.
pub fn candidate_cap(limit: u32) -> usize {
    let limit = limit as usize;
    (limit * 5).max(limit).min(140)
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("could not geocode area '{0}'")]
    AreaNotFound(String),

    #[error("area lookup failed: {0}")]
    AreaLookup(FetchError),

    #[error("progress write failed: {0}")]
    Progress(#[from] StoreError),

    #[error("cancelled")]
    Cancelled,
}

/// Receives full progress snapshots.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: &ScanProgress) -> Result<(), StoreError>;
}

/// Writes progress to a running job and, when present, its scan row.
pub struct JobProgress {
    store: Arc<dyn JobStore>,
    job_id: Uuid,
    scan_id: Option<Uuid>,
}

impl JobProgress {
    pub fn new(store: Arc<dyn JobStore>, job_id: Uuid, scan_id: Option<Uuid>) -> Self {
        Self {
            store,
            job_id,
            scan_id,
        }
    }
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, progress: &ScanProgress) -> Result<(), StoreError> {
        let payload = serde_json::to_value(progress)?;
        if !self.store.update_progress(self.job_id, &payload).await? {
            tracing::debug!(job_id = %self.job_id, "Progress dropped, job no longer running");
        }
        if let Some(scan_id) = self.scan_id {
            self.store.update_scan_summary(scan_id, progress).await?;
        }
        tracing::trace!(job_id = %self.job_id, phase = %progress.phase, "Progress written");
        Ok(())
    }
}

/// Shared collaborators of every scan phase.
#[derive(Clone)]
pub struct Pipeline {
    pub fetcher: Arc<RateLimitedFetcher>,
    pub caches: ScanCaches,
    pub probe: Arc<dyn WebsiteProbe>,
    pub diagnostics: Arc<dyn DiagnosticBuilder>,
    pub config: PipelineConfig,
}

impl Pipeline {
    pub(crate) fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.fetcher.cancel_token().is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
