//! In-process stores for tests and single-process local runs.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::store::{JobStore, StoreError};
use crate::models::job::{Job, JobInput, JobOutcome, JobStatus};
use crate::models::scan::{Scan, ScanProgress};
use crate::services::cache::{CacheEntry, CacheError, CacheStore, CacheTable};

#[derive(Default)]
struct MemoryState {
    /// Insertion order doubles as claim order.
    jobs: Vec<Job>,
    scans: HashMap<Uuid, Scan>,
    status_history: HashMap<Uuid, Vec<JobStatus>>,
    progress_writes: HashMap<Uuid, Vec<Value>>,
}

impl MemoryState {
    fn job_mut(&mut self, id: Uuid) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    fn record_status(&mut self, id: Uuid, status: JobStatus) {
        self.status_history.entry(id).or_default().push(status);
    }
}

/// [`JobStore`] held in memory. One lock serializes every write.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status a job has been written with, in order.
    pub async fn status_history(&self, id: Uuid) -> Vec<JobStatus> {
        let state = self.state.lock().await;
        state.status_history.get(&id).cloned().unwrap_or_default()
    }

    /// Every progress payload accepted for a job, in order.
    pub async fn progress_writes(&self, id: Uuid) -> Vec<Value> {
        let state = self.state.lock().await;
        state.progress_writes.get(&id).cloned().unwrap_or_default()
    }

    /// Overwrite a scan row.
    pub async fn put_scan(&self, scan: Scan) {
        let mut state = self.state.lock().await;
        state.scans.insert(scan.scan_id, scan);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, owner_id: i64, input: &JobInput) -> Result<Job, StoreError> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            owner_id,
            input: input.clone(),
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            completed_at: None,
        };

        let mut state = self.state.lock().await;
        if let Some((scan_id, kind, params)) = input.owned_scan() {
            if state.scans.contains_key(&scan_id) {
                return Err(StoreError::ScanExists(scan_id));
            }
            state.scans.insert(
                scan_id,
                Scan {
                    scan_id,
                    owner_id,
                    job_id: job.id,
                    kind,
                    params,
                    status: JobStatus::Pending,
                    summary: None,
                    error: None,
                    created_at: now,
                    completed_at: None,
                },
            );
        }
        state.record_status(job.id, JobStatus::Pending);
        state.jobs.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.iter_mut().find(|j| j.status == JobStatus::Pending) else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        let claimed = job.clone();
        state.record_status(claimed.id, JobStatus::Running);
        Ok(Some(claimed))
    }

    async fn update_progress(&self, id: Uuid, payload: &Value) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.job_mut(id) {
            Some(job) if job.status == JobStatus::Running => {
                job.result = Some(payload.clone());
            }
            _ => return Ok(false),
        }
        state.progress_writes.entry(id).or_default().push(payload.clone());
        Ok(true)
    }

    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.job_mut(id) {
            Some(job) if job.status == JobStatus::Running => {
                match outcome {
                    JobOutcome::Completed(result) => {
                        job.result = Some(result.clone());
                        job.error = None;
                    }
                    JobOutcome::Failed(error) => job.error = Some(error.clone()),
                }
                job.status = outcome.status();
                job.completed_at = Some(Utc::now());
            }
            _ => return Ok(false),
        }
        state.record_status(id, outcome.status());
        Ok(true)
    }

    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<Scan>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.scans.get(&scan_id).cloned())
    }

    async fn update_scan_summary(
        &self,
        scan_id: Uuid,
        summary: &ScanProgress,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.scans.get_mut(&scan_id) {
            Some(scan) if !scan.status.is_terminal() => {
                scan.status = JobStatus::Running;
                scan.summary = Some(summary.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finalize_scan(
        &self,
        scan_id: Uuid,
        status: JobStatus,
        summary: Option<&ScanProgress>,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::Decode(format!(
                "scan finalize needs a terminal status, got '{status}'"
            )));
        }
        let mut state = self.state.lock().await;
        match state.scans.get_mut(&scan_id) {
            Some(scan) if !scan.status.is_terminal() => {
                scan.status = status;
                if let Some(summary) = summary {
                    scan.summary = Some(summary.clone());
                }
                scan.error = error.map(str::to_string);
                scan.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// [`CacheStore`] held in memory.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<(CacheTable, String), CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, table: CacheTable) -> usize {
        let entries = self.entries.lock().await;
        entries.keys().filter(|(t, _)| *t == table).count()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self, table: CacheTable, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&(table, key.to_string())).cloned())
    }

    async fn store(&self, table: CacheTable, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        entries.insert((table, entry.key.clone()), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{EnrichmentInput, JobInput};

    fn enrichment() -> JobInput {
        JobInput::SimpleEnrichment(EnrichmentInput {
            place_id: Some("p1".to_string()),
            business_name: "Acme Heating".to_string(),
            city: "Austin".to_string(),
            state: Some("TX".to_string()),
            website: None,
        })
    }

    #[tokio::test]
    async fn test_claim_is_oldest_first_and_exclusive() {
        let store = MemoryJobStore::new();
        let first = store.create_job(1, &enrichment()).await.unwrap();
        let second = store.create_job(1, &enrichment()).await.unwrap();

        assert_eq!(store.claim_next().await.unwrap().unwrap().id, first.id);
        assert_eq!(store.claim_next().await.unwrap().unwrap().id, second.id);
        assert!(store.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_not_rewritten() {
        let store = MemoryJobStore::new();
        let job = store.create_job(1, &enrichment()).await.unwrap();

        // Not running yet.
        assert!(!store.update_progress(job.id, &serde_json::json!({})).await.unwrap());

        store.claim_next().await.unwrap();
        let progress = serde_json::json!({"phase": "detail_scoring"});
        assert!(store.update_progress(job.id, &progress).await.unwrap());
        assert!(store
            .finalize(job.id, &JobOutcome::Failed("boom".into()))
            .await
            .unwrap());
        assert!(!store
            .finalize(job.id, &JobOutcome::Completed(serde_json::json!({})))
            .await
            .unwrap());
        assert!(!store.update_progress(job.id, &serde_json::json!({})).await.unwrap());

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(stored.result, Some(progress));
        assert_eq!(
            store.status_history(job.id).await,
            vec![JobStatus::Pending, JobStatus::Running, JobStatus::Failed]
        );
    }

    #[tokio::test]
    async fn test_duplicate_scan_id_is_rejected() {
        use crate::models::job::AreaScanInput;
        use crate::models::scan::AreaFilters;

        let store = MemoryJobStore::new();
        let input = JobInput::AreaScan(AreaScanInput {
            scan_id: Uuid::new_v4(),
            city: "Austin".to_string(),
            state: Some("TX".to_string()),
            vertical: "hvac".to_string(),
            limit: 5,
            filters: AreaFilters::default(),
        });
        let scan_id = input.owned_scan().unwrap().0;

        let job = store.create_job(7, &input).await.unwrap();
        let err = store.create_job(8, &input).await.unwrap_err();
        assert!(matches!(err, StoreError::ScanExists(id) if id == scan_id));

        let scan = store.get_scan(scan_id).await.unwrap().unwrap();
        assert_eq!(scan.owner_id, 7);
        assert_eq!(scan.job_id, job.id);
    }
}
