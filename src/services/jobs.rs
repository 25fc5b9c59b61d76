use std::sync::Arc;
use uuid::Uuid;

use crate::db::store::{JobStore, StoreError};
use crate::models::job::{Job, JobInput, JobStatusView};
use crate::models::scan::ScanStatusView;
use crate::services::criteria::{parse_intent, IntentError};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error("scan {0} not found")]
    ScanNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Submission and polling front for the job store.
///
/// Everything is scoped by owner: another owner's job or scan reads as
/// missing.
pub struct JobService {
    store: Arc<dyn JobStore>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Validate and enqueue a job. Prospect queries are parsed here so a bad
    /// query never reaches the worker. Scan kinds always get a fresh scan id;
    /// a caller-supplied one is ignored.
    pub async fn submit(&self, owner_id: i64, mut input: JobInput) -> Result<Job, SubmitError> {
        input
            .validate_payload()
            .map_err(|report| SubmitError::Invalid(report.to_string()))?;

        match &mut input {
            JobInput::AreaScan(area) => area.scan_id = Uuid::new_v4(),
            JobInput::ListRescan(list) => list.scan_id = Uuid::new_v4(),
            JobInput::NlFind(nl) if nl.intent.is_none() => {
                nl.intent = Some(parse_intent(&nl.query)?);
            }
            JobInput::DeepScan(deep) => {
                let owned = self
                    .store
                    .get_scan(deep.scan_id)
                    .await?
                    .is_some_and(|s| s.owner_id == owner_id);
                if !owned {
                    return Err(SubmitError::ScanNotFound(deep.scan_id));
                }
            }
            _ => {}
        }

        let job = self.store.create_job(owner_id, &input).await?;
        metrics::counter!("scan_jobs_submitted_total", "kind" => job.kind().to_string()).increment(1);
        tracing::info!(job_id = %job.id, kind = %job.kind(), owner_id, "Job submitted");
        Ok(job)
    }

    pub async fn get_status(&self, owner_id: i64, job_id: Uuid) -> Result<Option<JobStatusView>, StoreError> {
        let job = self.store.get_job(job_id).await?;
        Ok(job
            .filter(|j| j.owner_id == owner_id)
            .map(JobStatusView::from))
    }

    pub async fn get_scan_status(&self, owner_id: i64, scan_id: Uuid) -> Result<Option<ScanStatusView>, StoreError> {
        let scan = self.store.get_scan(scan_id).await?;
        Ok(scan
            .filter(|s| s.owner_id == owner_id)
            .map(ScanStatusView::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryJobStore;
    use crate::models::job::{AreaScanInput, DeepScanInput, JobStatus, NlFindInput};
    use crate::models::scan::AreaFilters;

    fn area(limit: u32) -> JobInput {
        JobInput::AreaScan(AreaScanInput {
            scan_id: Uuid::new_v4(),
            city: "Austin".to_string(),
            state: Some("TX".to_string()),
            vertical: "hvac".to_string(),
            limit,
            filters: AreaFilters::default(),
        })
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_limit() {
        let service = JobService::new(Arc::new(MemoryJobStore::new()));
        let err = service.submit(1, area(0)).await.unwrap_err();
        assert!(matches!(err, SubmitError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_submit_parses_intent() {
        let service = JobService::new(Arc::new(MemoryJobStore::new()));
        let input = JobInput::NlFind(NlFindInput {
            query: "Find 5 dentists in Austin TX with no website".to_string(),
            intent: None,
            accuracy_mode: Default::default(),
        });
        let job = service.submit(1, input).await.unwrap();
        let JobInput::NlFind(nl) = &job.input else {
            panic!("expected nl_find input");
        };
        assert_eq!(nl.intent.as_ref().map(|i| i.limit), Some(5));

        let bad = JobInput::NlFind(NlFindInput {
            query: "find 5 dentists".to_string(),
            intent: None,
            accuracy_mode: Default::default(),
        });
        assert!(matches!(
            service.submit(1, bad).await.unwrap_err(),
            SubmitError::Intent(IntentError::MissingCity)
        ));
    }

    #[tokio::test]
    async fn test_status_is_owner_scoped() {
        let service = JobService::new(Arc::new(MemoryJobStore::new()));
        let job = service.submit(7, area(5)).await.unwrap();
        let scan_id = job.input.owned_scan().unwrap().0;

        let view = service.get_status(7, job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Pending);
        assert!(view.phase.is_none());
        assert!(service.get_status(8, job.id).await.unwrap().is_none());

        let scan = service.get_scan_status(7, scan_id).await.unwrap().unwrap();
        assert_eq!(scan.job_id, job.id);
        assert!(service.get_scan_status(8, scan_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deep_scan_requires_owned_scan() {
        let service = JobService::new(Arc::new(MemoryJobStore::new()));
        let job = service.submit(7, area(5)).await.unwrap();
        let scan_id = job.input.owned_scan().unwrap().0;

        let deep = |scan_id| {
            JobInput::DeepScan(DeepScanInput {
                scan_id,
                max_prospects: 5,
                concurrency: 2,
            })
        };
        assert!(service.submit(7, deep(scan_id)).await.is_ok());
        assert!(matches!(
            service.submit(8, deep(scan_id)).await.unwrap_err(),
            SubmitError::ScanNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_submit_ignores_client_scan_id() {
        let service = JobService::new(Arc::new(MemoryJobStore::new()));
        let input = area(5);
        let requested = input.owned_scan().unwrap().0;

        let first = service.submit(7, input.clone()).await.unwrap();
        let second = service.submit(8, input).await.unwrap();
        let first_scan = first.input.owned_scan().unwrap().0;
        let second_scan = second.input.owned_scan().unwrap().0;
        assert_ne!(first_scan, requested);
        assert_ne!(first_scan, second_scan);

        let mine = service.get_scan_status(7, first_scan).await.unwrap().unwrap();
        assert_eq!(mine.job_id, first.id);
        assert!(service.get_scan_status(8, first_scan).await.unwrap().is_none());
        assert!(service.get_scan_status(7, requested).await.unwrap().is_none());
    }
}
