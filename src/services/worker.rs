use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::store::{JobStore, StoreError};
use crate::models::job::{Job, JobOutcome, JobStatus};
use crate::models::scan::ScanProgress;
use crate::services::fetcher::sleep_or_cancel;
use crate::services::handlers::{HandlerRegistry, JobContext, JobError};
use crate::services::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Single-consumer job loop.
///
/// Claims one job at a time, dispatches it to the handler registered for its
/// kind and writes the terminal state. Cancelling the token stops the loop and
/// fails the job in flight at its next await point.
pub struct Worker {
    store: Arc<dyn JobStore>,
    registry: HandlerRegistry,
    pipeline: Pipeline,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl Worker {
    /// The worker shares the pipeline fetcher's cancellation token.
    pub fn new(store: Arc<dyn JobStore>, registry: HandlerRegistry, pipeline: Pipeline, config: WorkerConfig) -> Self {
        let cancel = pipeline.fetcher.cancel_token().clone();
        Self {
            store,
            registry,
            pipeline,
            config,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled. Store errors are logged and retried after the
    /// poll interval.
    pub async fn run(&self) {
        tracing::info!(poll_interval_ms = self.config.poll_interval.as_millis() as u64, "Worker loop started");

        while !self.cancel.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(true) => {
                    tracing::debug!("Job processed, checking for next job");
                    false
                }
                Ok(false) => {
                    tracing::trace!("No jobs available, sleeping");
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "Store error in worker loop, will retry");
                    true
                }
            };
            if idle && sleep_or_cancel(&self.cancel, self.config.poll_interval).await.is_err() {
                break;
            }
        }

        tracing::info!("Worker loop stopped");
    }

    /// Claim and process at most one job. Returns whether a job was claimed.
    pub async fn run_once(&self) -> Result<bool, StoreError> {
        let Some(job) = self.store.claim_next().await? else {
            return Ok(false);
        };
        self.process(job).await?;
        Ok(true)
    }

    async fn process(&self, job: Job) -> Result<(), StoreError> {
        let job_id = job.id;
        let kind = job.kind();
        let owned_scan = job.input.owned_scan().map(|(scan_id, _, _)| scan_id);

        metrics::counter!("scan_jobs_claimed_total", "kind" => kind.to_string()).increment(1);
        tracing::info!(job_id = %job_id, kind = %kind, owner_id = job.owner_id, "Processing job");
        let start = Instant::now();

        let outcome = match self.registry.get(kind) {
            None => Err(JobError::NoHandler(kind)),
            Some(handler) => {
                let ctx = JobContext::new(job, self.store.clone(), self.pipeline.clone());
                match AssertUnwindSafe(handler.run(&ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(job_id = %job_id, kind = %kind, "Job handler panicked");
                        Err(JobError::Panicked)
                    }
                }
            }
        };

        let (outcome, scan_summary) = match outcome {
            Ok(result) => {
                let summary = result.scan_summary().cloned();
                match serde_json::to_value(&result) {
                    Ok(payload) => (JobOutcome::Completed(payload), summary),
                    Err(e) => (JobOutcome::Failed(format!("result serialization failed: {e}")), None),
                }
            }
            Err(e) => (JobOutcome::Failed(e.to_string()), None),
        };

        let elapsed = start.elapsed();
        metrics::histogram!("scan_job_processing_seconds", "kind" => kind.to_string()).record(elapsed.as_secs_f64());

        if !self.store.finalize(job_id, &outcome).await? {
            tracing::warn!(job_id = %job_id, "Job was no longer running, terminal state not written");
            return Ok(());
        }

        if let Some(scan_id) = owned_scan {
            self.finalize_scan(scan_id, &outcome, scan_summary.as_ref()).await;
        }

        match &outcome {
            JobOutcome::Completed(_) => {
                metrics::counter!("scan_jobs_completed_total", "kind" => kind.to_string()).increment(1);
                tracing::info!(
                    job_id = %job_id,
                    kind = %kind,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job completed successfully"
                );
            }
            JobOutcome::Failed(message) => {
                metrics::counter!("scan_jobs_failed_total", "kind" => kind.to_string()).increment(1);
                tracing::error!(
                    job_id = %job_id,
                    kind = %kind,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %message,
                    "Job failed"
                );
            }
        }
        Ok(())
    }

    /// Mirror the job's terminal state onto its scan row. Called once the job
    /// row is terminal; a failed write is logged.
    async fn finalize_scan(&self, scan_id: Uuid, outcome: &JobOutcome, summary: Option<&ScanProgress>) {
        let write = match outcome {
            JobOutcome::Completed(_) => {
                self.store
                    .finalize_scan(scan_id, JobStatus::Completed, summary, None)
                    .await
            }
            JobOutcome::Failed(message) => {
                self.store
                    .finalize_scan(scan_id, JobStatus::Failed, None, Some(message))
                    .await
            }
        };

        match write {
            Ok(true) => {}
            Ok(false) => tracing::debug!(scan_id = %scan_id, "Scan already terminal"),
            Err(e) => tracing::error!(scan_id = %scan_id, error = %e, "Failed to write scan terminal state"),
        }
    }
}
