use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::models::candidate::Candidate;
use crate::models::diagnostic::DiagnosticTarget;
use crate::models::job::{DeepScanResult, JobInput, JobKind, JobResult, JobStatus};
use crate::models::scan::{ScanPhase, ScanProgress};
use crate::services::diagnostic::DiagnosticError;
use crate::services::fetcher::FetchError;
use crate::services::handlers::{JobContext, JobError, JobHandler};

/// Full diagnostics for the top prospects of a completed area scan.
///
/// Reads the ranked candidates from the scan's job result and leaves the scan
/// itself untouched.
pub struct DeepScanHandler;

impl DeepScanHandler {
    async fn ranked_candidates(&self, ctx: &JobContext, scan_id: uuid::Uuid) -> Result<Vec<Candidate>, JobError> {
        let scan = ctx
            .store
            .get_scan(scan_id)
            .await?
            .filter(|s| s.owner_id == ctx.job.owner_id)
            .ok_or(JobError::ScanNotFound(scan_id))?;

        let scan_job = ctx
            .store
            .get_job(scan.job_id)
            .await?
            .filter(|j| j.status == JobStatus::Completed)
            .ok_or(JobError::ScanNotReady(scan_id))?;

        let result = scan_job.result.ok_or(JobError::ScanNotReady(scan_id))?;
        match serde_json::from_value::<JobResult>(result) {
            Ok(JobResult::AreaScan(area)) => Ok(area.candidates),
            _ => Err(JobError::ScanNotReady(scan_id)),
        }
    }
}

#[async_trait]
impl JobHandler for DeepScanHandler {
    async fn run(&self, ctx: &JobContext) -> Result<JobResult, JobError> {
        let JobInput::DeepScan(input) = &ctx.job.input else {
            return Err(JobError::wrong_input(JobKind::DeepScan, &ctx.job));
        };
        let sink = ctx.progress.as_ref();

        let mut prospects = self.ranked_candidates(ctx, input.scan_id).await?;
        prospects.truncate(input.max_prospects.clamp(1, 25) as usize);

        let mut progress = ScanProgress::phase(ScanPhase::Diagnostics);
        progress.total_candidates = prospects.len() as u32;
        sink.report(&progress).await?;

        tracing::info!(
            job_id = %ctx.job.id,
            scan_id = %input.scan_id,
            prospects = prospects.len(),
            concurrency = input.concurrency,
            "Starting deep scan"
        );

        let builder = ctx.pipeline.diagnostics.as_ref();
        let mut builds = stream::iter(prospects)
            .map(|c| async move {
                let target = DiagnosticTarget {
                    place_id: Some(c.place_id.clone()),
                    business_name: c.business_name.clone(),
                    city: c.city.clone(),
                    state: c.state.clone(),
                    website: c.website.clone(),
                    services: Vec::new(),
                };
                (c.place_id, builder.build(&target).await)
            })
            .buffered(input.concurrency.clamp(1, 5) as usize);

        let mut diagnostics = Vec::new();
        while let Some((place_id, outcome)) = builds.next().await {
            progress.processed += 1;
            match outcome {
                Ok(diagnostic) => {
                    progress.accepted += 1;
                    diagnostics.push(diagnostic);
                }
                Err(DiagnosticError::Fetch(FetchError::Cancelled)) => return Err(JobError::Cancelled),
                Err(e) => {
                    progress.failed += 1;
                    tracing::warn!(job_id = %ctx.job.id, place_id = %place_id, error = %e, "Diagnostic build failed");
                }
            }
            sink.report(&progress).await?;
        }

        tracing::info!(
            job_id = %ctx.job.id,
            built = progress.accepted,
            failed = progress.failed,
            "Deep scan complete"
        );

        Ok(JobResult::DeepScan(DeepScanResult {
            scan_id: input.scan_id,
            built: progress.accepted,
            failed: progress.failed,
            diagnostics,
        }))
    }
}
