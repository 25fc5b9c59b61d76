use async_trait::async_trait;

use crate::models::job::{AreaScanResult, JobInput, JobKind, JobResult};
use crate::models::scan::{ScanPhase, ScanProgress};
use crate::services::handlers::{JobContext, JobError, JobHandler};
use crate::services::pipeline::candidate_fetch::fetch_candidates;
use crate::services::pipeline::detail_scoring::score_candidates;
use crate::services::ranking;

/// Area discovery: fetch, score, filter and rank the top `limit` prospects.
pub struct AreaScanHandler;

#[async_trait]
impl JobHandler for AreaScanHandler {
    async fn run(&self, ctx: &JobContext) -> Result<JobResult, JobError> {
        let JobInput::AreaScan(input) = &ctx.job.input else {
            return Err(JobError::wrong_input(JobKind::AreaScan, &ctx.job));
        };
        let sink = ctx.progress.as_ref();
        let city = input.city.trim();
        let state = input.state.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let limit = input.limit.clamp(1, 100);

        tracing::info!(
            job_id = %ctx.job.id,
            scan_id = %input.scan_id,
            city,
            vertical = %input.vertical,
            limit,
            "Starting area scan"
        );

        let mut progress = ScanProgress::phase(ScanPhase::CandidateFetch);
        sink.report(&progress).await?;

        let summaries = fetch_candidates(
            &ctx.pipeline,
            city,
            state,
            &input.vertical,
            limit,
            &mut progress,
            sink,
        )
        .await?;

        let scored = score_candidates(&ctx.pipeline, &summaries, limit, city, state, &mut progress, sink).await?;

        let mut rows = scored.candidates;
        if input.filters.below_review_avg {
            progress.phase = ScanPhase::Filtering;
            rows.retain(|c| c.below_review_avg);
            sink.report(&progress).await?;
        }
        rows.truncate(limit as usize);
        ranking::assign_ranks(&mut rows);

        progress.phase = ScanPhase::Completed;
        progress.processed = progress.scored_candidates;
        progress.accepted = rows.len() as u32;
        progress.failed = scored.failed;

        tracing::info!(
            job_id = %ctx.job.id,
            scan_id = %input.scan_id,
            accepted = rows.len(),
            failed = scored.failed,
            "Area scan complete"
        );

        Ok(JobResult::AreaScan(AreaScanResult {
            scan_id: input.scan_id,
            summary: progress,
            candidates: rows,
        }))
    }
}
