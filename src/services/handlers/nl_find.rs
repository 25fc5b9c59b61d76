use async_trait::async_trait;

use crate::models::criteria::AccuracyMode;
use crate::models::job::{JobInput, JobKind, JobResult, NlFindResult};
use crate::models::scan::{ScanPhase, ScanProgress};
use crate::services::criteria::parse_intent;
use crate::services::handlers::{JobContext, JobError, JobHandler};
use crate::services::pipeline::candidate_fetch::fetch_candidates;
use crate::services::pipeline::detail_scoring::score_candidates;
use crate::services::pipeline::filtering::{apply_basic, lightweight_check, verified_check};
use crate::services::ranking;

/// Natural-language prospect search.
///
/// Runs the area pipeline for the parsed intent, then narrows the scored
/// candidates through the criteria. Verified mode re-checks survivors with
/// full diagnostics.
pub struct NlFindHandler;

#[async_trait]
impl JobHandler for NlFindHandler {
    async fn run(&self, ctx: &JobContext) -> Result<JobResult, JobError> {
        let JobInput::NlFind(input) = &ctx.job.input else {
            return Err(JobError::wrong_input(JobKind::NlFind, &ctx.job));
        };
        let intent = match &input.intent {
            Some(intent) => intent.clone(),
            None => parse_intent(&input.query).map_err(|e| JobError::InvalidInput(e.to_string()))?,
        };
        let sink = ctx.progress.as_ref();
        let pipeline = &ctx.pipeline;
        let limit = intent.limit.max(1);
        let state = intent.state.as_deref();

        tracing::info!(
            job_id = %ctx.job.id,
            city = %intent.city,
            vertical = %intent.vertical,
            limit,
            criteria = intent.criteria.len(),
            mode = %input.accuracy_mode,
            "Starting prospect search"
        );

        let mut progress = ScanProgress::phase(ScanPhase::CandidateFetch);
        sink.report(&progress).await?;

        let summaries = fetch_candidates(
            pipeline,
            &intent.city,
            state,
            &intent.vertical,
            limit,
            &mut progress,
            sink,
        )
        .await?;
        let scored = score_candidates(pipeline, &summaries, limit, &intent.city, state, &mut progress, sink).await?;

        progress.phase = ScanPhase::Filtering;
        let mut rows = apply_basic(&intent.criteria, scored.candidates);
        progress.accepted = rows.len() as u32;
        sink.report(&progress).await?;

        let verified = input.accuracy_mode == AccuracyMode::Verified;
        if intent.requires_lightweight {
            let quota = if verified {
                pipeline.config.verify_quota.max(limit as usize)
            } else {
                limit as usize
            };
            rows = lightweight_check(pipeline, &intent.criteria, rows, quota, &mut progress, sink).await?;
        }

        if verified {
            rows = verified_check(pipeline, &intent.criteria, rows, limit as usize, &mut progress, sink).await?;
        }

        rows.truncate(limit as usize);
        ranking::assign_ranks(&mut rows);

        progress.phase = ScanPhase::Completed;
        progress.accepted = rows.len() as u32;
        progress.partial_results.clear();

        tracing::info!(
            job_id = %ctx.job.id,
            accepted = rows.len(),
            scoring_failed = scored.failed,
            "Prospect search complete"
        );

        Ok(JobResult::NlFind(NlFindResult {
            intent,
            accuracy_mode: input.accuracy_mode,
            summary: progress,
            candidates: rows,
        }))
    }
}
