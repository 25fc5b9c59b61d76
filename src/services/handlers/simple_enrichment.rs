use async_trait::async_trait;

use crate::models::diagnostic::DiagnosticTarget;
use crate::models::job::{EnrichmentResult, JobInput, JobKind, JobResult};
use crate::models::scan::{ScanPhase, ScanProgress};
use crate::services::handlers::{JobContext, JobError, JobHandler};

pub struct SimpleEnrichmentHandler;

#[async_trait]
impl JobHandler for SimpleEnrichmentHandler {
    async fn run(&self, ctx: &JobContext) -> Result<JobResult, JobError> {
        let JobInput::SimpleEnrichment(input) = &ctx.job.input else {
            return Err(JobError::wrong_input(JobKind::SimpleEnrichment, &ctx.job));
        };

        let mut progress = ScanProgress::phase(ScanPhase::Diagnostics);
        progress.total_candidates = 1;
        ctx.progress.report(&progress).await?;

        let target = DiagnosticTarget {
            place_id: input.place_id.clone(),
            business_name: input.business_name.trim().to_string(),
            city: input.city.trim().to_string(),
            state: input.state.clone(),
            website: input.website.clone(),
            services: Vec::new(),
        };
        let diagnostic = ctx.pipeline.diagnostics.build(&target).await?;

        tracing::info!(
            job_id = %ctx.job.id,
            business = %diagnostic.business_name,
            constraint = %diagnostic.constraint,
            "Enrichment complete"
        );

        Ok(JobResult::SimpleEnrichment(EnrichmentResult {
            place_id: diagnostic.place_id.clone(),
            diagnostic,
        }))
    }
}
