use futures::stream::{self, StreamExt};

use crate::models::candidate::Candidate;
use crate::models::criteria::{Criterion, LightweightCheck};
use crate::models::diagnostic::DiagnosticTarget;
use crate::models::scan::{ScanPhase, ScanProgress};
use crate::services::criteria::{matches_basic, matches_verified, services_to_verify};
use crate::services::diagnostic::DiagnosticError;
use crate::services::fetcher::FetchError;
use crate::services::pipeline::{Pipeline, PipelineError, ProgressSink};
use crate::services::website::{self, FetchedPage};

/// Keep candidates passing every criterion answerable from scored signals.
pub fn apply_basic(criteria: &[Criterion], candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| matches_basic(criteria, c))
        .collect()
}

pub fn lightweight_cache_key(place_id: &str, criterion: &Criterion) -> String {
    format!("{}|{}", place_id, criterion.cache_key())
}

/// Run every lightweight criterion against one candidate's homepage.
///
/// The homepage is fetched at most once. Fresh cached checks are reused; a
/// missing website or failed fetch produces a non-matching check that is not
/// cached.
async fn check_candidate(pipeline: &Pipeline, criteria: &[&Criterion], mut candidate: Candidate) -> (Candidate, bool) {
    let mut page: Option<Option<FetchedPage>> = None;
    let mut passed = true;

    for criterion in criteria {
        let Criterion::MissingServicePageLight { service } = criterion else {
            continue;
        };
        let criterion_key = criterion.cache_key();
        let cache_key = lightweight_cache_key(&candidate.place_id, criterion);

        let check = match pipeline.caches.lightweight.lookup::<LightweightCheck>(&cache_key).await {
            Some(hit) => hit,
            None => match candidate.website.as_deref() {
                None => website::unchecked(service, &criterion_key, "no_website"),
                Some(url) => {
                    if page.is_none() {
                        page = Some(match pipeline.probe.fetch_homepage(url).await {
                            Ok(p) => Some(p),
                            Err(e) => {
                                tracing::warn!(place_id = %candidate.place_id, error = %e, "Lightweight homepage fetch failed");
                                None
                            }
                        });
                    }
                    match page.as_ref().and_then(Option::as_ref) {
                        Some(p) => {
                            let check = website::check_service_page(p, service, &criterion_key);
                            pipeline.caches.lightweight.remember(&cache_key, &check).await;
                            check
                        }
                        None => website::unchecked(service, &criterion_key, "fetch_failed"),
                    }
                }
            },
        };

        passed &= check.matches;
        candidate.lightweight_checks.push(check);
    }

    (candidate, passed)
}

/// Lightweight check phase. Candidates are checked in rank order on a
/// bounded pool; accepted candidates keep that order. Stops once `quota`
/// candidates are accepted.
pub async fn lightweight_check(
    pipeline: &Pipeline,
    criteria: &[Criterion],
    candidates: Vec<Candidate>,
    quota: usize,
    progress: &mut ScanProgress,
    sink: &dyn ProgressSink,
) -> Result<Vec<Candidate>, PipelineError> {
    let light: Vec<&Criterion> = criteria.iter().filter(|c| c.needs_lightweight_check()).collect();
    if light.is_empty() {
        return Ok(candidates.into_iter().take(quota).collect());
    }

    let every = pipeline.config.progress_every.max(1);
    progress.phase = ScanPhase::LightweightCheck;
    progress.total_candidates = candidates.len() as u32;
    progress.processed = 0;
    progress.accepted = 0;
    progress.partial_results.clear();
    sink.report(progress).await?;

    let light = light.as_slice();
    let mut checks = stream::iter(candidates)
        .map(|c| check_candidate(pipeline, light, c))
        .buffered(pipeline.config.lightweight_pool.max(1));

    let mut accepted = Vec::new();
    while let Some((candidate, passed)) = checks.next().await {
        pipeline.check_cancelled()?;
        progress.processed += 1;
        if passed {
            progress.accepted += 1;
            progress.partial_results.push(candidate.clone());
            accepted.push(candidate);
        }

        let full = accepted.len() >= quota;
        if full || progress.processed % every == 0 {
            sink.report(progress).await?;
        }
        if full {
            tracing::info!(processed = progress.processed, accepted = accepted.len(), "Lightweight quota filled");
            break;
        }
    }
    drop(checks);

    if accepted.len() < quota {
        sink.report(progress).await?;
    }
    Ok(accepted)
}

/// Verified check phase: full diagnostics for up to `verify_quota` top
/// candidates on a bounded pool, re-checking every criterion against the
/// diagnostic. Stops once `limit` candidates are accepted.
pub async fn verified_check(
    pipeline: &Pipeline,
    criteria: &[Criterion],
    candidates: Vec<Candidate>,
    limit: usize,
    progress: &mut ScanProgress,
    sink: &dyn ProgressSink,
) -> Result<Vec<Candidate>, PipelineError> {
    let pool: Vec<Candidate> = candidates.into_iter().take(pipeline.config.verify_quota).collect();
    let services = services_to_verify(criteria);
    let every = pipeline.config.progress_every.max(1);

    progress.phase = ScanPhase::VerifiedCheck;
    progress.total_candidates = pool.len() as u32;
    progress.processed = 0;
    progress.accepted = 0;
    progress.failed = 0;
    progress.partial_results.clear();
    sink.report(progress).await?;

    let builder = pipeline.diagnostics.as_ref();
    let services = services.as_slice();
    let mut builds = stream::iter(pool)
        .map(|candidate| async move {
            let target = DiagnosticTarget {
                place_id: Some(candidate.place_id.clone()),
                business_name: candidate.business_name.clone(),
                city: candidate.city.clone(),
                state: candidate.state.clone(),
                website: candidate.website.clone(),
                services: services.to_vec(),
            };
            let outcome = builder.build(&target).await;
            (candidate, outcome)
        })
        .buffered(pipeline.config.verify_pool.max(1));

    let mut accepted = Vec::new();
    while let Some((mut candidate, outcome)) = builds.next().await {
        pipeline.check_cancelled()?;
        progress.processed += 1;
        match outcome {
            Ok(diagnostic) => {
                if matches_verified(criteria, &candidate, &diagnostic) {
                    match serde_json::to_value(&diagnostic) {
                        Ok(v) => candidate.diagnostic = Some(v),
                        Err(e) => tracing::warn!(place_id = %candidate.place_id, error = %e, "Diagnostic not serializable"),
                    }
                    progress.accepted += 1;
                    progress.partial_results.push(candidate.clone());
                    accepted.push(candidate);
                }
            }
            Err(DiagnosticError::Fetch(FetchError::Cancelled)) => return Err(PipelineError::Cancelled),
            Err(e) => {
                progress.failed += 1;
                tracing::warn!(place_id = %candidate.place_id, error = %e, "Verification failed");
            }
        }

        let full = accepted.len() >= limit;
        if full || progress.processed % every == 0 {
            sink.report(progress).await?;
        }
        if full {
            tracing::info!(processed = progress.processed, accepted = accepted.len(), "Verified quota filled");
            break;
        }
    }
    drop(builds);

    if accepted.len() < limit {
        sink.report(progress).await?;
    }
    Ok(accepted)
}
