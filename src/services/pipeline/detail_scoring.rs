use futures::stream::{self, StreamExt};

use crate::models::candidate::{Candidate, MarketStats, PlaceDetails, PlaceSummary, WebsiteSignals};
use crate::models::scan::{ScanPhase, ScanProgress};
use crate::services::fetcher::FetchError;
use crate::services::pipeline::{scored_cap_target, Pipeline, PipelineError, ProgressSink};
use crate::services::ranking;
use crate::services::website;

fn details_key(place_id: &str) -> String {
    format!("details:{place_id}")
}

fn signals_key(place_id: &str) -> String {
    format!("signals:{place_id}")
}

#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    /// Sorted by rank key, highest first.
    pub candidates: Vec<Candidate>,
    pub failed: u32,
    pub market: MarketStats,
}

/// Detail scoring phase.
///
/// Caps the candidate list for `limit`, resolves details one by one (cached
/// or live), probes websites on a bounded pool, then computes market flags
/// and rank keys. Per-candidate failures are counted and skipped.
pub async fn score_candidates(
    pipeline: &Pipeline,
    summaries: &[PlaceSummary],
    limit: u32,
    fallback_city: &str,
    fallback_state: Option<&str>,
    progress: &mut ScanProgress,
    sink: &dyn ProgressSink,
) -> Result<ScoringOutcome, PipelineError> {
    let cap = scored_cap_target(limit);
    let chosen = &summaries[..summaries.len().min(cap)];
    let every = pipeline.config.progress_every.max(1);

    progress.phase = ScanPhase::DetailScoring;
    progress.total_candidates = summaries.len() as u32;
    progress.scored_candidates = chosen.len() as u32;
    progress.processed = 0;
    progress.failed = 0;
    sink.report(progress).await?;

    let mut scored = Vec::with_capacity(chosen.len());
    for summary in chosen {
        pipeline.check_cancelled()?;

        match load_details(pipeline, &summary.place_id).await {
            Ok(details) => {
                scored.push(Candidate::from_details(summary, &details, fallback_city, fallback_state));
            }
            Err(FetchError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                progress.failed += 1;
                tracing::warn!(place_id = %summary.place_id, error = %e, "Detail lookup failed, skipping candidate");
            }
        }

        progress.processed += 1;
        if progress.processed % every == 0 {
            sink.report(progress).await?;
        }
    }

    probe_websites(pipeline, &mut scored).await?;

    let market = ranking::market_stats(&scored);
    for candidate in scored.iter_mut() {
        ranking::apply_market_flags(candidate, &market);
        candidate.rank_key = ranking::rank_key(candidate, market.avg_reviews);
    }
    ranking::sort_by_rank_key(&mut scored);
    sink.report(progress).await?;

    tracing::info!(
        scored = scored.len(),
        failed = progress.failed,
        avg_reviews = market.avg_reviews,
        avg_rating = market.avg_rating,
        "Detail scoring complete"
    );

    Ok(ScoringOutcome {
        candidates: scored,
        failed: progress.failed,
        market,
    })
}

async fn load_details(pipeline: &Pipeline, place_id: &str) -> Result<PlaceDetails, FetchError> {
    let key = details_key(place_id);
    if let Some(details) = pipeline.caches.details.lookup::<PlaceDetails>(&key).await {
        return Ok(details);
    }
    let details = pipeline.fetcher.place_details(place_id).await?;
    pipeline.caches.details.remember(&key, &details).await;
    Ok(details)
}

/// Fill website signals from the cache, probing the rest concurrently.
/// A failed probe leaves the candidate with empty signals and is not cached.
async fn probe_websites(pipeline: &Pipeline, candidates: &mut [Candidate]) -> Result<(), PipelineError> {
    let mut to_probe = Vec::new();
    for (idx, candidate) in candidates.iter_mut().enumerate() {
        let Some(url) = candidate.website.clone() else {
            continue;
        };
        match pipeline
            .caches
            .details
            .lookup::<WebsiteSignals>(&signals_key(&candidate.place_id))
            .await
        {
            Some(signals) => candidate.apply_signals(&signals),
            None => to_probe.push((idx, url)),
        }
    }

    if to_probe.is_empty() {
        return Ok(());
    }
    tracing::debug!(probes = to_probe.len(), pool = pipeline.config.probe_pool, "Probing websites");

    let probe = pipeline.probe.as_ref();
    let mut results = stream::iter(to_probe)
        .map(|(idx, url)| async move { (idx, probe.fetch_homepage(&url).await) })
        .buffer_unordered(pipeline.config.probe_pool.max(1));

    while let Some((idx, outcome)) = results.next().await {
        pipeline.check_cancelled()?;
        let candidate = &mut candidates[idx];
        match outcome {
            Ok(page) => {
                let signals = website::analyze_html(&page);
                pipeline
                    .caches
                    .details
                    .remember(&signals_key(&candidate.place_id), &signals)
                    .await;
                candidate.apply_signals(&signals);
            }
            Err(e) => {
                tracing::warn!(place_id = %candidate.place_id, error = %e, "Website probe failed");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_are_namespaced() {
        assert_eq!(details_key("abc"), "details:abc");
        assert_eq!(signals_key("abc"), "signals:abc");
        assert_ne!(details_key("abc"), signals_key("abc"));
    }
}
