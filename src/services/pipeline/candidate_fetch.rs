use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::candidate::{LatLng, PlaceSummary};
use crate::models::scan::{ScanPhase, ScanProgress};
use crate::services::fetcher::{FetchError, RateLimitedFetcher};
use crate::services::geo::generate_grid;
use crate::services::pipeline::{candidate_cap, target_unique, Pipeline, PipelineError, ProgressSink};
use crate::services::places::{keywords_for_vertical, SearchQuery};

/// Keeps the first item seen for each id, in arrival order.
#[derive(Debug, Default)]
pub struct UniqueCollector {
    seen: HashSet<String>,
    items: Vec<PlaceSummary>,
}

impl UniqueCollector {
    /// Returns whether the item was new.
    pub fn push(&mut self, item: PlaceSummary) -> bool {
        if self.seen.insert(item.place_id.clone()) {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<PlaceSummary> {
        self.items
    }
}

pub fn dedup_by_id(items: impl IntoIterator<Item = PlaceSummary>) -> Vec<PlaceSummary> {
    let mut collector = UniqueCollector::default();
    for item in items {
        collector.push(item);
    }
    collector.into_items()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectOutcome {
    pub unique: Vec<PlaceSummary>,
    pub raw_collected: u32,
    pub queries_done: u32,
    pub queries_total: u32,
    pub failed_queries: u32,
    pub stopped_early: bool,
}

/// Run `queries` in order, deduplicating as results stream in, until
/// `target_unique` distinct ids are collected or the queries run out.
///
/// Pushes progress every `progress_every` queries, on early stop and on the
/// last query. A failed query is logged and skipped.
pub async fn collect_candidates(
    fetcher: &RateLimitedFetcher,
    queries: &[SearchQuery],
    max_pages: u32,
    target_unique: usize,
    progress_every: u32,
    progress: &mut ScanProgress,
    sink: &dyn ProgressSink,
) -> Result<CollectOutcome, PipelineError> {
    let total = queries.len() as u32;
    let mut collector = UniqueCollector::default();
    let mut raw = 0u32;
    let mut done = 0u32;
    let mut failed_queries = 0u32;
    let mut stopped_early = false;

    progress.phase = ScanPhase::CandidateFetch;
    progress.candidate_queries_total = total;

    for query in queries {
        done += 1;
        {
            let mut results = std::pin::pin!(fetcher.fetch_all(query.clone(), max_pages));
            while let Some(item) = results.next().await {
                match item {
                    Ok(place) => {
                        raw += 1;
                        if collector.push(place) && collector.len() >= target_unique {
                            stopped_early = true;
                            break;
                        }
                    }
                    Err(FetchError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(e) => {
                        failed_queries += 1;
                        tracing::warn!(
                            keyword = %query.keyword,
                            lat = query.location.lat,
                            lng = query.location.lng,
                            error = %e,
                            "Candidate query failed"
                        );
                    }
                }
            }
        }

        if stopped_early || done % progress_every.max(1) == 0 || done == total {
            progress.candidate_queries_done = done;
            progress.raw_candidates_collected = raw;
            sink.report(progress).await?;
        }
        if stopped_early {
            tracing::info!(queries_done = done, queries_total = total, unique = collector.len(), "Candidate target reached, stopping early");
            break;
        }
    }

    Ok(CollectOutcome {
        unique: collector.into_items(),
        raw_collected: raw,
        queries_done: done,
        queries_total: total,
        failed_queries,
        stopped_early,
    })
}

/// What is cached per (area, category, cap).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCandidates {
    candidates: Vec<PlaceSummary>,
    queries_done: u32,
    queries_total: u32,
    raw_collected: u32,
}

pub fn candidate_cache_key(city: &str, state: Option<&str>, vertical: &str, cap: usize) -> String {
    format!(
        "{}|{}|{}|{}",
        city.trim().to_lowercase(),
        state.unwrap_or("").trim().to_lowercase(),
        vertical.trim().to_lowercase(),
        cap
    )
}

/// Candidate fetch phase for an area and vertical.
///
/// Fails the scan when the area cannot be geocoded.
pub async fn fetch_candidates(
    pipeline: &Pipeline,
    city: &str,
    state: Option<&str>,
    vertical: &str,
    limit: u32,
    progress: &mut ScanProgress,
    sink: &dyn ProgressSink,
) -> Result<Vec<PlaceSummary>, PipelineError> {
    let cap = candidate_cap(limit);
    let key = candidate_cache_key(city, state, vertical, cap);

    if let Some(hit) = pipeline.caches.candidates.lookup::<CachedCandidates>(&key).await {
        tracing::info!(key = %key, candidates = hit.candidates.len(), "Candidate search cache hit");
        progress.phase = ScanPhase::CandidateFetch;
        progress.candidate_queries_done = hit.queries_done;
        progress.candidate_queries_total = hit.queries_total;
        progress.raw_candidates_collected = hit.raw_collected;
        sink.report(progress).await?;
        return Ok(hit.candidates);
    }

    let center = match pipeline.fetcher.geocode(city, state).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            let area = match state {
                Some(st) => format!("{city}, {st}"),
                None => city.to_string(),
            };
            return Err(PipelineError::AreaNotFound(area));
        }
        Err(FetchError::Cancelled) => return Err(PipelineError::Cancelled),
        Err(e) => return Err(PipelineError::AreaLookup(e)),
    };

    let cfg = &pipeline.config;
    let grid = generate_grid(center, cfg.area_radius_km, cfg.probe_radius_km);
    let keywords = keywords_for_vertical(vertical);
    let queries: Vec<SearchQuery> = grid
        .iter()
        .flat_map(|point| {
            keywords.iter().map(move |keyword| SearchQuery {
                location: LatLng::new(point.lat, point.lng),
                radius_m: point.radius_m,
                keyword: keyword.clone(),
            })
        })
        .collect();

    tracing::info!(
        city,
        vertical,
        grid_points = grid.len(),
        keywords = keywords.len(),
        target_unique = target_unique(limit),
        "Starting candidate fetch"
    );

    let outcome = collect_candidates(
        &pipeline.fetcher,
        &queries,
        cfg.max_pages,
        target_unique(limit),
        cfg.progress_every,
        progress,
        sink,
    )
    .await?;

    let mut candidates = outcome.unique;
    candidates.truncate(cap);

    if !candidates.is_empty() {
        let cached = CachedCandidates {
            candidates: candidates.clone(),
            queries_done: outcome.queries_done,
            queries_total: outcome.queries_total,
            raw_collected: outcome.raw_collected,
        };
        pipeline.caches.candidates.remember(&key, &cached).await;
    }

    tracing::info!(
        unique = candidates.len(),
        raw = outcome.raw_collected,
        failed_queries = outcome.failed_queries,
        "Candidate fetch complete"
    );
    Ok(candidates)
}
