//! Shared fakes for pipeline and worker tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use territory_scan::db::memory::{MemoryCacheStore, MemoryJobStore};
use territory_scan::db::store::{JobStore, StoreError};
use territory_scan::models::candidate::{AddressComponent, LatLng, PlaceDetails, PlaceSummary};
use territory_scan::models::diagnostic::{Diagnostic, DiagnosticTarget, VerifiedSignals};
use territory_scan::models::job::{Job, JobInput, JobOutcome, JobStatus};
use territory_scan::models::scan::{Scan, ScanProgress};
use territory_scan::services::cache::{ManualClock, ScanCaches};
use territory_scan::services::diagnostic::{DiagnosticBuilder, DiagnosticError};
use territory_scan::services::fetcher::{FetcherConfig, RateLimitedFetcher};
use territory_scan::services::handlers::HandlerRegistry;
use territory_scan::services::pipeline::{Pipeline, PipelineConfig, ProgressSink};
use territory_scan::services::places::{ProviderError, SearchPage, SearchProvider, SearchQuery};
use territory_scan::services::website::{FetchedPage, ProbeError, WebsiteProbe};
use territory_scan::services::worker::{Worker, WorkerConfig};

pub const AUSTIN: LatLng = LatLng {
    lat: 30.2672,
    lng: -97.7431,
};

/// Search provider with deterministic results.
///
/// Every nearby search returns `per_query` places never returned before, on
/// a single page. Place `pN-i` has a website when `i` is even and
/// `N * 10 + i` reviews.
pub struct FakeProvider {
    pub center: Option<LatLng>,
    pub per_query: u32,
    /// Detail lookups for these ids time out on every attempt.
    pub failing_details: HashSet<String>,
    pub nearby_calls: AtomicU32,
    pub detail_calls: AtomicU32,
    pub geocode_calls: AtomicU32,
}

impl FakeProvider {
    pub fn new(per_query: u32) -> Self {
        Self {
            center: Some(AUSTIN),
            per_query,
            failing_details: HashSet::new(),
            nearby_calls: AtomicU32::new(0),
            detail_calls: AtomicU32::new(0),
            geocode_calls: AtomicU32::new(0),
        }
    }

    pub fn with_failing_details(mut self, ids: &[&str]) -> Self {
        self.failing_details = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn without_area(mut self) -> Self {
        self.center = None;
        self
    }

    pub fn nearby_calls(&self) -> u32 {
        self.nearby_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> u32 {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

fn index_of(place_id: &str) -> (u32, u32) {
    let rest = place_id.trim_start_matches('p');
    let mut parts = rest.split('-').filter_map(|p| p.parse::<u32>().ok());
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

pub fn summary(place_id: &str) -> PlaceSummary {
    PlaceSummary {
        place_id: place_id.to_string(),
        name: format!("Search {place_id}"),
        address: None,
        location: Some(AUSTIN),
        rating: None,
        user_ratings_total: None,
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    async fn nearby_search(
        &self,
        _query: &SearchQuery,
        _cursor: Option<&str>,
    ) -> Result<SearchPage, ProviderError> {
        let call = self.nearby_calls.fetch_add(1, Ordering::SeqCst);
        let results = (0..self.per_query)
            .map(|i| summary(&format!("p{call}-{i}")))
            .collect();
        Ok(SearchPage {
            results,
            next_cursor: None,
        })
    }

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_details.contains(place_id) {
            return Err(ProviderError::Timeout);
        }
        let (call, i) = index_of(place_id);
        Ok(PlaceDetails {
            place_id: place_id.to_string(),
            name: Some(format!("Business {place_id}")),
            formatted_address: Some("100 Congress Ave, Austin, TX".to_string()),
            address_components: vec![
                AddressComponent {
                    long_name: "Austin".to_string(),
                    short_name: "Austin".to_string(),
                    types: vec!["locality".to_string()],
                },
                AddressComponent {
                    long_name: "Texas".to_string(),
                    short_name: "TX".to_string(),
                    types: vec!["administrative_area_level_1".to_string()],
                },
            ],
            website: (i % 2 == 0).then(|| format!("https://{place_id}.example")),
            phone: None,
            rating: Some(4.0),
            user_ratings_total: Some(call * 10 + i),
        })
    }

    async fn geocode(&self, _city: &str, _state: Option<&str>) -> Result<Option<LatLng>, ProviderError> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.center)
    }
}

/// Homepage probe serving one fixed page for every url.
pub struct FakeProbe {
    pub html: String,
    pub calls: AtomicU32,
}

impl FakeProbe {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn bare() -> Self {
        Self::new("<html><body><p>Welcome</p><a href=\"/about\">About</a></body></html>")
    }
}

#[async_trait]
impl WebsiteProbe for FakeProbe {
    async fn fetch_homepage(&self, url: &str) -> Result<FetchedPage, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.is_empty() {
            return Err(ProbeError::InvalidUrl(url.to_string()));
        }
        Ok(FetchedPage {
            final_url: url.to_string(),
            html: self.html.clone(),
        })
    }
}

/// Diagnostic builder that labels every business the same way and reports
/// every requested service as missing.
pub struct FakeDiagnostics {
    pub constraint: String,
    pub failing: HashSet<String>,
    pub calls: AtomicU32,
}

impl FakeDiagnostics {
    pub fn new(constraint: &str) -> Self {
        Self {
            constraint: constraint.to_string(),
            failing: HashSet::new(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_for(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[async_trait]
impl DiagnosticBuilder for FakeDiagnostics {
    async fn build(&self, target: &DiagnosticTarget) -> Result<Diagnostic, DiagnosticError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&target.business_name) {
            return Err(DiagnosticError::NotResolved(target.business_name.clone()));
        }
        Ok(Diagnostic {
            place_id: target.place_id.clone(),
            business_name: target.business_name.clone(),
            city: target.city.clone(),
            state: target.state.clone(),
            website: target.website.clone(),
            constraint: self.constraint.clone(),
            primary_leverage: "review_generation".to_string(),
            opportunity_profile: "moderate".to_string(),
            signals: VerifiedSignals {
                has_website: target.website.is_some(),
                missing_services: target.services.clone(),
                ..Default::default()
            },
            brief: json!({
                "executive_diagnosis": {
                    "constraint": self.constraint,
                    "primary_leverage": "review_generation",
                    "modeled_revenue_upside": "moderate",
                }
            }),
        })
    }
}

/// Progress sink that keeps every snapshot it is given.
#[derive(Default)]
pub struct RecordingSink {
    pub reports: Mutex<Vec<ScanProgress>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<ScanProgress> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, progress: &ScanProgress) -> Result<(), StoreError> {
        self.reports.lock().unwrap().push(progress.clone());
        Ok(())
    }
}

/// Job store whose scan terminal writes always fail. Everything else goes to
/// the wrapped memory store.
pub struct FlakyScanStore {
    pub inner: Arc<MemoryJobStore>,
}

#[async_trait]
impl JobStore for FlakyScanStore {
    async fn create_job(&self, owner_id: i64, input: &JobInput) -> Result<Job, StoreError> {
        self.inner.create_job(owner_id, input).await
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.inner.get_job(id).await
    }

    async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        self.inner.claim_next().await
    }

    async fn update_progress(&self, id: Uuid, payload: &Value) -> Result<bool, StoreError> {
        self.inner.update_progress(id, payload).await
    }

    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, StoreError> {
        self.inner.finalize(id, outcome).await
    }

    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<Scan>, StoreError> {
        self.inner.get_scan(scan_id).await
    }

    async fn update_scan_summary(&self, scan_id: Uuid, summary: &ScanProgress) -> Result<bool, StoreError> {
        self.inner.update_scan_summary(scan_id, summary).await
    }

    async fn finalize_scan(
        &self,
        _scan_id: Uuid,
        _status: JobStatus,
        _summary: Option<&ScanProgress>,
        _error: Option<&str>,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Decode("scan write failure".to_string()))
    }
}

/// Everything a worker test needs, wired over in-memory stores.
pub struct TestEnv {
    pub store: Arc<MemoryJobStore>,
    pub cache_store: Arc<MemoryCacheStore>,
    pub clock: Arc<ManualClock>,
    pub provider: Arc<FakeProvider>,
    pub probe: Arc<FakeProbe>,
    pub diagnostics: Arc<FakeDiagnostics>,
    pub cancel: CancellationToken,
    pub pipeline: Pipeline,
    pub worker: Worker,
}

impl TestEnv {
    pub fn new(provider: FakeProvider, probe: FakeProbe, diagnostics: FakeDiagnostics) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let cache_store = Arc::new(MemoryCacheStore::new());
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let provider = Arc::new(provider);
        let probe = Arc::new(probe);
        let diagnostics = Arc::new(diagnostics);
        let cancel = CancellationToken::new();

        let fetcher = Arc::new(RateLimitedFetcher::new(
            provider.clone(),
            FetcherConfig::immediate(),
            cancel.clone(),
        ));
        let pipeline = Pipeline {
            fetcher,
            caches: ScanCaches::new(cache_store.clone(), clock.clone()),
            probe: probe.clone(),
            diagnostics: diagnostics.clone(),
            config: PipelineConfig::default(),
        };
        let worker = Worker::new(
            store.clone(),
            HandlerRegistry::standard(),
            pipeline.clone(),
            WorkerConfig::default(),
        );

        Self {
            store,
            cache_store,
            clock,
            provider,
            probe,
            diagnostics,
            cancel,
            pipeline,
            worker,
        }
    }

    pub fn standard() -> Self {
        Self::new(FakeProvider::new(7), FakeProbe::bare(), FakeDiagnostics::new("reputation"))
    }

    /// A worker over the same pipeline whose scan terminal writes fail.
    pub fn flaky_scan_worker(&self) -> Worker {
        let store = Arc::new(FlakyScanStore {
            inner: self.store.clone(),
        });
        Worker::new(
            store,
            HandlerRegistry::standard(),
            self.pipeline.clone(),
            WorkerConfig::default(),
        )
    }
}
