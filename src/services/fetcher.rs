use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::candidate::{LatLng, PlaceDetails, PlaceSummary};
use crate::services::places::{ProviderError, SearchPage, SearchProvider, SearchQuery};

#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    /// Wait before a pagination cursor may be used.
    pub page_token_delay: Duration,
    /// Wait before every request.
    pub request_delay: Duration,
    pub throttle_backoff_base: Duration,
    pub transient_backoff_base: Duration,
    pub backoff_multiplier: u32,
    pub max_retries: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            page_token_delay: Duration::from_secs(2),
            request_delay: Duration::from_millis(100),
            throttle_backoff_base: Duration::from_secs(5),
            transient_backoff_base: Duration::from_secs(1),
            backoff_multiplier: 2,
            max_retries: 3,
        }
    }
}

impl FetcherConfig {
    /// No waits at all, same retry bound. For tests and replays.
    pub fn immediate() -> Self {
        Self {
            page_token_delay: Duration::ZERO,
            request_delay: Duration::ZERO,
            throttle_backoff_base: Duration::ZERO,
            transient_backoff_base: Duration::ZERO,
            ..Self::default()
        }
    }

    /// `base × multiplier^attempt`, with the base picked by error class.
    pub fn backoff(&self, err: &ProviderError, attempt: u32) -> Duration {
        let base = if err.is_throttle() {
            self.throttle_backoff_base
        } else {
            self.transient_backoff_base
        };
        base.saturating_mul(self.backoff_multiplier.saturating_pow(attempt))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cancelled")]
pub struct Cancelled;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ProviderError },

    #[error(transparent)]
    Provider(ProviderError),

    #[error("cancelled")]
    Cancelled,
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

/// Sleep unless the token fires first.
pub async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        return Err(Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = token.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub total_requests: u64,
    pub total_results: u64,
}

/// Paces, retries and paginates calls to a [`SearchProvider`].
pub struct RateLimitedFetcher {
    provider: Arc<dyn SearchProvider>,
    config: FetcherConfig,
    cancel: CancellationToken,
    requests: AtomicU64,
    results: AtomicU64,
}

impl RateLimitedFetcher {
    pub fn new(provider: Arc<dyn SearchProvider>, config: FetcherConfig, cancel: CancellationToken) -> Self {
        Self {
            provider,
            config,
            cancel,
            requests: AtomicU64::new(0),
            results: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            total_requests: self.requests.load(Ordering::Relaxed),
            total_results: self.results.load(Ordering::Relaxed),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// One page. A cursor is only used after the page-token cooldown.
    pub async fn fetch_page(
        &self,
        query: &SearchQuery,
        cursor: Option<&str>,
    ) -> Result<SearchPage, FetchError> {
        if cursor.is_some() {
            sleep_or_cancel(&self.cancel, self.config.page_token_delay).await?;
        }
        let page = self
            .with_retry("nearby_search", || self.provider.nearby_search(query, cursor))
            .await?;
        self.results
            .fetch_add(page.results.len() as u64, Ordering::Relaxed);
        Ok(page)
    }

    /// Every result of `query`, lazily, across at most `max_pages` pages.
    ///
    /// Ends on the page limit, an empty page, a missing cursor, or after
    /// yielding the first error. Dropping the stream stops further requests.
    pub fn fetch_all(
        &self,
        query: SearchQuery,
        max_pages: u32,
    ) -> impl Stream<Item = Result<PlaceSummary, FetchError>> + '_ {
        let start = Some((None::<String>, 0u32));

        stream::unfold(start, move |state| {
            let query = query.clone();
            async move {
                let (cursor, pages) = state?;
                if pages >= max_pages {
                    return None;
                }
                match self.fetch_page(&query, cursor.as_deref()).await {
                    Ok(page) if page.results.is_empty() => None,
                    Ok(page) => {
                        let next = page.next_cursor.map(|c| (Some(c), pages + 1));
                        let items: Vec<_> = page.results.into_iter().map(Ok).collect();
                        Some((items, next))
                    }
                    Err(e) => Some((vec![Err(e)], None)),
                }
            }
        })
        .flat_map(stream::iter)
    }

    pub async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, FetchError> {
        self.with_retry("place_details", || self.provider.place_details(place_id))
            .await
    }

    pub async fn geocode(&self, city: &str, state: Option<&str>) -> Result<Option<LatLng>, FetchError> {
        self.with_retry("geocode", || self.provider.geocode(city, state))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            sleep_or_cancel(&self.cancel, self.config.request_delay).await?;
            self.requests.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("provider_requests_total", "op" => op).increment(1);

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                r = call() => r,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt >= self.config.max_retries {
                        tracing::warn!(op, attempts = attempt + 1, error = %e, "Provider retries exhausted");
                        return Err(FetchError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: e,
                        });
                    }
                    let wait = self.config.backoff(&e, attempt);
                    tracing::warn!(
                        op,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Provider request failed, backing off"
                    );
                    sleep_or_cancel(&self.cancel, wait).await?;
                    attempt += 1;
                }
                Err(e) => return Err(FetchError::Provider(e)),
            }
        }
    }
}
