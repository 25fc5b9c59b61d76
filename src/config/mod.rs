use serde::Deserialize;
use std::time::Duration;

use crate::services::fetcher::FetcherConfig;
use crate::services::worker::WorkerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Places API key. Only the worker calls the provider.
    #[serde(default)]
    pub google_places_api_key: String,

    #[serde(default = "default_places_base_url")]
    pub places_base_url: String,

    /// Prometheus scrape address served by the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,

    #[serde(default = "default_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Cooldown before a pagination cursor may be used
    #[serde(default = "default_page_token_delay_ms")]
    pub page_token_delay_ms: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub provider_max_retries: u32,

    #[serde(default = "default_throttle_backoff_ms")]
    pub throttle_backoff_base_ms: u64,

    #[serde(default = "default_transient_backoff_ms")]
    pub transient_backoff_base_ms: u64,

    /// Timeout for provider calls and homepage fetches
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_places_base_url() -> String {
    "https://maps.googleapis.com/maps/api".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_page_token_delay_ms() -> u64 {
    2000
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_throttle_backoff_ms() -> u64 {
    5000
}

fn default_transient_backoff_ms() -> u64 {
    1000
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            page_token_delay: Duration::from_millis(self.page_token_delay_ms),
            request_delay: Duration::from_millis(self.request_delay_ms),
            throttle_backoff_base: Duration::from_millis(self.throttle_backoff_base_ms),
            transient_backoff_base: Duration::from_millis(self.transient_backoff_base_ms),
            max_retries: self.provider_max_retries,
            ..FetcherConfig::default()
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.worker_poll_interval_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_env() {
        let vars = vec![("DATABASE_URL".to_string(), "postgres://localhost/scan".to_string())];
        let config: AppConfig = envy::from_iter(vars).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.worker_config().poll_interval, Duration::from_secs(2));
        assert_eq!(config.fetcher_config(), FetcherConfig::default());
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/scan".to_string()),
            ("REQUEST_DELAY_MS".to_string(), "0".to_string()),
            ("PROVIDER_MAX_RETRIES".to_string(), "5".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        let fetcher = config.fetcher_config();
        assert_eq!(fetcher.request_delay, Duration::ZERO);
        assert_eq!(fetcher.max_retries, 5);
    }
}
