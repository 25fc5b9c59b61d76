use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

// ── Clock ────────────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// The three logical caches. Each maps to its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTable {
    CandidateSearch,
    LightweightCheck,
    DetailSignal,
}

impl CacheTable {
    pub fn table_name(self) -> &'static str {
        match self {
            CacheTable::CandidateSearch => "candidate_search_cache",
            CacheTable::LightweightCheck => "lightweight_check_cache",
            CacheTable::DetailSignal => "detail_signal_cache",
        }
    }

    pub fn ttl(self) -> Duration {
        match self {
            CacheTable::CandidateSearch => Duration::minutes(15),
            CacheTable::LightweightCheck => Duration::minutes(10),
            CacheTable::DetailSignal => Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub updated_at: DateTime<Utc>,
}

/// Raw key/payload storage. Freshness is decided by [`TtlCache`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, table: CacheTable, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Upsert on key, last writer wins.
    async fn store(&self, table: CacheTable, entry: CacheEntry) -> Result<(), CacheError>;
}

pub fn is_fresh(updated_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - updated_at <= ttl
}

// ── TTL cache ────────────────────────────────────────────────────────

/// A keyed JSON cache with pure time-based expiry.
#[derive(Clone)]
pub struct TtlCache {
    table: CacheTable,
    ttl: Duration,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(table: CacheTable, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table,
            ttl: table.ttl(),
            store,
            clock,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn table(&self) -> CacheTable {
        self.table
    }

    /// Fresh payload for `key`. A payload that no longer decodes as `T` is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(entry) = self.store.load(self.table, key).await? else {
            return Ok(None);
        };
        if !is_fresh(entry.updated_at, self.clock.now(), self.ttl) {
            return Ok(None);
        }
        Ok(serde_json::from_value(entry.payload).ok())
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload: serde_json::to_value(value)?,
            updated_at: self.clock.now(),
        };
        self.store.store(self.table, entry).await
    }

    /// [`get`](Self::get) with store failures logged and treated as a miss.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(table = self.table.table_name(), key, error = %e, "Cache read failed");
                None
            }
        }
    }

    /// [`put`](Self::put) with store failures logged and dropped.
    pub async fn remember<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.put(key, value).await {
            tracing::warn!(table = self.table.table_name(), key, error = %e, "Cache write failed");
        }
    }
}

/// The caches used by the scan pipeline.
#[derive(Clone)]
pub struct ScanCaches {
    pub candidates: TtlCache,
    pub lightweight: TtlCache,
    pub details: TtlCache,
}

impl ScanCaches {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            candidates: TtlCache::new(CacheTable::CandidateSearch, store.clone(), clock.clone()),
            lightweight: TtlCache::new(CacheTable::LightweightCheck, store.clone(), clock.clone()),
            details: TtlCache::new(CacheTable::DetailSignal, store, clock),
        }
    }
}
