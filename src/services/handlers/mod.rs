//! Job handlers, one per job kind, and the registry the worker dispatches
//! through.

pub mod area_scan;
pub mod deep_scan;
pub mod list_rescan;
pub mod nl_find;
pub mod simple_enrichment;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::store::{JobStore, StoreError};
use crate::models::job::{Job, JobKind, JobResult};
use crate::services::diagnostic::DiagnosticError;
use crate::services::fetcher::FetchError;
use crate::services::pipeline::{JobProgress, Pipeline, PipelineError, ProgressSink};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Diagnostic(#[from] DiagnosticError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("handler for {expected} received {actual} input")]
    WrongInput { expected: JobKind, actual: JobKind },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("scan {0} not found")]
    ScanNotFound(Uuid),

    #[error("scan {0} has no completed results")]
    ScanNotReady(Uuid),

    #[error("no handler registered for {0}")]
    NoHandler(JobKind),

    #[error("job handler panicked")]
    Panicked,

    #[error("cancelled")]
    Cancelled,
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            JobError::Cancelled
                | JobError::Pipeline(PipelineError::Cancelled)
                | JobError::Diagnostic(DiagnosticError::Fetch(FetchError::Cancelled))
        )
    }

    pub(crate) fn wrong_input(expected: JobKind, job: &Job) -> Self {
        JobError::WrongInput {
            expected,
            actual: job.kind(),
        }
    }
}

/// Everything a handler needs for one claimed job.
pub struct JobContext {
    pub job: Job,
    pub store: Arc<dyn JobStore>,
    pub pipeline: Pipeline,
    pub progress: Arc<dyn ProgressSink>,
}

impl JobContext {
    /// Progress goes to the job and, for scan kinds, to its scan row.
    pub fn new(job: Job, store: Arc<dyn JobStore>, pipeline: Pipeline) -> Self {
        let scan_id = job.input.owned_scan().map(|(id, _, _)| id);
        let progress = Arc::new(JobProgress::new(store.clone(), job.id, scan_id));
        Self {
            job,
            store,
            pipeline,
            progress,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: &JobContext) -> Result<JobResult, JobError>;
}

/// Job kind → handler table, built once at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every job kind.
    pub fn standard() -> Self {
        Self::new()
            .register(JobKind::SimpleEnrichment, Arc::new(simple_enrichment::SimpleEnrichmentHandler))
            .register(JobKind::AreaScan, Arc::new(area_scan::AreaScanHandler))
            .register(JobKind::ListRescan, Arc::new(list_rescan::ListRescanHandler))
            .register(JobKind::DeepScan, Arc::new(deep_scan::DeepScanHandler))
            .register(JobKind::NlFind, Arc::new(nl_find::NlFindHandler))
    }

    pub fn register(mut self, kind: JobKind, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }
}
