use sqlx::PgPool;
use std::sync::Arc;

use crate::db::store::JobStore;
use crate::services::jobs::JobService;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jobs: Arc<JobService>,
}

impl AppState {
    pub fn new(db: PgPool, store: Arc<dyn JobStore>) -> Self {
        Self {
            db,
            jobs: Arc::new(JobService::new(store)),
        }
    }
}
