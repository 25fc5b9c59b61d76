use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::store::{JobStore, StoreError};
use crate::models::job::{Job, JobInput, JobKind, JobOutcome, JobStatus};
use crate::models::scan::{Scan, ScanKind, ScanParams, ScanProgress};

const JOB_COLUMNS: &str = "id, owner_id, kind, input, status, result, error, created_at, completed_at";
const SCAN_COLUMNS: &str =
    "scan_id, owner_id, job_id, kind, params, status, summary, error, created_at, completed_at";

fn parse_status(s: &str) -> Result<JobStatus, StoreError> {
    s.parse()
        .map_err(|_| StoreError::Decode(format!("unknown job status '{s}'")))
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let kind_str: String = row.try_get("kind")?;
    let kind: JobKind = kind_str
        .parse()
        .map_err(|_| StoreError::Decode(format!("unknown job kind '{kind_str}'")))?;
    let input: Value = row.try_get("input")?;
    let status: String = row.try_get("status")?;

    Ok(Job {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        input: JobInput::from_parts(kind, input)?,
        status: parse_status(&status)?,
        result: row.try_get("result")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn scan_from_row(row: &PgRow) -> Result<Scan, StoreError> {
    let kind_str: String = row.try_get("kind")?;
    let kind: ScanKind = kind_str
        .parse()
        .map_err(|_| StoreError::Decode(format!("unknown scan kind '{kind_str}'")))?;
    let params: Value = row.try_get("params")?;
    let summary: Option<Value> = row.try_get("summary")?;
    let status: String = row.try_get("status")?;

    Ok(Scan {
        scan_id: row.try_get("scan_id")?,
        owner_id: row.try_get("owner_id")?,
        job_id: row.try_get("job_id")?,
        kind,
        params: serde_json::from_value::<ScanParams>(params)?,
        status: parse_status(&status)?,
        summary: summary.map(serde_json::from_value).transpose()?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

// ── Jobs ─────────────────────────────────────────────────────────────

/// Insert a pending job and, for scan kinds, its scan row in one transaction.
pub async fn create_job(pool: &PgPool, owner_id: i64, input: &JobInput) -> Result<Job, StoreError> {
    let (kind, payload) = input.to_parts()?;
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO jobs (id, owner_id, kind, input, status)
        VALUES ($1, $2, $3, $4, 'pending')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(owner_id)
    .bind(kind.to_string())
    .bind(&payload)
    .fetch_one(&mut *tx)
    .await?;
    let job = job_from_row(&row)?;

    if let Some((scan_id, scan_kind, params)) = input.owned_scan() {
        sqlx::query(
            r#"
            INSERT INTO scans (scan_id, owner_id, job_id, kind, params, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            "#,
        )
        .bind(scan_id)
        .bind(owner_id)
        .bind(job.id)
        .bind(scan_kind.to_string())
        .bind(serde_json::to_value(&params)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::ScanExists(scan_id),
            _ => StoreError::Database(e),
        })?;
    }

    tx.commit().await?;
    Ok(job)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, StoreError> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Claim the oldest pending job. `SKIP LOCKED` keeps a concurrent claimer
/// from blocking on (or double-claiming) the same row.
pub async fn claim_next_job(pool: &PgPool) -> Result<Option<Job>, StoreError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE jobs
        SET status = 'running'
        WHERE id = (
            SELECT id FROM jobs
            WHERE status = 'pending'
            ORDER BY created_at, id
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Replace the progress payload of a running job
pub async fn update_job_progress(
    pool: &PgPool,
    job_id: Uuid,
    payload: &Value,
) -> Result<bool, StoreError> {
    let res = sqlx::query("UPDATE jobs SET result = $1 WHERE id = $2 AND status = 'running'")
        .bind(payload)
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(res.rows_affected() == 1)
}

/// Write the terminal state of a running job
pub async fn finalize_job(
    pool: &PgPool,
    job_id: Uuid,
    outcome: &JobOutcome,
) -> Result<bool, StoreError> {
    let res = match outcome {
        JobOutcome::Completed(result) => {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'completed', result = $1, error = NULL, completed_at = NOW()
                WHERE id = $2 AND status = 'running'
                "#,
            )
            .bind(result)
            .bind(job_id)
            .execute(pool)
            .await?
        }
        JobOutcome::Failed(error) => {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed', error = $1, completed_at = NOW()
                WHERE id = $2 AND status = 'running'
                "#,
            )
            .bind(error)
            .bind(job_id)
            .execute(pool)
            .await?
        }
    };

    Ok(res.rows_affected() == 1)
}

// ── Scans ────────────────────────────────────────────────────────────

pub async fn get_scan(pool: &PgPool, scan_id: Uuid) -> Result<Option<Scan>, StoreError> {
    let row = sqlx::query(&format!("SELECT {SCAN_COLUMNS} FROM scans WHERE scan_id = $1"))
        .bind(scan_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(scan_from_row).transpose()
}

pub async fn update_scan_summary(
    pool: &PgPool,
    scan_id: Uuid,
    summary: &ScanProgress,
) -> Result<bool, StoreError> {
    let res = sqlx::query(
        r#"
        UPDATE scans
        SET summary = $1, status = 'running'
        WHERE scan_id = $2 AND status IN ('pending', 'running')
        "#,
    )
    .bind(serde_json::to_value(summary)?)
    .bind(scan_id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() == 1)
}

pub async fn finalize_scan(
    pool: &PgPool,
    scan_id: Uuid,
    status: JobStatus,
    summary: Option<&ScanProgress>,
    error: Option<&str>,
) -> Result<bool, StoreError> {
    if !status.is_terminal() {
        return Err(StoreError::Decode(format!(
            "scan finalize needs a terminal status, got '{status}'"
        )));
    }
    let summary = summary.map(serde_json::to_value).transpose()?;

    let res = sqlx::query(
        r#"
        UPDATE scans
        SET status = $1,
            summary = COALESCE($2, summary),
            error = $3,
            completed_at = NOW()
        WHERE scan_id = $4 AND status IN ('pending', 'running')
        "#,
    )
    .bind(status.to_string())
    .bind(summary)
    .bind(error)
    .bind(scan_id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() == 1)
}

/// Postgres-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, owner_id: i64, input: &JobInput) -> Result<Job, StoreError> {
        create_job(&self.pool, owner_id, input).await
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        get_job(&self.pool, id).await
    }

    async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        claim_next_job(&self.pool).await
    }

    async fn update_progress(&self, id: Uuid, payload: &Value) -> Result<bool, StoreError> {
        update_job_progress(&self.pool, id, payload).await
    }

    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, StoreError> {
        finalize_job(&self.pool, id, outcome).await
    }

    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<Scan>, StoreError> {
        get_scan(&self.pool, scan_id).await
    }

    async fn update_scan_summary(
        &self,
        scan_id: Uuid,
        summary: &ScanProgress,
    ) -> Result<bool, StoreError> {
        update_scan_summary(&self.pool, scan_id, summary).await
    }

    async fn finalize_scan(
        &self,
        scan_id: Uuid,
        status: JobStatus,
        summary: Option<&ScanProgress>,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        finalize_scan(&self.pool, scan_id, status, summary, error).await
    }
}
