//! End-to-end tests against real infrastructure
//!
//! The store tests require PostgreSQL with migrations applied, reachable
//! through DATABASE_URL. The API tests additionally require the API server
//! and the worker process to be running.
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:3000)

use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use territory_scan::db::cache_queries::PgCacheStore;
use territory_scan::db::queries::PgJobStore;
use territory_scan::db::store::JobStore;
use territory_scan::db::{init_pool, run_migrations};
use territory_scan::models::job::{AreaScanInput, Job, JobInput, JobOutcome, JobStatus};
use territory_scan::models::scan::{AreaFilters, ScanPhase, ScanProgress};
use territory_scan::services::cache::{CacheTable, SystemClock, TtlCache};

/// Get base URL from env or default to localhost
fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

async fn pool() -> sqlx::PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = init_pool(&url).await.expect("Failed to connect to database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

fn area_input() -> JobInput {
    JobInput::AreaScan(AreaScanInput {
        scan_id: Uuid::new_v4(),
        city: "Austin".to_string(),
        state: Some("TX".to_string()),
        vertical: "dentist".to_string(),
        limit: 5,
        filters: AreaFilters::default(),
    })
}

/// Claim jobs until `id` comes up. Other pending jobs in a shared test
/// database are failed out of the way.
async fn claim_job(store: &PgJobStore, id: Uuid) -> Job {
    for _ in 0..100 {
        let job = store
            .claim_next()
            .await
            .expect("Failed to claim job")
            .expect("job should be claimable");
        if job.id == id {
            return job;
        }
        store
            .finalize(job.id, &JobOutcome::Failed("cleared by e2e test".to_string()))
            .await
            .expect("Failed to clear job");
    }
    panic!("job {id} was never claimed");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_e2e_store_job_lifecycle() {
    let store = PgJobStore::new(pool().await);
    let input = area_input();
    let (scan_id, _, _) = input.owned_scan().unwrap();

    let job = store.create_job(11, &input).await.expect("Failed to create job");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.input, input);

    let scan = store.get_scan(scan_id).await.unwrap().expect("scan created with job");
    assert_eq!(scan.job_id, job.id);
    assert_eq!(scan.owner_id, 11);
    assert_eq!(scan.status, JobStatus::Pending);

    // No progress on a pending job.
    let pending_progress = json!({"phase": "candidate_fetch"});
    assert!(!store.update_progress(job.id, &pending_progress).await.unwrap());

    let claimed = claim_job(&store, job.id).await;
    assert_eq!(claimed.status, JobStatus::Running);

    let progress = ScanProgress {
        phase: ScanPhase::DetailScoring,
        processed: 4,
        ..Default::default()
    };
    let payload = serde_json::to_value(&progress).unwrap();
    assert!(store.update_progress(job.id, &payload).await.unwrap());
    assert!(store.update_scan_summary(scan_id, &progress).await.unwrap());

    let running = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(running.result, Some(payload));
    let scan = store.get_scan(scan_id).await.unwrap().unwrap();
    assert_eq!(scan.status, JobStatus::Running);
    assert_eq!(scan.summary.map(|s| s.processed), Some(4));

    let outcome = JobOutcome::Completed(json!({"kind": "area_scan"}));
    assert!(store.finalize(job.id, &outcome).await.unwrap());
    assert!(store
        .finalize_scan(scan_id, JobStatus::Completed, Some(&progress), None)
        .await
        .unwrap());

    // Terminal rows are never rewritten.
    assert!(!store
        .finalize(job.id, &JobOutcome::Failed("late".to_string()))
        .await
        .unwrap());
    assert!(!store
        .finalize_scan(scan_id, JobStatus::Failed, None, Some("late"))
        .await
        .unwrap());

    let done = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(done.error.is_none());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_e2e_cache_tables_roundtrip() {
    let pool = pool().await;
    let cache = TtlCache::new(
        CacheTable::LightweightCheck,
        std::sync::Arc::new(PgCacheStore::new(pool)),
        std::sync::Arc::new(SystemClock),
    );
    let key = format!("e2e-{}", Uuid::new_v4());

    assert!(cache.get::<Value>(&key).await.unwrap().is_none());
    cache.put(&key, &json!({"matches": true})).await.unwrap();
    cache.put(&key, &json!({"matches": false})).await.unwrap();
    assert_eq!(
        cache.get::<Value>(&key).await.unwrap(),
        Some(json!({"matches": false}))
    );
}

#[tokio::test]
#[ignore] // Requires running API server
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );

    println!("✓ Health check passed");
}

#[tokio::test]
#[ignore] // Requires running API server and worker with a provider key
async fn test_e2e_area_scan_via_api() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/jobs", base_url))
        .header("x-owner-id", "77")
        .json(&json!({
            "kind": "area_scan",
            "input": {"city": "Austin", "state": "TX", "vertical": "dentist", "limit": 5}
        }))
        .send()
        .await
        .expect("Submit failed");
    assert_eq!(response.status().as_u16(), 202);

    let submitted: Value = response.json().await.expect("Invalid submit response");
    let job_id = submitted["job_id"].as_str().expect("job_id").to_string();
    let scan_id = submitted["scan_id"].as_str().expect("scan_id").to_string();
    println!("Submitted job {job_id} for scan {scan_id}");

    // Other owners cannot see the job.
    let hidden = client
        .get(format!("{}/api/v1/jobs/{}", base_url, job_id))
        .header("x-owner-id", "78")
        .send()
        .await
        .unwrap();
    assert_eq!(hidden.status().as_u16(), 404);

    let mut status = Value::Null;
    for _ in 0..120 {
        status = client
            .get(format!("{}/api/v1/jobs/{}", base_url, job_id))
            .header("x-owner-id", "77")
            .send()
            .await
            .expect("Status poll failed")
            .json()
            .await
            .expect("Invalid status response");
        match status["status"].as_str() {
            Some("completed") | Some("failed") => break,
            other => println!("  status={:?} phase={:?}", other, status["phase"]),
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    assert_eq!(status["status"], "completed", "job did not complete: {status}");
    let candidates = status["result"]["candidates"].as_array().expect("candidates");
    assert!(candidates.len() <= 5);

    let scan: Value = client
        .get(format!("{}/api/v1/scans/{}", base_url, scan_id))
        .header("x-owner-id", "77")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(scan["status"], "completed");
    println!("✓ Area scan returned {} candidates", candidates.len());
}

#[tokio::test]
#[ignore] // Requires running API server
async fn test_e2e_invalid_submission_rejected() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/jobs", base_url))
        .json(&json!({
            "kind": "nl_find",
            "input": {"query": "find 5 dentists"}
        }))
        .send()
        .await
        .expect("Submit failed");
    assert_eq!(response.status().as_u16(), 400);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("city"));
}
