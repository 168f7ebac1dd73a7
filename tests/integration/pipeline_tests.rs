//! End-to-end pipeline tests against in-memory queue and store.
//!
//! Tests verify:
//! - A full job renders and publishes the whole requested zoom range
//! - Queue accounting: acknowledge on terminal outcomes, release on
//!   retryable failures
//! - Poison messages are acknowledged exactly once and never redelivered
//! - The redelivery budget dead-letters persistently failing jobs
//! - Duplicate executions converge to identical stored tiles
//! - Completed jobs publish a manifest summarizing their output

use std::sync::Arc;

use raster_tiler::job::JobOutcome;
use raster_tiler::pipeline::{JobRunner, Worker};
use raster_tiler::queue::JobStatus;

use super::test_utils::{
    gradient_png, job_body, test_config, uniform_gray_png, MockJobQueue, MockObjectStore,
    RecordingReporter,
};

fn build_worker(
    queue: Arc<MockJobQueue>,
    store: Arc<MockObjectStore>,
    reporter: Arc<RecordingReporter>,
) -> Worker {
    Worker::new(JobRunner::new(queue, store, reporter, test_config()))
}

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
async fn test_full_pyramid_published() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "j1.png",
        gradient_png(512, 512),
    ));
    let reporter = Arc::new(RecordingReporter::new());
    queue.push_job(job_body("j1").to_string());

    let worker = build_worker(Arc::clone(&queue), Arc::clone(&store), Arc::clone(&reporter));
    let outcome = worker.poll_once().await.unwrap();

    // Four base tiles at zoom 2, one at zoom 1, one at zoom 0, plus the
    // completion manifest
    assert_eq!(outcome, Some(JobOutcome::Succeeded { tile_count: 6 }));
    assert_eq!(
        store.keys_with_prefix("tiles", "jobs/j1/"),
        vec![
            "jobs/j1/scene/0/0/0.png",
            "jobs/j1/scene/1/0/0.png",
            "jobs/j1/scene/2/0/0.png",
            "jobs/j1/scene/2/0/1.png",
            "jobs/j1/scene/2/1/0.png",
            "jobs/j1/scene/2/1/1.png",
            "jobs/j1/scene/manifest.json",
        ]
    );

    assert_eq!(queue.acknowledged_count(), 1);
    assert_eq!(queue.released_count(), 0);
    assert_eq!(queue.pending_count(), 0);
    // Fast job: the visibility heartbeat never needs to fire
    assert_eq!(queue.extension_count(), 0);

    let statuses: Vec<JobStatus> = reporter.records().iter().map(|r| r.status.clone()).collect();
    assert_eq!(statuses, vec![JobStatus::Started, JobStatus::Finished]);
    assert!(reporter.records().iter().all(|r| r.job_id == "j1"));
}

#[tokio::test]
async fn test_empty_source_publishes_nothing() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "j2.png",
        uniform_gray_png(512, 512, 0),
    ));
    let reporter = Arc::new(RecordingReporter::new());

    let mut body = job_body("j2");
    body["nodata"] = 0.0.into();
    queue.push_job(body.to_string());

    let worker = build_worker(Arc::clone(&queue), Arc::clone(&store), reporter);
    let outcome = worker.poll_once().await.unwrap();

    // Every sample is nodata: the job succeeds without writing a single
    // tile, but still records its completion in the manifest
    assert_eq!(outcome, Some(JobOutcome::Succeeded { tile_count: 0 }));
    assert_eq!(
        store.keys_with_prefix("tiles", "jobs/j2/"),
        vec!["jobs/j2/scene/manifest.json"]
    );
    let manifest: serde_json::Value =
        serde_json::from_slice(&store.object("tiles", "jobs/j2/scene/manifest.json").unwrap())
            .unwrap();
    assert_eq!(manifest["tileCount"], 0);
    assert!(manifest.get("gridBounds").is_none());
    assert_eq!(queue.acknowledged_count(), 1);
}

#[tokio::test]
async fn test_manifest_summarizes_job() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "j9.png",
        gradient_png(512, 512),
    ));
    let reporter = Arc::new(RecordingReporter::new());
    queue.push_job(job_body("j9").to_string());

    let worker = build_worker(Arc::clone(&queue), Arc::clone(&store), reporter);
    assert_eq!(
        worker.poll_once().await.unwrap(),
        Some(JobOutcome::Succeeded { tile_count: 6 })
    );

    let manifest: serde_json::Value =
        serde_json::from_slice(&store.object("tiles", "jobs/j9/scene/manifest.json").unwrap())
            .unwrap();
    assert_eq!(manifest["jobId"], "j9");
    assert_eq!(manifest["layerId"], "scene");
    assert_eq!(manifest["minZoom"], 0);
    assert_eq!(manifest["maxZoom"], 2);
    assert_eq!(manifest["tileSize"], 256);
    assert_eq!(manifest["tileCount"], 6);
    // The source covers the northwest world quadrant: base tiles 2/0..1/0..1
    assert_eq!(manifest["gridBounds"]["minCol"], 0);
    assert_eq!(manifest["gridBounds"]["minRow"], 0);
    assert_eq!(manifest["gridBounds"]["maxCol"], 1);
    assert_eq!(manifest["gridBounds"]["maxRow"], 1);
}

#[tokio::test]
async fn test_empty_poll_returns_none() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new());
    let reporter = Arc::new(RecordingReporter::new());

    let worker = build_worker(queue, store, reporter);
    assert_eq!(worker.poll_once().await.unwrap(), None);
}

// =============================================================================
// Poison Messages
// =============================================================================

#[tokio::test]
async fn test_poison_message_acknowledged() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new());
    let reporter = Arc::new(RecordingReporter::new());
    queue.push_job("{definitely not json");

    let worker = build_worker(Arc::clone(&queue), Arc::clone(&store), Arc::clone(&reporter));
    let outcome = worker.poll_once().await.unwrap();

    match outcome {
        Some(JobOutcome::Failed { retryable, .. }) => assert!(!retryable),
        other => panic!("expected non-retryable failure, got {other:?}"),
    }

    // Acknowledged exactly once, never released, nothing published
    assert_eq!(queue.acknowledged_count(), 1);
    assert_eq!(queue.released_count(), 0);
    assert_eq!(queue.pending_count(), 0);
    assert_eq!(store.object_count("tiles"), 0);

    // No job id could be recovered, so no status record either
    assert!(reporter.records().is_empty());
}

#[tokio::test]
async fn test_invalid_field_reports_failure() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new());
    let reporter = Arc::new(RecordingReporter::new());

    let mut body = job_body("j3");
    body["maxZoom"] = 30.into();
    queue.push_job(body.to_string());

    let worker = build_worker(Arc::clone(&queue), store, Arc::clone(&reporter));
    let outcome = worker.poll_once().await.unwrap();

    match outcome {
        Some(JobOutcome::Failed { retryable, reason }) => {
            assert!(!retryable);
            assert!(reason.contains("maxZoom"));
        }
        other => panic!("expected non-retryable failure, got {other:?}"),
    }
    assert_eq!(queue.acknowledged_count(), 1);

    // The body still carried a job id, so the failure is reported
    let records = reporter.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].job_id, "j3");
    assert_eq!(records[0].status, JobStatus::Failed);
    assert!(records[0].error.is_some());
}

#[tokio::test]
async fn test_missing_source_not_retried() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new());
    let reporter = Arc::new(RecordingReporter::new());
    queue.push_job(job_body("j4").to_string());

    let worker = build_worker(Arc::clone(&queue), store, reporter);
    let outcome = worker.poll_once().await.unwrap();

    // A definitively missing object will be missing on redelivery too
    match outcome {
        Some(JobOutcome::Failed { retryable, .. }) => assert!(!retryable),
        other => panic!("expected non-retryable failure, got {other:?}"),
    }
    assert_eq!(queue.acknowledged_count(), 1);
    assert_eq!(queue.released_count(), 0);
}

// =============================================================================
// Retryable Failures
// =============================================================================

#[tokio::test]
async fn test_transient_failure_released_then_succeeds() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "j5.png",
        gradient_png(512, 512),
    ));
    let reporter = Arc::new(RecordingReporter::new());
    queue.push_job(job_body("j5").to_string());
    store.fail_next_gets(1);

    let worker = build_worker(Arc::clone(&queue), Arc::clone(&store), Arc::clone(&reporter));

    // First delivery hits the injected failure and is released
    match worker.poll_once().await.unwrap() {
        Some(JobOutcome::Failed { retryable, .. }) => assert!(retryable),
        other => panic!("expected retryable failure, got {other:?}"),
    }
    assert_eq!(queue.released_count(), 1);
    assert_eq!(queue.acknowledged_count(), 0);
    assert_eq!(queue.pending_count(), 1);

    // Redelivery succeeds
    assert_eq!(
        worker.poll_once().await.unwrap(),
        Some(JobOutcome::Succeeded { tile_count: 6 })
    );
    assert_eq!(queue.acknowledged_count(), 1);
    assert_eq!(queue.pending_count(), 0);
}

#[tokio::test]
async fn test_publish_failure_released_then_succeeds() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "j8.png",
        gradient_png(512, 512),
    ));
    let reporter = Arc::new(RecordingReporter::new());
    queue.push_job(job_body("j8").to_string());
    store.fail_next_puts(1);

    let worker = build_worker(Arc::clone(&queue), Arc::clone(&store), reporter);

    // A failed tile write is retryable: rendering is deterministic, so the
    // redelivered job overwrites any tiles the first pass already published
    match worker.poll_once().await.unwrap() {
        Some(JobOutcome::Failed { retryable, .. }) => assert!(retryable),
        other => panic!("expected retryable failure, got {other:?}"),
    }
    assert_eq!(queue.released_count(), 1);

    assert_eq!(
        worker.poll_once().await.unwrap(),
        Some(JobOutcome::Succeeded { tile_count: 6 })
    );
    assert_eq!(store.keys_with_prefix("tiles", "jobs/j8/").len(), 7);
    assert_eq!(queue.acknowledged_count(), 1);
}

#[tokio::test]
async fn test_redelivery_budget_dead_letters() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "j6.png",
        gradient_png(512, 512),
    ));
    let reporter = Arc::new(RecordingReporter::new());
    queue.push_job(job_body("j6").to_string());
    store.fail_next_gets(10);

    let worker = build_worker(Arc::clone(&queue), Arc::clone(&store), Arc::clone(&reporter));

    // max_redeliveries is 2: deliveries 1 and 2 release, delivery 3 gives up
    for _ in 0..2 {
        match worker.poll_once().await.unwrap() {
            Some(JobOutcome::Failed { retryable, .. }) => assert!(retryable),
            other => panic!("expected retryable failure, got {other:?}"),
        }
    }
    match worker.poll_once().await.unwrap() {
        Some(JobOutcome::Failed { retryable, .. }) => assert!(!retryable),
        other => panic!("expected terminal failure, got {other:?}"),
    }

    assert_eq!(queue.released_count(), 2);
    assert_eq!(queue.acknowledged_count(), 1);
    assert_eq!(queue.pending_count(), 0);

    let failed: Vec<_> = reporter
        .records()
        .into_iter()
        .filter(|r| r.status == JobStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job_id, "j6");
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn test_duplicate_execution_is_idempotent() {
    let queue = Arc::new(MockJobQueue::new());
    let store = Arc::new(MockObjectStore::new().with_object(
        "imagery",
        "j7.png",
        gradient_png(512, 512),
    ));
    let reporter = Arc::new(RecordingReporter::new());

    // The same job delivered twice, as at-least-once queues are free to do
    queue.push_job(job_body("j7").to_string());
    queue.push_job(job_body("j7").to_string());

    let worker = build_worker(Arc::clone(&queue), Arc::clone(&store), reporter);

    assert_eq!(
        worker.poll_once().await.unwrap(),
        Some(JobOutcome::Succeeded { tile_count: 6 })
    );
    let keys = store.keys_with_prefix("tiles", "jobs/j7/");
    let first_pass: Vec<_> = keys
        .iter()
        .map(|k| store.object("tiles", k).unwrap())
        .collect();

    assert_eq!(
        worker.poll_once().await.unwrap(),
        Some(JobOutcome::Succeeded { tile_count: 6 })
    );
    assert_eq!(store.keys_with_prefix("tiles", "jobs/j7/"), keys);

    // Byte-identical overwrites: the duplicate changed nothing observable
    for (key, before) in keys.iter().zip(first_pass) {
        assert_eq!(store.object("tiles", key).unwrap(), before, "tile {key}");
    }
    assert_eq!(queue.acknowledged_count(), 2);
}
