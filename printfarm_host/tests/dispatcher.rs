mod common;

use common::{Farm, OTHER_PRINTER, PRINTER};
use printfarm_host::QueueOutcome;
use printfarm_host::printer_api::UploadOptions;
use printfarm_host::job_lifecycle::REASON_MANUAL_FAILED;
use printfarm_shared::{JobDraft, JobStatus, PrintJob, PrintJobError};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Starts a gated submit of `job` and returns once its upload is in flight.
async fn submit_in_flight(farm: &Arc<Farm>, job: &PrintJob) -> JoinHandle<Result<PrintJob, PrintJobError>> {
    farm.adapter.set_gated(true);
    let task = {
        let farm = farm.clone();
        let id = job.id.clone();
        tokio::spawn(async move { farm.dispatcher.submit_job(PRINTER, &id).await })
    };
    farm.adapter.started.notified().await;
    task
}

#[tokio::test]
async fn test_process_queue_empty_is_noop() {
    let farm = Farm::new();
    assert_eq!(farm.dispatcher.process_queue(PRINTER).await.unwrap(), QueueOutcome::Empty);
}

#[tokio::test]
async fn test_process_queue_reports_head_without_side_effects() {
    let farm = Farm::new();
    let a = farm.queued(PRINTER, "a.gcode").await;
    farm.queued(PRINTER, "b.gcode").await;
    match farm.dispatcher.process_queue(PRINTER).await.unwrap() {
        QueueOutcome::Next(job) => assert_eq!(job.id, a.id),
        QueueOutcome::Empty => panic!("queue should not be empty"),
    }
    assert_eq!(farm.job(&a.id).await.status, JobStatus::Queued);
    assert_eq!(farm.adapter.upload_count(), 0);
}

#[tokio::test]
async fn test_unknown_printer_is_not_found() {
    let farm = Farm::new();
    let err = farm.dispatcher.process_queue("ghost").await.unwrap_err();
    assert!(matches!(err, PrintJobError::NotFound(_)));
    let job = farm.pending(PRINTER, "a.gcode").await;
    let err = farm.dispatcher.submit_job("ghost", &job.id).await.unwrap_err();
    assert!(matches!(err, PrintJobError::NotFound(_)));
    assert_eq!(farm.adapter.upload_count(), 0);
}

#[tokio::test]
async fn test_submit_queued_job_starts_and_compacts() {
    let farm = Farm::new();
    let a = farm.queued(PRINTER, "a.gcode").await;
    let b = farm.queued(PRINTER, "b.gcode").await;

    let started = farm.dispatcher.submit_job(PRINTER, &a.id).await.unwrap();
    assert_eq!(started.status, JobStatus::Printing);
    assert_eq!(started.queue_position, None);
    assert!(started.started_at.is_some());
    assert_eq!(farm.job(&b.id).await.queue_position, Some(0));
    farm.assert_invariants(PRINTER).await;

    let uploads = farm.adapter.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    let (printer, filename, size, options) = &uploads[0];
    assert_eq!(printer, PRINTER);
    assert_eq!(filename, "a.gcode");
    assert!(*size > 0);
    assert_eq!(*options, UploadOptions { select: true, print: true });
}

#[tokio::test]
async fn test_submit_pending_job_directly() {
    let farm = Farm::new();
    let job = farm.pending(PRINTER, "a.gcode").await;
    let started = farm.dispatcher.submit_job(PRINTER, &job.id).await.unwrap();
    assert_eq!(started.status, JobStatus::Printing);
    assert_eq!(farm.adapter.upload_count(), 1);
}

#[tokio::test]
async fn test_submit_next_takes_queue_head() {
    let farm = Farm::new();
    let a = farm.queued(PRINTER, "a.gcode").await;
    let started = farm.dispatcher.submit_next(PRINTER).await.unwrap();
    assert_eq!(started.id, a.id);
    let err = farm.dispatcher.submit_next(OTHER_PRINTER).await.unwrap_err();
    assert!(matches!(err, PrintJobError::NotFound(_)));
}

#[tokio::test]
async fn test_adapter_failure_leaves_job_queued() {
    let farm = Farm::new();
    let a = farm.queued(PRINTER, "a.gcode").await;
    let b = farm.queued(PRINTER, "b.gcode").await;
    farm.adapter.set_failing(true);

    let err = farm.dispatcher.submit_job(PRINTER, &b.id).await.unwrap_err();
    assert!(matches!(err, PrintJobError::ExternalService(_)));
    let b_after = farm.job(&b.id).await;
    assert_eq!(b_after, b);
    assert_eq!(farm.queue_ids(PRINTER).await, vec![a.id, b.id]);
    farm.assert_invariants(PRINTER).await;
}

#[tokio::test]
async fn test_submit_without_file_is_rejected_before_upload() {
    let farm = Farm::new();
    let job = farm
        .lifecycle
        .create_pending_job(PRINTER, "nofile.gcode", Default::default())
        .await
        .unwrap();
    let err = farm.dispatcher.submit_job(PRINTER, &job.id).await.unwrap_err();
    assert!(matches!(err, PrintJobError::Validation(_)));

    let missing = farm
        .lifecycle
        .create_job(JobDraft::new(PRINTER, "gone.gcode").with_file_storage_id("gone.gcode"))
        .await
        .unwrap();
    let err = farm.dispatcher.submit_job(PRINTER, &missing.id).await.unwrap_err();
    assert!(matches!(err, PrintJobError::NotFound(_)));
    assert_eq!(farm.adapter.upload_count(), 0);
}

#[tokio::test]
async fn test_submit_rejects_busy_printer_and_bad_states() {
    let farm = Farm::new();
    let missing = farm.dispatcher.submit_job(PRINTER, "missing").await.unwrap_err();
    assert!(matches!(missing, PrintJobError::NotFound(_)));

    let active = farm.lifecycle.mark_started(PRINTER, "running.gcode").await.unwrap();
    let err = farm.dispatcher.submit_job(PRINTER, &active.id).await.unwrap_err();
    assert!(matches!(err, PrintJobError::Conflict(_)));

    let waiting = farm.queued(PRINTER, "next.gcode").await;
    let err = farm.dispatcher.submit_job(PRINTER, &waiting.id).await.unwrap_err();
    assert!(matches!(err, PrintJobError::Conflict(_)));
    assert_eq!(farm.job(&waiting.id).await.status, JobStatus::Queued);

    let foreign = farm.pending(OTHER_PRINTER, "other.gcode").await;
    let err = farm.dispatcher.submit_job(PRINTER, &foreign.id).await.unwrap_err();
    assert!(matches!(err, PrintJobError::Validation(_)));

    farm.lifecycle.set_cancelled(&active.id).await.unwrap();
    let err = farm.dispatcher.submit_job(PRINTER, &active.id).await.unwrap_err();
    assert!(matches!(err, PrintJobError::Validation(_)));
    assert_eq!(farm.adapter.upload_count(), 0);
}

#[tokio::test]
async fn test_job_failed_during_upload_stays_failed() {
    let farm = Arc::new(Farm::new());
    let a = farm.queued(PRINTER, "a.gcode").await;
    let b = farm.queued(PRINTER, "b.gcode").await;

    let submit = submit_in_flight(&farm, &b).await;
    farm.lifecycle.set_failed(&b.id).await.unwrap();
    farm.adapter.release.notify_one();

    let err = submit.await.unwrap().unwrap_err();
    assert!(matches!(err, PrintJobError::Conflict(_)));
    let b = farm.job(&b.id).await;
    assert_eq!(b.status, JobStatus::Failed);
    assert!(b.ended_at.is_some());
    assert_eq!(b.status_reason.as_deref(), Some(REASON_MANUAL_FAILED));
    assert_eq!(farm.queue_ids(PRINTER).await, vec![a.id]);
    farm.assert_invariants(PRINTER).await;
}

#[tokio::test]
async fn test_job_unqueued_during_upload_still_starts() {
    let farm = Arc::new(Farm::new());
    let a = farm.queued(PRINTER, "a.gcode").await;
    let b = farm.queued(PRINTER, "b.gcode").await;
    let c = farm.queued(PRINTER, "c.gcode").await;

    let submit = submit_in_flight(&farm, &a).await;
    farm.queue.remove_from_queue(PRINTER, &a.id).await.unwrap();
    farm.adapter.release.notify_one();

    let started = submit.await.unwrap().unwrap();
    assert_eq!(started.status, JobStatus::Printing);
    assert_eq!(started.queue_position, None);
    assert_eq!(farm.queue_ids(PRINTER).await, vec![b.id, c.id]);
    farm.assert_invariants(PRINTER).await;
}

#[tokio::test]
async fn test_job_started_by_device_during_upload_is_not_restarted() {
    let farm = Arc::new(Farm::new());
    let a = farm.queued(PRINTER, "a.gcode").await;

    let submit = submit_in_flight(&farm, &a).await;
    let running = farm.lifecycle.mark_started(PRINTER, "a.gcode").await.unwrap();
    farm.lifecycle.mark_progress(PRINTER, "a.gcode", 40).await.unwrap();
    farm.adapter.release.notify_one();

    let err = submit.await.unwrap().unwrap_err();
    assert!(matches!(err, PrintJobError::Conflict(_)));
    let a = farm.job(&a.id).await;
    assert_eq!(a.id, running.id);
    assert_eq!(a.status, JobStatus::Printing);
    assert_eq!(a.progress, 40);
    farm.assert_invariants(PRINTER).await;
}
