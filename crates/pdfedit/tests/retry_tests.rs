//! Retry and backoff behaviour of the job executor against a real queue.

mod common;

use std::sync::Arc;

use common::{FlakyTransform, TestHarness};
use pdfedit::{JobOutcome, JobStatus};

fn harness_with_failures(failures: u32) -> (TestHarness, Arc<FlakyTransform>) {
    let transform = Arc::new(FlakyTransform::new(failures));
    let harness = TestHarness::with_transform(transform.clone());
    (harness, transform)
}

#[test]
fn test_exhausted_retries_fail_with_retry_count() {
    let (harness, transform) = harness_with_failures(3);
    let job_id = harness.submit_pdf(3);
    harness.service.request_processing(&job_id, &[1]).unwrap();

    let outcomes = harness.drain();

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0], JobOutcome::Retrying { .. }));
    assert!(matches!(outcomes[1], JobOutcome::Retrying { .. }));
    assert!(matches!(outcomes[2], JobOutcome::Failed(_)));
    assert_eq!(transform.remove_calls(), 3);

    let record = harness.store_record(&job_id);
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 3);
    let error = record.error.unwrap();
    assert!(error.contains("after 3 attempts"), "{}", error);
    assert!(error.contains("simulated write failure"), "{}", error);
}

#[test]
fn test_two_failures_then_success() {
    let (harness, transform) = harness_with_failures(2);
    let job_id = harness.submit_pdf(4);
    harness.service.request_processing(&job_id, &[2, 3]).unwrap();

    let outcomes = harness.drain();

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes.last(), Some(JobOutcome::Completed(_))));
    assert_eq!(transform.remove_calls(), 3);

    let status = harness.service.get_status(&job_id).unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.pages_kept, Some(2));
    assert_eq!(status.pages_deleted, Some(2));
    assert_eq!(status.error, None);
    assert_eq!(harness.store_record(&job_id).retry_count, 2);
}

#[test]
fn test_retrying_status_is_visible_between_attempts() {
    let (harness, _transform) = harness_with_failures(1);
    let job_id = harness.submit_pdf(2);
    let ticket = harness.service.request_processing(&job_id, &[1]).unwrap();

    let first = harness.run_next().expect("nothing queued");
    let JobOutcome::Retrying { record, delay } = first else {
        panic!("expected a retry, got {:?}", first);
    };
    assert_eq!(delay, std::time::Duration::ZERO);
    // The retry message replaces the original dispatch.
    assert_ne!(record.worker_ref, ticket.worker_ref);

    let status = harness.service.get_status(&job_id).unwrap();
    assert_eq!(status.status, JobStatus::Retrying);
    assert_eq!(status.retry_count, Some(1));
    assert!(status.error.unwrap().contains("simulated write failure"));

    harness.drain();
    assert_eq!(
        harness.service.get_status(&job_id).unwrap().status,
        JobStatus::Completed
    );
}

#[test]
fn test_single_attempt_policy() {
    let transform = Arc::new(FlakyTransform::new(1));
    let harness = TestHarness::build(|b| b.max_attempts(1), transform);
    let job_id = harness.submit_pdf(2);
    harness.service.request_processing(&job_id, &[1]).unwrap();

    let outcomes = harness.drain();

    assert_eq!(outcomes.len(), 1);
    let record = harness.store_record(&job_id);
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 1);
}

#[test]
fn test_input_error_is_not_retried() {
    let (harness, transform) = harness_with_failures(0);
    let job_id = harness.submit_pdf(2);
    harness.service.request_processing(&job_id, &[3]).unwrap();

    let outcomes = harness.drain();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(transform.remove_calls(), 1);
    let record = harness.store_record(&job_id);
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 0);
}
