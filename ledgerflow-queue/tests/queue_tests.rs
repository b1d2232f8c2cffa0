//! Admission, ordering, and capacity behavior of the job queue.

mod common;

use chrono::{Duration, Utc};
use common::{feature_request, invalid_result, request, valid_result};
use ledgerflow_license::codes;
use ledgerflow_queue::{
    AdmissionError, BlockReason, JobEvent, JobPriority, JobQueue, JobState, LicenseTier,
    ProcessingError, QueueConfig,
};
use pretty_assertions::assert_eq;

fn blocked_reason(err: AdmissionError) -> BlockReason {
    let AdmissionError::Blocked(reason) = err;
    reason
}

// ── Priority ordering ──

#[test]
fn drains_strict_priority_order() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Enterprise);

    let submitted = [
        JobPriority::Low,
        JobPriority::High,
        JobPriority::Critical,
        JobPriority::Normal,
    ];
    for priority in submitted {
        queue.enqueue(request(priority), &validation).unwrap();
    }

    let drained: Vec<JobPriority> = std::iter::from_fn(|| queue.dequeue())
        .map(|job| job.priority)
        .collect();
    assert_eq!(
        drained,
        vec![
            JobPriority::Critical,
            JobPriority::High,
            JobPriority::Normal,
            JobPriority::Low,
        ]
    );
}

#[test]
fn fifo_within_a_priority() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Enterprise);

    let first = queue.enqueue(request(JobPriority::Normal), &validation).unwrap();
    let second = queue.enqueue(request(JobPriority::Normal), &validation).unwrap();

    assert_eq!(queue.dequeue().unwrap().id, first);
    assert_eq!(queue.dequeue().unwrap().id, second);
}

// ── License admission ──

#[test]
fn revoked_license_blocks_submission() {
    let queue = JobQueue::new();
    let validation = invalid_result(codes::LICENSE_REVOKED);

    let err = queue.enqueue(request(JobPriority::Normal), &validation).unwrap_err();
    assert_eq!(blocked_reason(err), BlockReason::LicenseRevoked);
    assert_eq!(queue.pending_len(), 0);
}

#[test]
fn suspended_and_expired_map_to_their_reasons() {
    let queue = JobQueue::new();

    let err = queue
        .enqueue(request(JobPriority::Normal), &invalid_result(codes::LICENSE_SUSPENDED))
        .unwrap_err();
    assert_eq!(blocked_reason(err), BlockReason::LicenseSuspended);

    for code in [
        codes::LICENSE_EXPIRED,
        codes::TOKEN_EXPIRED,
        codes::OFFLINE_GRACE_EXPIRED,
    ] {
        let err = queue
            .enqueue(request(JobPriority::Normal), &invalid_result(code))
            .unwrap_err();
        assert_eq!(blocked_reason(err), BlockReason::LicenseExpired);
    }

    let err = queue
        .enqueue(request(JobPriority::Normal), &invalid_result(codes::NO_CACHED_LICENSE))
        .unwrap_err();
    assert_eq!(blocked_reason(err), BlockReason::NoLicense);
}

#[test]
fn license_state_outranks_missing_feature() {
    let queue = JobQueue::new();
    // Request needs a feature the tier lacks AND the license is revoked;
    // the license verdict must win.
    let err = queue
        .enqueue(feature_request("api-access"), &invalid_result(codes::LICENSE_REVOKED))
        .unwrap_err();
    assert_eq!(blocked_reason(err), BlockReason::LicenseRevoked);
}

#[test]
fn missing_feature_blocks_submission() {
    let queue = JobQueue::new();
    // api-access is Enterprise-only.
    let validation = valid_result(LicenseTier::Standard);

    let err = queue.enqueue(feature_request("api-access"), &validation).unwrap_err();
    assert_eq!(
        blocked_reason(err),
        BlockReason::FeatureNotAvailable {
            feature: "api-access".into(),
        }
    );

    let granted = valid_result(LicenseTier::Enterprise);
    assert!(queue.enqueue(feature_request("api-access"), &granted).is_ok());
}

// ── Batch admission ──

#[test]
fn oversized_batch_is_rejected_atomically() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Standard);

    let batch: Vec<_> = (0..30).map(|_| request(JobPriority::Normal)).collect();
    let err = queue.enqueue_batch(batch, &validation).unwrap_err();
    assert_eq!(
        blocked_reason(err),
        BlockReason::BatchSizeExceeded {
            submitted: 30,
            limit: 25,
        }
    );
    assert_eq!(queue.pending_len(), 0);

    let batch: Vec<_> = (0..25).map(|_| request(JobPriority::Normal)).collect();
    let ids = queue.enqueue_batch(batch, &validation).unwrap();
    assert_eq!(ids.len(), 25);
    assert_eq!(queue.pending_len(), 25);
}

// ── Concurrency ceiling ──

#[test]
fn batch_beyond_ceiling_waits_pending() {
    let queue = JobQueue::new();
    // Standard: ceiling 3, batch limit 25.
    let validation = valid_result(LicenseTier::Standard);

    let batch: Vec<_> = (0..10).map(|_| request(JobPriority::Normal)).collect();
    queue.enqueue_batch(batch, &validation).unwrap();

    let mut running = Vec::new();
    for _ in 0..3 {
        running.push(queue.dequeue().unwrap());
    }
    // Ceiling reached: nothing more dequeues, the rest stays Pending.
    assert!(queue.dequeue().is_none());
    assert_eq!(queue.processing_len(), 3);
    assert_eq!(queue.pending_len(), 7);

    // A freed slot releases exactly one more.
    queue.complete(running[0].id);
    assert!(queue.dequeue().is_some());
    assert!(queue.dequeue().is_none());
    assert_eq!(queue.pending_len(), 6);
}

#[test]
fn slot_freed_by_completion_releases_next_job() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Trial);

    queue.enqueue(request(JobPriority::Normal), &validation).unwrap();
    queue.enqueue(request(JobPriority::Normal), &validation).unwrap();

    let first = queue.dequeue().unwrap();
    assert!(queue.dequeue().is_none());

    queue.complete(first.id);
    assert!(queue.dequeue().is_some());
}

#[test]
fn immediate_admission_respects_ceiling() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Trial);

    let first = queue.enqueue(request(JobPriority::Normal), &validation).unwrap();
    queue.dequeue().unwrap();

    let err = queue
        .enqueue_immediate(request(JobPriority::High), &validation)
        .unwrap_err();
    assert_eq!(blocked_reason(err), BlockReason::RateLimitExceeded { limit: 1 });

    queue.complete(first);
    assert!(queue.enqueue_immediate(request(JobPriority::High), &validation).is_ok());
}

// ── Tier frozen at submission ──

#[test]
fn tier_entitlements_freeze_at_submission() {
    let queue = JobQueue::new();

    let id = queue
        .enqueue(request(JobPriority::Normal), &valid_result(LicenseTier::Professional))
        .unwrap();
    // A later submission under a different tier does not rewrite history.
    queue
        .enqueue(request(JobPriority::Normal), &valid_result(LicenseTier::Trial))
        .unwrap();

    let job = queue.job(id).unwrap();
    assert_eq!(job.tier_at_submission, LicenseTier::Professional);
}

// ── Retry scheduling ──

#[test]
fn failed_job_retries_after_backoff() {
    let queue = JobQueue::with_config(QueueConfig {
        max_retries: 1,
        retry_base_delay_ms: 60_000,
        ..QueueConfig::default()
    });
    let validation = valid_result(LicenseTier::Enterprise);

    let id = queue.enqueue(request(JobPriority::Normal), &validation).unwrap();
    queue.dequeue().unwrap();
    queue.fail(id, &ProcessingError::Execution("transient".into()));

    // Not due yet.
    assert_eq!(queue.tick_retries(Utc::now()), 0);
    assert!(queue.dequeue().is_none());

    // Past the backoff the retry is released as Pending.
    assert_eq!(queue.tick_retries(Utc::now() + Duration::minutes(2)), 1);
    let retried = queue.dequeue().unwrap();
    assert_eq!(retried.id, id);
    assert_eq!(retried.retry_count, 1);

    // Budget spent: the next failure is terminal.
    queue.fail(id, &ProcessingError::Execution("still broken".into()));
    let job = queue.job(id).unwrap();
    assert_eq!(job.state, JobState::Failed);
}

// ── Cancellation ──

#[test]
fn cancel_removes_pending_job() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Standard);

    let id = queue.enqueue(request(JobPriority::Normal), &validation).unwrap();
    assert!(queue.cancel(id));
    assert_eq!(queue.pending_len(), 0);
    assert!(!queue.cancel(id));
}

#[test]
fn cancel_suppresses_retry_of_processing_job() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Standard);

    let id = queue.enqueue(request(JobPriority::Normal), &validation).unwrap();
    queue.dequeue().unwrap();
    assert!(queue.cancel(id));

    queue.fail(id, &ProcessingError::Execution("interrupted".into()));
    let job = queue.job(id).unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(queue.pending_len(), 0);
}

// ── Shutdown ──

#[test]
fn closed_intake_blocks_new_submissions() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Standard);

    queue.close_intake();
    let err = queue.enqueue(request(JobPriority::Normal), &validation).unwrap_err();
    assert_eq!(blocked_reason(err), BlockReason::ShutdownRequested);
}

#[test]
fn drain_marks_pending_jobs_blocked() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Standard);

    let ids: Vec<_> = (0..3)
        .map(|_| queue.enqueue(request(JobPriority::Normal), &validation).unwrap())
        .collect();
    queue.close_intake();
    assert_eq!(queue.drain_pending_to_blocked(), 3);

    for id in ids {
        let job = queue.take_terminal(id).unwrap();
        assert_eq!(job.state, JobState::Blocked);
        assert_eq!(job.block_reason, Some(BlockReason::ShutdownRequested));
    }
}

// ── Events ──

#[test]
fn lifecycle_events_are_published_in_order() {
    let queue = JobQueue::new();
    let mut events = queue.subscribe();
    let validation = valid_result(LicenseTier::Standard);

    let id = queue.enqueue(request(JobPriority::High), &validation).unwrap();
    queue.dequeue().unwrap();
    queue.complete(id);

    assert_eq!(
        events.try_recv().unwrap(),
        JobEvent::Added {
            id,
            priority: JobPriority::High,
        }
    );
    assert_eq!(events.try_recv().unwrap(), JobEvent::Started { id });
    assert_eq!(events.try_recv().unwrap(), JobEvent::Completed { id });
}

#[test]
fn blocked_submission_publishes_event_without_id() {
    let queue = JobQueue::new();
    let mut events = queue.subscribe();

    let _ = queue.enqueue(request(JobPriority::Normal), &invalid_result(codes::LICENSE_REVOKED));

    assert_eq!(
        events.try_recv().unwrap(),
        JobEvent::Blocked {
            id: None,
            reason: BlockReason::LicenseRevoked,
        }
    );
}

// ── Terminal observation ──

#[test]
fn terminal_job_is_dropped_once_observed() {
    let queue = JobQueue::new();
    let validation = valid_result(LicenseTier::Standard);

    let id = queue.enqueue(request(JobPriority::Normal), &validation).unwrap();
    queue.dequeue().unwrap();
    queue.complete(id);

    let job = queue.take_terminal(id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(job.completed_at.is_some());
    assert!(queue.job(id).is_none());
}
