//! The job admission queue.
//!
//! One explicitly constructed [`JobQueue`] handle owns all queue state;
//! there is no ambient singleton. Admission consults the caller-supplied
//! `ValidationResult` and rejects with a [`BlockReason`] in a fixed
//! precedence order. Accepted jobs land in one of four priority buckets;
//! dequeue drains strictly by priority, FIFO within a bucket.
//!
//! All shared state lives behind one mutex and is mutated only through
//! the enqueue/dequeue/complete operations, so per-tier counters cannot
//! race. Nothing awaits while the lock is held.

use crate::error::{AdmissionError, AdmissionResult, ProcessingError};
use crate::job::{BlockReason, Job, JobRequest};
use crate::retry::RetrySchedule;
use chrono::{DateTime, Utc};
use ledgerflow_license::{codes, ValidationResult};
use ledgerflow_types::{JobId, JobPriority, JobState, LicenseTier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the job event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Terminal jobs kept around for observation before being dropped.
const MAX_TERMINAL_JOBS: usize = 1024;

/// Queue behavior knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum retry attempts after the initial execution.
    pub max_retries: u32,
    /// Base retry delay; doubles per attempt.
    pub retry_base_delay_ms: u64,
    /// Per-job processing timeout.
    pub job_timeout_ms: u64,
    /// If set, a retry starting this many seconds after admission must
    /// re-validate the license before executing.
    pub revalidate_after_secs: Option<i64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            job_timeout_ms: 120_000,
            revalidate_after_secs: None,
        }
    }
}

/// Typed lifecycle event published for external observers.
///
/// The queue publishes, subscribers (UI, logs) consume; neither side
/// depends on the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    /// A job was admitted into a priority bucket.
    Added {
        /// The admitted job.
        id: JobId,
        /// Bucket it landed in.
        priority: JobPriority,
    },
    /// A worker slot started processing the job.
    Started {
        /// The job being processed.
        id: JobId,
    },
    /// The job finished successfully.
    Completed {
        /// The finished job.
        id: JobId,
    },
    /// The job failed terminally (retries exhausted or suppressed).
    Failed {
        /// The failed job.
        id: JobId,
        /// Human-readable failure description.
        reason: String,
    },
    /// A submission or pending job was blocked. `id` is absent when the
    /// submission was rejected before a job record existed.
    Blocked {
        /// The blocked job, if one was created.
        id: Option<JobId>,
        /// Why it was blocked.
        reason: BlockReason,
    },
}

#[derive(Debug, Default)]
struct QueueInner {
    buckets: [VecDeque<Job>; 4],
    processing: HashMap<JobId, Job>,
    processing_per_tier: HashMap<LicenseTier, u32>,
    retries: RetrySchedule,
    cancelled: HashSet<JobId>,
    terminal: BTreeMap<JobId, Job>,
    accepting: bool,
}

impl QueueInner {
    fn new() -> Self {
        Self {
            accepting: true,
            ..Self::default()
        }
    }

    fn bucket_mut(&mut self, priority: JobPriority) -> &mut VecDeque<Job> {
        let idx = JobPriority::DRAIN_ORDER
            .iter()
            .position(|p| *p == priority)
            .unwrap_or(JobPriority::DRAIN_ORDER.len() - 1);
        &mut self.buckets[idx]
    }

    fn at_capacity(&self, tier: LicenseTier) -> bool {
        match tier.concurrency_limit() {
            None => false,
            Some(limit) => {
                self.processing_per_tier.get(&tier).copied().unwrap_or(0) >= limit
            }
        }
    }

    fn inc_processing(&mut self, tier: LicenseTier) {
        *self.processing_per_tier.entry(tier).or_insert(0) += 1;
    }

    fn dec_processing(&mut self, tier: LicenseTier) {
        if let Some(count) = self.processing_per_tier.get_mut(&tier) {
            *count = count.saturating_sub(1);
        }
    }

    fn archive(&mut self, job: Job) {
        self.terminal.insert(job.id, job);
        while self.terminal.len() > MAX_TERMINAL_JOBS {
            self.terminal.pop_first();
        }
    }

    fn pending_len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum::<usize>() + self.retries.len()
    }
}

/// The process-wide job admission queue. Explicitly owned and passed to
/// callers; construct one per application.
pub struct JobQueue {
    config: QueueConfig,
    inner: Mutex<QueueInner>,
    events: broadcast::Sender<JobEvent>,
}

impl JobQueue {
    /// Creates a queue with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Creates a queue with the given configuration.
    #[must_use]
    pub fn with_config(config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            inner: Mutex::new(QueueInner::new()),
            events,
        }
    }

    /// The queue configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Subscribes to job lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Submits one job. Accepted jobs wait in their priority bucket until
    /// a worker slot frees up.
    pub fn enqueue(
        &self,
        request: JobRequest,
        validation: &ValidationResult,
    ) -> AdmissionResult<JobId> {
        self.enqueue_at(request, validation, Utc::now())
    }

    /// Submits one job with an explicit admission time.
    pub fn enqueue_at(
        &self,
        request: JobRequest,
        validation: &ValidationResult,
        now: DateTime<Utc>,
    ) -> AdmissionResult<JobId> {
        let mut inner = self.lock();
        let tier = self.admission_checks(&inner, std::slice::from_ref(&request), validation)?;
        Ok(self.admit(&mut inner, request, tier, now))
    }

    /// Submits one job that must be admitted against a free processing
    /// slot right now; fails with `RateLimitExceeded` when the tier's
    /// concurrency ceiling is fully in use.
    pub fn enqueue_immediate(
        &self,
        request: JobRequest,
        validation: &ValidationResult,
    ) -> AdmissionResult<JobId> {
        let now = Utc::now();
        let mut inner = self.lock();
        let tier = self.admission_checks(&inner, std::slice::from_ref(&request), validation)?;
        if inner.at_capacity(tier) {
            // Ceiling is Some here, otherwise at_capacity is false.
            let limit = tier.concurrency_limit().unwrap_or(0);
            return Err(self.reject(BlockReason::RateLimitExceeded { limit }));
        }
        Ok(self.admit(&mut inner, request, tier, now))
    }

    /// Submits a batch atomically: if the batch exceeds the tier's batch
    /// ceiling (or any other admission check fails), none of it is
    /// admitted.
    pub fn enqueue_batch(
        &self,
        requests: Vec<JobRequest>,
        validation: &ValidationResult,
    ) -> AdmissionResult<Vec<JobId>> {
        self.enqueue_batch_at(requests, validation, Utc::now())
    }

    /// Submits a batch with an explicit admission time.
    pub fn enqueue_batch_at(
        &self,
        requests: Vec<JobRequest>,
        validation: &ValidationResult,
        now: DateTime<Utc>,
    ) -> AdmissionResult<Vec<JobId>> {
        let mut inner = self.lock();
        let tier = self.admission_checks(&inner, &requests, validation)?;
        let limit = tier.batch_limit();
        if requests.len() > limit as usize {
            return Err(self.reject(BlockReason::BatchSizeExceeded {
                submitted: requests.len(),
                limit,
            }));
        }
        let ids = requests
            .into_iter()
            .map(|request| self.admit(&mut inner, request, tier, now))
            .collect();
        Ok(ids)
    }

    /// Takes the next job to process: strict priority across buckets,
    /// FIFO within a bucket, skipping buckets whose front job belongs to
    /// a tier at its concurrency ceiling.
    pub fn dequeue(&self) -> Option<Job> {
        let mut inner = self.lock();
        let mut picked = None;
        for idx in 0..inner.buckets.len() {
            let front_tier = match inner.buckets[idx].front() {
                Some(job) => job.tier_at_submission,
                None => continue,
            };
            if inner.at_capacity(front_tier) {
                continue;
            }
            picked = inner.buckets[idx].pop_front();
            break;
        }
        let mut job = picked?;
        job.state = JobState::Processing;
        job.started_at = Some(Utc::now());
        inner.inc_processing(job.tier_at_submission);
        inner.processing.insert(job.id, job.clone());
        self.emit(JobEvent::Started { id: job.id });
        Some(job)
    }

    /// Marks a processing job as completed.
    pub fn complete(&self, id: JobId) {
        let mut inner = self.lock();
        let Some(mut job) = inner.processing.remove(&id) else {
            warn!(%id, "complete() for a job that is not processing");
            return;
        };
        inner.dec_processing(job.tier_at_submission);
        inner.cancelled.remove(&id);
        job.state = JobState::Completed;
        job.completed_at = Some(Utc::now());
        debug!(%id, kind = %job.payload.kind, "job completed");
        inner.archive(job);
        self.emit(JobEvent::Completed { id });
    }

    /// Records a failed attempt. The job is scheduled for retry with
    /// exponential backoff until the retry budget is exhausted (or its
    /// retry was suppressed by `cancel`), then marked `Failed`.
    pub fn fail(&self, id: JobId, error: &ProcessingError) {
        let now = Utc::now();
        let mut inner = self.lock();
        let Some(mut job) = inner.processing.remove(&id) else {
            warn!(%id, "fail() for a job that is not processing");
            return;
        };
        inner.dec_processing(job.tier_at_submission);

        let retry_suppressed = inner.cancelled.remove(&id);
        if !retry_suppressed && job.retry_count < self.config.max_retries {
            job.retry_count += 1;
            job.state = JobState::Pending;
            debug!(%id, attempt = job.retry_count, error = %error, "scheduling retry");
            inner
                .retries
                .schedule(job, self.config.retry_base_delay_ms, now);
            return;
        }

        let reason = if retry_suppressed {
            error.to_string()
        } else {
            ProcessingError::RetriesExhausted {
                attempts: job.retry_count + 1,
                last_error: error.to_string(),
            }
            .to_string()
        };
        job.state = JobState::Failed;
        job.completed_at = Some(now);
        warn!(%id, %reason, "job failed");
        inner.archive(job);
        self.emit(JobEvent::Failed { id, reason });
    }

    /// Re-queues retries whose backoff delay has elapsed. Returns the
    /// number of jobs released. Called from the worker scheduler tick —
    /// never from a timer sleep loop.
    pub fn tick_retries(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.lock();
        if !inner.accepting {
            // Shutdown will drain the schedule into Blocked.
            return 0;
        }
        let due = inner.retries.take_due(now);
        let released = due.len();
        for job in due {
            inner.bucket_mut(job.priority).push_back(job);
        }
        released
    }

    /// Cancels a job. Pending jobs are removed outright; for a processing
    /// job only the future retry is suppressed, not the in-flight
    /// execution. Returns false if the job is unknown or already terminal.
    pub fn cancel(&self, id: JobId) -> bool {
        let mut inner = self.lock();
        for priority in JobPriority::DRAIN_ORDER {
            let bucket = inner.bucket_mut(priority);
            if let Some(pos) = bucket.iter().position(|job| job.id == id) {
                bucket.remove(pos);
                debug!(%id, "pending job cancelled");
                return true;
            }
        }
        if inner.retries.remove(id).is_some() {
            debug!(%id, "scheduled retry cancelled");
            return true;
        }
        if inner.processing.contains_key(&id) {
            debug!(%id, "retry suppressed for processing job");
            inner.cancelled.insert(id);
            return true;
        }
        false
    }

    /// Blocks a processing job terminally (revalidation failure path).
    pub fn block_processing(&self, id: JobId, reason: BlockReason) {
        let mut inner = self.lock();
        let Some(mut job) = inner.processing.remove(&id) else {
            warn!(%id, "block_processing() for a job that is not processing");
            return;
        };
        inner.dec_processing(job.tier_at_submission);
        job.state = JobState::Blocked;
        job.block_reason = Some(reason.clone());
        job.completed_at = Some(Utc::now());
        inner.archive(job);
        self.emit(JobEvent::Blocked {
            id: Some(id),
            reason,
        });
    }

    /// Stops accepting new submissions.
    pub fn close_intake(&self) {
        let mut inner = self.lock();
        if inner.accepting {
            info!("job intake closed");
            inner.accepting = false;
        }
    }

    /// Whether new submissions are accepted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    /// Transitions every remaining pending job (buckets and scheduled
    /// retries) to terminal `Blocked(ShutdownRequested)`. Returns how
    /// many jobs were blocked.
    pub fn drain_pending_to_blocked(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.lock();
        let mut drained: Vec<Job> = Vec::new();
        for bucket in &mut inner.buckets {
            drained.extend(bucket.drain(..));
        }
        drained.extend(inner.retries.drain_all());
        let count = drained.len();
        for mut job in drained {
            job.state = JobState::Blocked;
            job.block_reason = Some(BlockReason::ShutdownRequested);
            job.completed_at = Some(now);
            let id = job.id;
            inner.archive(job);
            self.emit(JobEvent::Blocked {
                id: Some(id),
                reason: BlockReason::ShutdownRequested,
            });
        }
        if count > 0 {
            info!(count, "pending jobs blocked by shutdown");
        }
        count
    }

    /// Number of jobs waiting (buckets plus scheduled retries).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending_len()
    }

    /// Number of jobs currently processing.
    #[must_use]
    pub fn processing_len(&self) -> usize {
        self.lock().processing.len()
    }

    /// Snapshot of a job in any non-observed state.
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<Job> {
        let mut inner = self.lock();
        if let Some(job) = inner.processing.get(&id) {
            return Some(job.clone());
        }
        if let Some(job) = inner.terminal.get(&id) {
            return Some(job.clone());
        }
        if let Some(job) = inner.retries.get(id) {
            return Some(job.clone());
        }
        for priority in JobPriority::DRAIN_ORDER {
            if let Some(job) = inner.bucket_mut(priority).iter().find(|job| job.id == id) {
                return Some(job.clone());
            }
        }
        None
    }

    /// Takes a terminal job out of the queue, marking it observed. The
    /// record is dropped afterwards.
    pub fn take_terminal(&self, id: JobId) -> Option<Job> {
        self.lock().terminal.remove(&id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().expect("job queue mutex poisoned")
    }

    fn emit(&self, event: JobEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn reject(&self, reason: BlockReason) -> AdmissionError {
        debug!(code = reason.code(), "submission blocked");
        self.emit(JobEvent::Blocked {
            id: None,
            reason: reason.clone(),
        });
        AdmissionError::Blocked(reason)
    }

    fn admit(
        &self,
        inner: &mut QueueInner,
        request: JobRequest,
        tier: LicenseTier,
        now: DateTime<Utc>,
    ) -> JobId {
        let job = Job::admitted(request, tier, now);
        let id = job.id;
        let priority = job.priority;
        inner.bucket_mut(priority).push_back(job);
        self.emit(JobEvent::Added { id, priority });
        id
    }

    /// License and feature checks shared by every submission path, in
    /// precedence order. Returns the tier to admit under.
    fn admission_checks(
        &self,
        inner: &QueueInner,
        requests: &[JobRequest],
        validation: &ValidationResult,
    ) -> Result<LicenseTier, AdmissionError> {
        if !inner.accepting {
            return Err(self.reject(BlockReason::ShutdownRequested));
        }
        if let Some(reason) = license_block(validation) {
            return Err(self.reject(reason));
        }
        let Some(tier) = validation.tier else {
            return Err(self.reject(BlockReason::NoLicense));
        };
        for request in requests {
            if let Some(feature) = &request.payload.required_feature {
                if !validation.has_feature(feature) {
                    return Err(self.reject(BlockReason::FeatureNotAvailable {
                        feature: feature.clone(),
                    }));
                }
            }
        }
        Ok(tier)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps an invalid validation result onto its admission block reason.
fn license_block(validation: &ValidationResult) -> Option<BlockReason> {
    if validation.valid {
        return None;
    }
    let reason = match validation.error_code.as_deref() {
        Some(codes::LICENSE_REVOKED) => BlockReason::LicenseRevoked,
        Some(codes::LICENSE_SUSPENDED) => BlockReason::LicenseSuspended,
        Some(codes::LICENSE_EXPIRED)
        | Some(codes::TOKEN_EXPIRED)
        | Some(codes::OFFLINE_GRACE_EXPIRED) => BlockReason::LicenseExpired,
        _ => BlockReason::NoLicense,
    };
    Some(reason)
}
