//! Job definitions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;
use crate::store::Collection;

/// Job Identifier
///
/// UUIDv7 values sort by creation time, so ascending id order is FIFO order.
pub type JobId = Uuid;

/// Generate a fresh, time-ordered job id
pub fn new_job_id() -> JobId {
    Uuid::now_v7()
}

/// Job Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in queue
    Queued,
    /// Claimed by a worker
    Dequeued,
    /// Handler succeeded
    Completed,
    /// Handler failed with no attempts left
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Dequeued,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Dequeued => "dequeued",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// `Dequeued -> Queued` covers both retry scheduling and orphan recovery.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Dequeued)
                | (Self::Dequeued, Self::Completed)
                | (Self::Dequeued, Self::Failed)
                | (Self::Dequeued, Self::Queued)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "dequeued" => Ok(Self::Dequeued),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(QueueError::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

/// Retry backoff strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Wait `attempts.delay` between every attempt
    #[default]
    #[serde(alias = "fixed")]
    Linear,
    /// Double the wait after every failure
    #[serde(alias = "backoff")]
    Exponential,
}

/// Longest wait between two attempts: 100 years.
pub const MAX_RETRY_WAIT_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

impl RetryStrategy {
    /// Wait before the next attempt, given the base delay and how many
    /// failures have happened so far (starting at 1). Capped at
    /// [`MAX_RETRY_WAIT_MS`].
    pub fn wait(&self, delay_ms: u64, failures: u32) -> Duration {
        let ms = match self {
            Self::Linear => delay_ms,
            Self::Exponential => {
                delay_ms.saturating_mul(2_u64.saturating_pow(failures.saturating_sub(1)))
            }
        };
        let ms = ms.min(MAX_RETRY_WAIT_MS);
        Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }
}

impl FromStr for RetryStrategy {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" | "fixed" => Ok(Self::Linear),
            "exponential" | "backoff" => Ok(Self::Exponential),
            other => Err(QueueError::Validation(format!(
                "unknown retry strategy '{other}'"
            ))),
        }
    }
}

/// Retry policy and bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempts {
    /// Total number of runs allowed, including the first
    pub count: u32,
    /// Base wait between attempts in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RetryStrategy>,
    /// Runs left, written by `Job::fail`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

impl Default for Attempts {
    fn default() -> Self {
        Self {
            count: 1,
            delay: None,
            strategy: None,
            remaining: None,
        }
    }
}

impl Attempts {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay_ms: u64, strategy: RetryStrategy) -> Self {
        self.delay = Some(delay_ms);
        self.strategy = Some(strategy);
        self
    }

    /// Record one failure. Returns the wait before the next attempt, or
    /// `None` when the attempts are exhausted.
    fn record_failure(&mut self) -> Option<Duration> {
        let remaining = self.remaining.unwrap_or(self.count).saturating_sub(1);
        self.remaining = Some(remaining);

        if remaining == 0 {
            return None;
        }

        let failures = self.count.saturating_sub(remaining);
        let strategy = self.strategy.unwrap_or_default();
        Some(strategy.wait(self.delay.unwrap_or(0), failures))
    }
}

/// The persisted job document.
///
/// Field names are the on-disk contract other consumers read directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    pub id: JobId,
    /// Handler key
    pub name: String,
    #[serde(default)]
    pub params: Value,
    pub queue: String,
    pub status: JobStatus,
    #[serde(default)]
    pub priority: i64,
    /// Not eligible for dequeue before this instant
    pub delay: DateTime<Utc>,
    /// Lock predicate, stored escaped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default)]
    pub attempts: Attempts,
    /// Advisory execution deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub enqueued: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dequeued: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobDocument {
    /// A queued document with every optional field at its default.
    pub fn new(queue: impl Into<String>, name: impl Into<String>, params: Value) -> Self {
        let now = Utc::now();
        Self {
            id: new_job_id(),
            name: name.into(),
            params,
            queue: queue.into(),
            status: JobStatus::Queued,
            priority: 0,
            delay: now,
            query: None,
            attempts: Attempts::default(),
            timeout: None,
            enqueued: now,
            dequeued: None,
            completed: None,
            failed: None,
            result: None,
            error: None,
        }
    }
}

/// A job bound to the collection it lives in.
///
/// Transition methods write the whole document back and only update the
/// in-memory copy once the store acknowledged the write.
#[derive(Clone)]
pub struct Job {
    collection: Arc<dyn Collection>,
    data: JobDocument,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("data", &self.data).finish()
    }
}

impl Job {
    pub fn new(collection: Arc<dyn Collection>, data: JobDocument) -> Self {
        Self { collection, data }
    }

    pub fn id(&self) -> JobId {
        self.data.id
    }

    pub fn status(&self) -> JobStatus {
        self.data.status
    }

    pub fn data(&self) -> &JobDocument {
        &self.data
    }

    pub fn into_data(self) -> JobDocument {
        self.data
    }

    /// Persist the job as `queued`.
    pub async fn enqueue(&mut self) -> Result<(), QueueError> {
        if self.data.name.trim().is_empty() {
            return Err(QueueError::Validation("job name is required".into()));
        }

        let mut next = self.data.clone();
        next.status = JobStatus::Queued;
        self.collection.insert(&next).await?;

        debug!(job_id = %next.id, queue = %next.queue, name = %next.name, "Job enqueued");
        self.data = next;
        Ok(())
    }

    /// Mark the job completed and record the handler's result.
    pub async fn complete(&mut self, result: Value) -> Result<(), QueueError> {
        self.check_transition(JobStatus::Completed)?;

        let mut next = self.data.clone();
        next.status = JobStatus::Completed;
        next.completed = Some(Utc::now());
        next.result = Some(result);
        self.commit(next).await
    }

    /// Record a failure. Reschedules the job when attempts remain,
    /// otherwise marks it failed for good.
    pub async fn fail(&mut self, error: impl fmt::Display) -> Result<(), QueueError> {
        self.check_transition(JobStatus::Failed)?;

        let mut next = self.data.clone();
        next.error = Some(error.to_string());

        match next.attempts.record_failure() {
            Some(wait) => {
                let now = Utc::now();
                next.status = JobStatus::Queued;
                next.delay = now.checked_add_signed(wait).ok_or_else(|| {
                    QueueError::Validation(format!(
                        "retry wait of {}ms is out of range",
                        wait.num_milliseconds()
                    ))
                })?;
                debug!(
                    job_id = %next.id,
                    remaining = next.attempts.remaining.unwrap_or(0),
                    wait_ms = wait.num_milliseconds(),
                    "Job failed, scheduling retry"
                );
            }
            None => {
                next.status = JobStatus::Failed;
                next.failed = Some(Utc::now());
            }
        }

        self.commit(next).await
    }

    /// Return a claimed job to the queue without touching its attempts.
    pub async fn requeue(&mut self) -> Result<(), QueueError> {
        self.check_transition(JobStatus::Queued)?;

        let mut next = self.data.clone();
        next.status = JobStatus::Queued;
        self.commit(next).await
    }

    fn check_transition(&self, to: JobStatus) -> Result<(), QueueError> {
        if self.data.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(QueueError::InvalidTransition {
                id: self.data.id,
                from: self.data.status,
                to,
            })
        }
    }

    async fn commit(&mut self, next: JobDocument) -> Result<(), QueueError> {
        self.collection.save(&next).await?;
        self.data = next;
        Ok(())
    }
}
