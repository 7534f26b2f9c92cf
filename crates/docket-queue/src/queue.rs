//! Named queues over a shared job collection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};
use crate::escape::{escape, is_empty_predicate, unescape};
use crate::job::{Attempts, Job, JobDocument, JobId, JobStatus, RetryStrategy};
use crate::store::{Collection, Database, JobFilter, JobUpdate};

pub const DEFAULT_QUEUE: &str = "default";
pub const DEFAULT_COLLECTION: &str = "jobs";

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Collection holding the job documents
    pub collection: String,
    /// Ignore queue-name scoping on `get` and `dequeue`
    pub universal: bool,
    /// Ask the store to create its indexes when the queue is opened
    pub index: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            universal: false,
            index: true,
        }
    }
}

impl QueueConfig {
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn universal(mut self, universal: bool) -> Self {
        self.universal = universal;
        self
    }

    pub fn with_index(mut self, index: bool) -> Self {
        self.index = index;
        self
    }
}

/// Options accepted by [`Queue::enqueue`].
///
/// `query`, `attempts` and `timeout` are loosely typed so producers can pass
/// through whatever JSON they received; they are validated before any I/O.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnqueueOptions {
    /// Lock predicate (must be a JSON object)
    pub query: Option<Value>,
    /// `{count, delay?, strategy?}`
    pub attempts: Option<Value>,
    /// Milliseconds, as a number or numeric string
    pub timeout: Option<Value>,
    pub delay: Option<DateTime<Utc>>,
    pub priority: Option<i64>,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_attempts(mut self, attempts: impl Into<Value>) -> Self {
        self.attempts = Some(attempts.into());
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(Value::from(timeout_ms));
        self
    }

    pub fn with_delay(mut self, delay: DateTime<Utc>) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }
}

impl From<Attempts> for Value {
    fn from(attempts: Attempts) -> Self {
        let mut obj = Map::new();
        obj.insert("count".into(), Value::from(attempts.count));
        if let Some(delay) = attempts.delay {
            obj.insert("delay".into(), Value::from(delay));
        }
        if let Some(strategy) = attempts.strategy {
            let name = match strategy {
                RetryStrategy::Linear => "linear",
                RetryStrategy::Exponential => "exponential",
            };
            obj.insert("strategy".into(), Value::from(name));
        }
        Value::Object(obj)
    }
}

/// Options accepted by [`Queue::dequeue`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DequeueOptions {
    pub min_priority: Option<i64>,
    /// Restrict eligible jobs to these names, usually the registered handlers
    pub names: Option<Vec<String>>,
}

/// Per-status job counts for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: u64,
    pub dequeued: u64,
    pub completed: u64,
    pub failed: u64,
}

/// A named partition of a job collection
#[derive(Clone, Debug)]
pub struct Queue {
    name: String,
    config: QueueConfig,
    collection: Arc<dyn Collection>,
}

impl Queue {
    /// Bind a queue to an already opened collection. No I/O.
    pub fn new(
        collection: Arc<dyn Collection>,
        name: impl Into<String>,
        config: QueueConfig,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            collection,
        }
    }

    /// Open the configured collection and, unless disabled, its indexes
    pub async fn open(
        database: &dyn Database,
        name: impl Into<String>,
        config: QueueConfig,
    ) -> QueueResult<Self> {
        let collection = database.collection(&config.collection).await?;
        if config.index {
            collection.ensure_indexes().await?;
        }

        let queue = Self::new(collection, name, config);
        info!(
            queue = %queue.name,
            collection = %queue.config.collection,
            universal = queue.config.universal,
            backend = database.name(),
            "Queue ready"
        );
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    /// Wrap a document as a job bound to this queue's collection
    pub fn job(&self, data: JobDocument) -> Job {
        Job::new(self.collection.clone(), data)
    }

    /// Fetch a job by id; `None` when absent or owned by another queue
    pub async fn get(&self, id: JobId) -> QueueResult<Option<Job>> {
        let mut filter = JobFilter::by_id(id);
        if !self.config.universal {
            filter.queue = Some(self.name.clone());
        }

        let doc = self.collection.find_one(&filter).await?;
        Ok(doc.map(|d| self.job(d)))
    }

    /// Validate options, build the job document and persist it as `queued`
    pub async fn enqueue(
        &self,
        name: impl Into<String>,
        params: Value,
        options: EnqueueOptions,
    ) -> QueueResult<Job> {
        let query = options.query.as_ref().map(parse_query).transpose()?;
        let attempts = options.attempts.as_ref().map(parse_attempts).transpose()?;
        let timeout = options.timeout.as_ref().map(parse_timeout).transpose()?;

        let mut doc = JobDocument::new(self.name.clone(), name, params);
        doc.query = query;
        doc.attempts = attempts.unwrap_or_default();
        doc.timeout = timeout;
        if let Some(delay) = options.delay {
            doc.delay = delay;
        }
        if let Some(priority) = options.priority {
            doc.priority = priority;
        }

        let mut job = self.job(doc);
        job.enqueue().await?;
        Ok(job)
    }

    /// Atomically claim the next eligible job.
    ///
    /// Jobs whose lock predicate equals that of a job currently dequeued are
    /// skipped. The lock set is read before the claim, not inside it, so two
    /// queues racing on the same collection can still both claim a pair of
    /// conflicting jobs.
    pub async fn dequeue(&self, options: &DequeueOptions) -> QueueResult<Option<Job>> {
        let locked = self.locked_queries().await?;
        let now = Utc::now();

        let filter = JobFilter {
            status: Some(JobStatus::Queued),
            delay_before: Some(now),
            queue: (!self.config.universal).then(|| self.name.clone()),
            min_priority: options.min_priority,
            names: options.names.clone(),
            exclude_queries: locked.iter().map(escape).collect(),
            ..Default::default()
        };

        let claimed = self
            .collection
            .claim(&filter, &JobUpdate::dequeue(now))
            .await?;

        match claimed {
            Some(doc) => {
                debug!(
                    job_id = %doc.id,
                    queue = %self.name,
                    name = %doc.name,
                    priority = doc.priority,
                    "Job dequeued"
                );
                Ok(Some(self.job(doc)))
            }
            None => Ok(None),
        }
    }

    /// Distinct, non-empty lock predicates of every job currently dequeued
    /// in the collection, unescaped
    pub async fn locked_queries(&self) -> QueueResult<Vec<Value>> {
        let in_flight = self
            .collection
            .find(&JobFilter::with_status(JobStatus::Dequeued))
            .await?;

        let mut locked: Vec<Value> = Vec::new();
        for query in in_flight.iter().filter_map(|d| d.query.as_ref()) {
            let query = unescape(query);
            if !is_empty_predicate(&query) && !locked.contains(&query) {
                locked.push(query);
            }
        }
        Ok(locked)
    }

    /// Return this queue's `dequeued` jobs to `queued`.
    ///
    /// Always scoped to the queue's own name, even for universal queues, so a
    /// worker never steals back jobs claimed from queues it does not own.
    pub async fn requeue_dequeued(&self) -> QueueResult<u64> {
        let filter = JobFilter::with_status(JobStatus::Dequeued).queue(self.name.clone());
        let recovered = self
            .collection
            .update_many(&filter, &JobUpdate::requeue())
            .await?;

        if recovered > 0 {
            info!(queue = %self.name, recovered, "Returned orphaned jobs to queue");
        }
        Ok(recovered)
    }

    pub async fn stats(&self) -> QueueResult<QueueStats> {
        let mut stats = QueueStats::default();
        for status in JobStatus::ALL {
            let filter = JobFilter::with_status(status).queue(self.name.clone());
            let count = self.collection.count(&filter).await?;
            match status {
                JobStatus::Queued => stats.queued = count,
                JobStatus::Dequeued => stats.dequeued = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}

/// Integer parse with the leniency producers expect: numbers are truncated,
/// strings may carry surrounding whitespace and trailing garbage ("30s").
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim_start();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

fn parse_non_negative(value: &Value, field: &str) -> QueueResult<u64> {
    parse_integer(value)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| QueueError::Validation(format!("{field} must be a non-negative integer")))
}

fn parse_attempts(value: &Value) -> QueueResult<Attempts> {
    let obj = value
        .as_object()
        .ok_or_else(|| QueueError::Validation("attempts must be an object".into()))?;

    let count = obj
        .get("count")
        .ok_or_else(|| QueueError::Validation("attempts.count is required".into()))
        .and_then(|c| parse_non_negative(c, "attempts.count"))?;
    let count = u32::try_from(count)
        .map_err(|_| QueueError::Validation("attempts.count is too large".into()))?;
    if count == 0 {
        return Err(QueueError::Validation(
            "attempts.count must be at least 1".into(),
        ));
    }

    let mut attempts = Attempts::new(count);

    // The strategy only means something alongside a delay.
    if let Some(delay) = obj.get("delay").filter(|d| !d.is_null()) {
        attempts.delay = Some(parse_non_negative(delay, "attempts.delay")?);
        attempts.strategy = match obj.get("strategy") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.parse()?),
            Some(_) => {
                return Err(QueueError::Validation(
                    "attempts.strategy must be a string".into(),
                ))
            }
        };
    }

    Ok(attempts)
}

fn parse_timeout(value: &Value) -> QueueResult<u64> {
    parse_non_negative(value, "timeout")
}

fn parse_query(value: &Value) -> QueueResult<Value> {
    if !value.is_object() {
        return Err(QueueError::Validation("query must be an object".into()));
    }
    Ok(escape(value))
}
