//! Store adapter traits
//!
//! The queue never talks to a database directly. It goes through a
//! [`Collection`] of job documents that offers lookups, a replace-by-id
//! write, and one atomic find-and-modify (`claim`). Everything the queue
//! guarantees about double-dequeue rests on `claim` being atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

use crate::job::{JobDocument, JobId, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),
}

/// Predicate over job documents.
///
/// Unset fields match everything. Documents are always visited in claim
/// order: priority descending, then id ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub id: Option<JobId>,
    pub queue: Option<String>,
    pub status: Option<JobStatus>,
    /// Matches `delay <= delay_before`
    pub delay_before: Option<DateTime<Utc>>,
    pub min_priority: Option<i64>,
    /// Matches when the job name is in the set. An empty set matches nothing.
    pub names: Option<Vec<String>>,
    /// Stored lock predicates a candidate must not be equal to
    pub exclude_queries: Vec<Value>,
}

impl JobFilter {
    pub fn by_id(id: JobId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn matches(&self, doc: &JobDocument) -> bool {
        if self.id.is_some_and(|id| id != doc.id) {
            return false;
        }
        if self.queue.as_ref().is_some_and(|q| *q != doc.queue) {
            return false;
        }
        if self.status.is_some_and(|s| s != doc.status) {
            return false;
        }
        if self.delay_before.is_some_and(|t| doc.delay > t) {
            return false;
        }
        if self.min_priority.is_some_and(|p| doc.priority < p) {
            return false;
        }
        if let Some(names) = &self.names {
            if !names.iter().any(|n| *n == doc.name) {
                return false;
            }
        }
        match &doc.query {
            Some(query) => !self.exclude_queries.contains(query),
            None => true,
        }
    }
}

/// Fields written by `claim` and `update_many`
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub dequeued: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn dequeue(at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Dequeued,
            dequeued: Some(at),
        }
    }

    pub fn requeue() -> Self {
        Self {
            status: JobStatus::Queued,
            dequeued: None,
        }
    }

    pub fn apply(&self, doc: &mut JobDocument) {
        doc.status = self.status;
        if let Some(at) = self.dequeued {
            doc.dequeued = Some(at);
        }
    }
}

/// A handle to one collection of job documents
#[async_trait]
pub trait Collection: Send + Sync + Debug {
    /// Collection name
    fn name(&self) -> &str;

    /// Insert a new document
    async fn insert(&self, doc: &JobDocument) -> Result<(), StoreError>;

    /// Replace the document with the same id, inserting it if missing
    async fn save(&self, doc: &JobDocument) -> Result<(), StoreError>;

    async fn find_one(&self, filter: &JobFilter) -> Result<Option<JobDocument>, StoreError>;

    /// All matching documents, priority descending then id ascending
    async fn find(&self, filter: &JobFilter) -> Result<Vec<JobDocument>, StoreError>;

    /// Atomically pick the first match, apply `update` and return the
    /// post-update document. Two concurrent claims never return the same
    /// document.
    async fn claim(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
    ) -> Result<Option<JobDocument>, StoreError>;

    /// Apply `update` to every match, returning how many changed
    async fn update_many(&self, filter: &JobFilter, update: &JobUpdate)
        -> Result<u64, StoreError>;

    async fn count(&self, filter: &JobFilter) -> Result<u64, StoreError>;

    /// Create the indexes dequeue relies on
    async fn ensure_indexes(&self) -> Result<(), StoreError>;
}

/// A store holding named collections
#[async_trait]
pub trait Database: Send + Sync + Debug {
    /// Backend name
    fn name(&self) -> &str;

    /// Open (and create if needed) a collection
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> JobDocument {
        JobDocument::new("default", "send", json!({}))
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(JobFilter::default().matches(&doc()));
    }

    #[test]
    fn test_filter_queue_and_status() {
        let d = doc();
        assert!(JobFilter::with_status(JobStatus::Queued).queue("default").matches(&d));
        assert!(!JobFilter::with_status(JobStatus::Dequeued).matches(&d));
        assert!(!JobFilter::default().queue("other").matches(&d));
    }

    #[test]
    fn test_filter_names_and_priority() {
        let mut d = doc();
        d.priority = 3;

        let filter = JobFilter {
            names: Some(vec!["send".into()]),
            min_priority: Some(3),
            ..Default::default()
        };
        assert!(filter.matches(&d));

        let none = JobFilter {
            names: Some(vec![]),
            ..Default::default()
        };
        assert!(!none.matches(&d));

        let higher = JobFilter {
            min_priority: Some(4),
            ..Default::default()
        };
        assert!(!higher.matches(&d));
    }

    #[test]
    fn test_filter_delay() {
        let mut d = doc();
        d.delay = Utc::now() + chrono::Duration::hours(1);
        let filter = JobFilter {
            delay_before: Some(Utc::now()),
            ..Default::default()
        };
        assert!(!filter.matches(&d));
    }

    #[test]
    fn test_filter_excludes_locked_queries() {
        let mut d = doc();
        d.query = Some(json!({"account": 1}));

        let filter = JobFilter {
            exclude_queries: vec![json!({"account": 1})],
            ..Default::default()
        };
        assert!(!filter.matches(&d));

        d.query = Some(json!({"account": 2}));
        assert!(filter.matches(&d));

        d.query = None;
        assert!(filter.matches(&d));
    }

    #[test]
    fn test_update_apply() {
        let mut d = doc();
        let at = Utc::now();
        JobUpdate::dequeue(at).apply(&mut d);
        assert_eq!(d.status, JobStatus::Dequeued);
        assert_eq!(d.dequeued, Some(at));

        JobUpdate::requeue().apply(&mut d);
        assert_eq!(d.status, JobStatus::Queued);
        assert_eq!(d.dequeued, Some(at));
    }
}
