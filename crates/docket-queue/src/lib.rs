//! # Docket Queue
//!
//! Persistent job queue shared by many worker processes.
//!
//! Features:
//! - Named queues over one shared collection
//! - Atomic claim with priority and delay ordering
//! - Lock predicates keeping conflicting jobs apart while one is in flight
//! - Retries with linear or exponential backoff
//! - Round-robin workers with graceful start/stop and lifecycle events
//! - Pluggable store adapter (in-memory here, SQLite in `docket-persist`)
//!
//! ```no_run
//! use docket_queue::{EnqueueOptions, MemoryDatabase, Queue, QueueConfig, Worker, WorkerConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), docket_queue::QueueError> {
//! let db = MemoryDatabase::new();
//! let queue = Queue::open(&db, "emails", QueueConfig::default()).await?;
//!
//! queue
//!     .enqueue("send", json!({"to": "x"}), EnqueueOptions::new().with_priority(5))
//!     .await?;
//!
//! let worker = Arc::new(Worker::new(vec![queue], WorkerConfig::default()));
//! worker.register_fn("send", |params| async move {
//!     Ok::<_, docket_queue::BoxError>(params)
//! });
//! worker.start().await?;
//! // ...
//! worker.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod escape;
pub mod events;
pub mod handler;
pub mod job;
pub mod memory;
pub mod queue;
pub mod store;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use events::{EventKind, ListenerId, WorkerEvent};
pub use handler::{handler_fn, BoxError, HandlerResult, JobHandler};
pub use job::{Attempts, Job, JobDocument, JobId, JobStatus, RetryStrategy, MAX_RETRY_WAIT_MS};
pub use memory::{MemoryCollection, MemoryDatabase};
pub use queue::{DequeueOptions, EnqueueOptions, Queue, QueueConfig, QueueStats};
pub use store::{Collection, Database, JobFilter, JobUpdate, StoreError};
pub use worker::{PollOutcome, Worker, WorkerConfig, WorkerState};
