//! Worker polling loop and job dispatch

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::events::{EventEmitter, EventKind, ListenerId, WorkerEvent};
use crate::handler::{handler_fn, HandlerResult, JobHandler};
use crate::job::{Job, JobDocument, JobStatus};
use crate::queue::{DequeueOptions, Queue};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Pause after a rotation that found nothing
    pub interval: Duration,
    /// Only claim jobs at or above this priority
    pub min_priority: Option<i64>,
    /// Only claim jobs that have a registered handler
    pub only_registered: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            min_priority: None,
            only_registered: true,
        }
    }
}

impl WorkerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_min_priority(mut self, min_priority: i64) -> Self {
        self.min_priority = Some(min_priority);
        self
    }

    pub fn only_registered(mut self, only_registered: bool) -> Self {
        self.only_registered = only_registered;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Running,
    /// Stop requested, waiting for the current poll to settle
    Stopping,
}

/// What a single [`Worker::poll`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A job was claimed and worked
    Worked,
    /// The polled queue was empty, others in the rotation are pending
    Missed,
    /// A whole rotation came back empty
    Empty,
    /// The dequeue failed
    Error,
}

struct RunState {
    state: WorkerState,
    shutdown: Option<watch::Sender<bool>>,
    /// Flips to `true` once the running loop has exited
    stopped: Option<watch::Receiver<bool>>,
}

/// Polls a fixed list of queues round-robin and runs claimed jobs one at a
/// time.
pub struct Worker {
    queues: Vec<Queue>,
    config: WorkerConfig,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    events: EventEmitter,
    cursor: AtomicUsize,
    empty_polls: AtomicUsize,
    working: AtomicBool,
    run: Mutex<RunState>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("queues", &self.queue_names())
            .field("config", &self.config)
            .field("handlers", &self.handler_names())
            .finish()
    }
}

impl Worker {
    pub fn new(queues: Vec<Queue>, config: WorkerConfig) -> Self {
        Self {
            queues,
            config,
            handlers: RwLock::new(HashMap::new()),
            events: EventEmitter::new(),
            cursor: AtomicUsize::new(0),
            empty_polls: AtomicUsize::new(0),
            working: AtomicBool::new(false),
            run: Mutex::new(RunState {
                state: WorkerState::Stopped,
                shutdown: None,
                stopped: None,
            }),
        }
    }

    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Whether a job is being processed right now
    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> WorkerState {
        self.run.lock().await.state
    }

    /// Merge handlers into the dispatch table. A later registration for the
    /// same name replaces the earlier one.
    pub fn register<I, S>(&self, handlers: I)
    where
        I: IntoIterator<Item = (S, Arc<dyn JobHandler>)>,
        S: Into<String>,
    {
        let mut table = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (name, handler) in handlers {
            let name = name.into();
            debug!(name = %name, "Registered job handler");
            table.insert(name, handler);
        }
    }

    /// Register a single async closure
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register([(name.into(), handler_fn(f))]);
    }

    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    pub fn once<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.events.once(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.events.listener_count(kind)
    }

    pub fn emit(&self, event: &WorkerEvent) {
        self.events.emit(event);
    }

    /// Try the next queue in rotation, exactly one queue per call
    pub async fn dequeue(&self) -> QueueResult<Option<Job>> {
        let len = self.queues.len();
        if len == 0 {
            return Ok(None);
        }

        let index = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i)
            % len;

        self.queues[index].dequeue(&self.dequeue_options()).await
    }

    /// One step of the loop: dequeue, and work the job if there is one
    pub async fn poll(&self) -> PollOutcome {
        match self.dequeue().await {
            Ok(Some(job)) => {
                self.empty_polls.store(0, Ordering::SeqCst);
                self.events
                    .emit(&WorkerEvent::Dequeued(job.data().clone()));
                self.work(job).await;
                PollOutcome::Worked
            }
            Ok(None) => {
                let misses = self.empty_polls.fetch_add(1, Ordering::SeqCst) + 1;
                if misses >= self.queues.len() {
                    self.empty_polls.store(0, Ordering::SeqCst);
                    self.events.emit(&WorkerEvent::Empty);
                    PollOutcome::Empty
                } else {
                    PollOutcome::Missed
                }
            }
            Err(e) => {
                error!(error = %e, "Dequeue failed");
                self.events.emit(&WorkerEvent::Error(Arc::new(e)));
                PollOutcome::Error
            }
        }
    }

    /// Run the registered handler for a job document.
    ///
    /// The handler runs on its own task, so a panic inside it comes back as
    /// a [`QueueError::Handler`] instead of tearing down the caller.
    pub async fn process(&self, data: &JobDocument) -> QueueResult<Value> {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&data.name)
            .cloned()
            .ok_or_else(|| QueueError::HandlerNotFound(data.name.clone()))?;

        let params = data.params.clone();
        match tokio::spawn(async move { handler.execute(params).await }).await {
            Ok(result) => result.map_err(|e| QueueError::Handler(e.to_string())),
            Err(e) => {
                error!(job_id = %data.id, name = %data.name, "Job handler panicked");
                Err(QueueError::Handler(format!(
                    "handler panicked: {}",
                    panic_message(e)
                )))
            }
        }
    }

    /// Process a claimed job and record the outcome in the store
    pub async fn work(&self, mut job: Job) {
        self.working.store(true, Ordering::SeqCst);
        info!(job_id = %job.id(), name = %job.data().name, queue = %job.data().queue, "Processing job");

        let started = Instant::now();
        let outcome = self.process(job.data()).await;
        warn_if_overdue(job.data(), started.elapsed());

        let written = match outcome {
            Ok(result) => job.complete(result).await,
            Err(e) => {
                warn!(job_id = %job.id(), error = %e, "Job failed");
                job.fail(&e).await
            }
        };

        match written {
            Ok(()) => {
                let data = job.data().clone();
                if data.status == JobStatus::Completed {
                    self.events.emit(&WorkerEvent::Complete(data.clone()));
                } else {
                    self.events.emit(&WorkerEvent::Failed(data.clone()));
                }
                self.events.emit(&WorkerEvent::Done(data));
            }
            Err(e) => {
                error!(job_id = %job.id(), error = %e, "Failed to record job outcome");
                self.events.emit(&WorkerEvent::Error(Arc::new(e)));
            }
        }

        self.working.store(false, Ordering::SeqCst);
    }

    /// Recover this worker's orphaned jobs and start polling.
    ///
    /// Calling `start` on a running worker does nothing. On a worker that is
    /// still stopping it first waits for the old loop to exit.
    pub async fn start(self: &Arc<Self>) -> QueueResult<()> {
        let mut run = loop {
            let run = self.run.lock().await;
            match run.state {
                WorkerState::Stopped => break run,
                WorkerState::Running => {
                    warn!("Worker already running");
                    return Ok(());
                }
                WorkerState::Stopping => {
                    let stopped = run.stopped.clone();
                    drop(run);
                    self.wait_stopped(stopped).await;
                }
            }
        };

        for queue in &self.queues {
            queue.requeue_dequeued().await?;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let worker = Arc::clone(self);
        tokio::spawn(worker.run_loop(shutdown_rx, stopped_tx));
        run.shutdown = Some(shutdown_tx);
        run.stopped = Some(stopped_rx);
        run.state = WorkerState::Running;

        info!(
            queues = ?self.queue_names(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Worker started"
        );
        Ok(())
    }

    /// Stop polling once the current job or dequeue settles.
    ///
    /// Returns when the loop has exited. A stopped worker is left alone, and
    /// a second call on a stopping worker waits for the same exit.
    ///
    /// Dropping the returned future early does not leave the worker stuck:
    /// the loop still exits and marks the worker [`WorkerState::Stopped`]
    /// on its own.
    pub async fn stop(&self) {
        let stopped = {
            let mut run = self.run.lock().await;
            match run.state {
                WorkerState::Stopped => return,
                WorkerState::Running => {
                    run.state = WorkerState::Stopping;
                    if let Some(shutdown) = &run.shutdown {
                        let _ = shutdown.send(true);
                    }
                }
                WorkerState::Stopping => {}
            }
            run.stopped.clone()
        };

        self.wait_stopped(stopped).await;
    }

    async fn wait_stopped(&self, stopped: Option<watch::Receiver<bool>>) {
        let Some(mut stopped) = stopped else {
            return;
        };
        if stopped.wait_for(|done| *done).await.is_ok() {
            return;
        }

        // The loop task went away without reporting its exit.
        error!("Worker loop aborted");
        let mut run = self.run.lock().await;
        if run.state == WorkerState::Stopping {
            run.state = WorkerState::Stopped;
            run.shutdown = None;
            run.stopped = None;
        }
    }

    async fn run_loop(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        stopped: watch::Sender<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll().await {
                PollOutcome::Worked | PollOutcome::Missed => {}
                // Errors wait one interval like an empty rotation, then the
                // loop carries on.
                PollOutcome::Empty | PollOutcome::Error => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        {
            let mut run = self.run.lock().await;
            run.state = WorkerState::Stopped;
            run.shutdown = None;
            run.stopped = None;
        }
        let _ = stopped.send(true);
        info!("Worker stopped");
    }

    fn dequeue_options(&self) -> DequeueOptions {
        DequeueOptions {
            min_priority: self.config.min_priority,
            names: self.config.only_registered.then(|| self.handler_names()),
        }
    }

    fn queue_names(&self) -> Vec<&str> {
        self.queues.iter().map(|q| q.name()).collect()
    }
}

fn panic_message(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// `timeout` is advisory: the handler is never interrupted, only reported.
fn warn_if_overdue(data: &JobDocument, elapsed: Duration) {
    if let Some(timeout) = data.timeout {
        if elapsed > Duration::from_millis(timeout) {
            warn!(
                job_id = %data.id,
                timeout_ms = timeout,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job exceeded its timeout"
            );
        }
    }
}
