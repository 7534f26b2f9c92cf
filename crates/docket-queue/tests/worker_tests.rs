//! Worker polling, dispatch and lifecycle

mod common;

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use common::{BrokenCollection, CountingCollection};
use docket_queue::{
    BoxError, Collection, DequeueOptions, EnqueueOptions, EventKind, JobFilter, JobStatus,
    MemoryDatabase, PollOutcome, Queue, QueueConfig, QueueError, Worker, WorkerConfig,
    WorkerEvent, WorkerState,
};

const WAIT: Duration = Duration::from_secs(5);

fn counting_queues(names: &[&str]) -> (Vec<Queue>, Vec<Arc<CountingCollection>>) {
    let collections: Vec<Arc<CountingCollection>> = names
        .iter()
        .map(|n| Arc::new(CountingCollection::new(n)))
        .collect();
    let queues = names
        .iter()
        .zip(&collections)
        .map(|(name, c)| {
            let collection: Arc<dyn Collection> = c.clone();
            Queue::new(collection, *name, QueueConfig::default())
        })
        .collect();
    (queues, collections)
}

async fn shared_queues(db: &MemoryDatabase, names: &[&str]) -> Vec<Queue> {
    let mut queues = Vec::new();
    for name in names {
        queues.push(Queue::open(db, *name, QueueConfig::default()).await.unwrap());
    }
    queues
}

/// Forward every event of `kind` into a channel
fn subscribe(worker: &Worker, kind: EventKind) -> mpsc::UnboundedReceiver<WorkerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    worker.on(kind, move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> WorkerEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn echo(worker: &Worker, name: &str) {
    worker.register_fn(name, |params| async move { Ok::<_, BoxError>(params) });
}

#[test]
fn test_default_polling_interval() {
    let worker = Worker::new(Vec::new(), WorkerConfig::default());
    assert_eq!(worker.interval(), Duration::from_millis(5000));
}

#[tokio::test]
async fn test_dequeue_cycles_queues() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo", "bar", "baz"]).await;
    for q in queues.iter().chain(std::iter::once(&queues[0])) {
        q.enqueue("job", json!({}), EnqueueOptions::new()).await.unwrap();
    }

    let worker = Worker::new(queues, WorkerConfig::default());
    echo(&worker, "job");

    let mut order = Vec::new();
    for _ in 0..4 {
        let job = worker.dequeue().await.unwrap().unwrap();
        order.push(job.data().queue.clone());
    }
    assert_eq!(order, vec!["foo", "bar", "baz", "foo"]);
}

#[tokio::test]
async fn test_dequeue_visits_one_queue_per_call() {
    let (queues, collections) = counting_queues(&["foo", "bar", "baz"]);
    let worker = Worker::new(queues, WorkerConfig::default());

    for _ in 0..4 {
        assert!(worker.dequeue().await.unwrap().is_none());
    }

    let claims: Vec<usize> = collections.iter().map(|c| c.claims()).collect();
    assert_eq!(claims, vec![2, 1, 1]);
}

#[tokio::test]
async fn test_only_registered_names_are_claimed() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    queues[0]
        .enqueue("unknown", json!({}), EnqueueOptions::new())
        .await
        .unwrap();

    let strict = Worker::new(queues.clone(), WorkerConfig::default());
    echo(&strict, "known");
    assert!(strict.dequeue().await.unwrap().is_none());

    let loose = Worker::new(queues, WorkerConfig::default().only_registered(false));
    assert!(loose.dequeue().await.unwrap().is_some());
}

#[tokio::test]
async fn test_process_passes_params_to_handler() {
    let worker = Worker::new(Vec::new(), WorkerConfig::default());
    echo(&worker, "example");

    let doc = docket_queue::JobDocument::new("default", "example", json!({"foo": "bar"}));
    let result = worker.process(&doc).await.unwrap();
    assert_eq!(result, json!({"foo": "bar"}));
}

#[tokio::test]
async fn test_process_without_handler_returns_error() {
    let worker = Worker::new(Vec::new(), WorkerConfig::default());

    let doc = docket_queue::JobDocument::new("default", "asdf", json!({}));
    let err = worker.process(&doc).await.unwrap_err();
    assert!(matches!(err, QueueError::HandlerNotFound(name) if name == "asdf"));
}

#[tokio::test]
async fn test_register_overrides_same_name() {
    let worker = Worker::new(Vec::new(), WorkerConfig::default());
    worker.register_fn("x", |_| async move { Ok::<_, BoxError>(json!(1)) });
    worker.register_fn("x", |_| async move { Ok::<_, BoxError>(json!(2)) });

    let doc = docket_queue::JobDocument::new("default", "x", json!({}));
    assert_eq!(worker.process(&doc).await.unwrap(), json!(2));
    assert_eq!(worker.handler_names(), vec!["x"]);
}

#[tokio::test]
async fn test_work_success_completes_job() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    let job = queues[0]
        .enqueue("example", json!({"foo": "bar"}), EnqueueOptions::new())
        .await
        .unwrap();

    let worker = Worker::new(queues.clone(), WorkerConfig::default());
    echo(&worker, "example");

    let order = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::Complete, EventKind::Failed, EventKind::Done] {
        let order = order.clone();
        worker.on(kind, move |e| order.lock().unwrap().push(e.kind()));
    }

    let claimed = worker.dequeue().await.unwrap().unwrap();
    worker.work(claimed).await;

    assert_eq!(*order.lock().unwrap(), vec![EventKind::Complete, EventKind::Done]);
    assert!(!worker.is_working());

    let stored = queues[0].get(job.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), JobStatus::Completed);
    assert_eq!(stored.data().result, Some(json!({"foo": "bar"})));
}

#[tokio::test]
async fn test_work_failure_fails_job() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    let job = queues[0]
        .enqueue("broken", json!({}), EnqueueOptions::new())
        .await
        .unwrap();

    let worker = Worker::new(queues.clone(), WorkerConfig::default());
    worker.register_fn("broken", |_| async move {
        Err::<Value, BoxError>("smtp down".into())
    });

    let mut failed = subscribe(&worker, EventKind::Failed);
    let mut done = subscribe(&worker, EventKind::Done);

    let claimed = worker.dequeue().await.unwrap().unwrap();
    worker.work(claimed).await;

    assert_eq!(next(&mut failed).await.job().unwrap().id, job.id());
    assert_eq!(next(&mut done).await.job().unwrap().id, job.id());

    let stored = queues[0].get(job.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), JobStatus::Failed);
    assert!(stored.data().error.as_deref().unwrap().contains("smtp down"));
}

#[tokio::test]
async fn test_poll_error_emits_error_event() {
    let broken: Arc<dyn Collection> = Arc::new(BrokenCollection);
    let queue = Queue::new(broken, "foo", QueueConfig::default());
    let worker = Worker::new(vec![queue], WorkerConfig::default());

    let mut errors = subscribe(&worker, EventKind::Error);

    assert_eq!(worker.poll().await, PollOutcome::Error);
    match next(&mut errors).await {
        WorkerEvent::Error(e) => assert!(matches!(*e, QueueError::Store(_))),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_poll_emits_empty_after_full_rotation() {
    let (queues, _) = counting_queues(&["foo", "bar", "baz"]);
    let worker = Worker::new(queues, WorkerConfig::default());

    assert_eq!(worker.poll().await, PollOutcome::Missed);
    assert_eq!(worker.poll().await, PollOutcome::Missed);
    assert_eq!(worker.poll().await, PollOutcome::Empty);
    assert_eq!(worker.poll().await, PollOutcome::Missed);
}

#[tokio::test]
async fn test_poll_emits_dequeued_and_works_job() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    let job = queues[0]
        .enqueue("example", json!({}), EnqueueOptions::new())
        .await
        .unwrap();

    let worker = Worker::new(queues, WorkerConfig::default());
    echo(&worker, "example");
    let mut dequeued = subscribe(&worker, EventKind::Dequeued);
    let mut complete = subscribe(&worker, EventKind::Complete);

    assert_eq!(worker.poll().await, PollOutcome::Worked);
    assert_eq!(next(&mut dequeued).await.job().unwrap().id, job.id());
    assert_eq!(next(&mut complete).await.job().unwrap().id, job.id());
}

#[tokio::test]
async fn test_start_returns_orphaned_jobs_to_queue() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo", "bar", "baz"]).await;
    let foreign = Queue::open(&db, "foreign", QueueConfig::default()).await.unwrap();

    let own = queues[0].enqueue("foo", json!({}), EnqueueOptions::new()).await.unwrap();
    let theirs = foreign.enqueue("foo", json!({}), EnqueueOptions::new()).await.unwrap();
    queues[0].dequeue(&DequeueOptions::default()).await.unwrap().unwrap();
    foreign.dequeue(&DequeueOptions::default()).await.unwrap().unwrap();

    // No handlers registered, so the worker will not claim the job again.
    let worker = Arc::new(Worker::new(queues.clone(), WorkerConfig::default()));
    worker.start().await.unwrap();
    worker.stop().await;

    let own = queues[0].get(own.id()).await.unwrap().unwrap();
    assert_eq!(own.status(), JobStatus::Queued);
    let theirs = foreign.get(theirs.id()).await.unwrap().unwrap();
    assert_eq!(theirs.status(), JobStatus::Dequeued);
}

#[tokio::test]
async fn test_start_fails_when_recovery_fails() {
    let broken: Arc<dyn Collection> = Arc::new(BrokenCollection);
    let queue = Queue::new(broken, "foo", QueueConfig::default());
    let worker = Arc::new(Worker::new(vec![queue], WorkerConfig::default()));

    assert!(worker.start().await.is_err());
    assert_eq!(worker.state().await, WorkerState::Stopped);
}

#[tokio::test]
async fn test_worker_processes_all_jobs() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo", "bar"]).await;
    for (i, q) in queues.iter().enumerate() {
        for j in 0..3 {
            q.enqueue("count", json!({"q": i, "j": j}), EnqueueOptions::new())
                .await
                .unwrap();
        }
    }

    let counter = Arc::new(AtomicU32::new(0));
    let worker = Arc::new(Worker::new(
        queues.clone(),
        WorkerConfig::default().with_interval(Duration::from_millis(20)),
    ));
    let c = counter.clone();
    worker.register_fn("count", move |_| {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(Value::Null)
        }
    });

    let mut done = subscribe(&worker, EventKind::Done);
    worker.start().await.unwrap();
    for _ in 0..6 {
        next(&mut done).await;
    }
    worker.stop().await;

    assert_eq!(counter.load(Ordering::SeqCst), 6);
    for q in &queues {
        let stats = q.stats().await.unwrap();
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.queued + stats.dequeued, 0);
    }
}

#[tokio::test]
async fn test_failed_job_is_retried() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    let job = queues[0]
        .enqueue(
            "flaky",
            json!({}),
            EnqueueOptions::new().with_attempts(json!({"count": 3})),
        )
        .await
        .unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let worker = Arc::new(Worker::new(
        queues.clone(),
        WorkerConfig::default().with_interval(Duration::from_millis(20)),
    ));
    let c = calls.clone();
    worker.register_fn("flaky", move |_| {
        let c = c.clone();
        async move {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                Err::<Value, BoxError>("first run fails".into())
            } else {
                Ok(json!("ok"))
            }
        }
    });

    let mut failed = subscribe(&worker, EventKind::Failed);
    let mut complete = subscribe(&worker, EventKind::Complete);
    worker.start().await.unwrap();

    let retried = next(&mut failed).await;
    assert_eq!(retried.job().unwrap().status, JobStatus::Queued);
    next(&mut complete).await;
    worker.stop().await;

    let stored = queues[0].get(job.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), JobStatus::Completed);
    assert_eq!(stored.data().attempts.remaining, Some(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_waits_an_interval_before_polling_again() {
    let (queues, collections) = counting_queues(&["foo", "bar", "baz"]);
    let worker = Arc::new(Worker::new(
        queues,
        WorkerConfig::default().with_interval(Duration::from_millis(300)),
    ));
    let mut empty = subscribe(&worker, EventKind::Empty);

    worker.start().await.unwrap();
    next(&mut empty).await;
    let first = tokio::time::Instant::now();
    next(&mut empty).await;
    let gap = first.elapsed();
    worker.stop().await;

    assert!(gap >= Duration::from_millis(300), "second rotation after {gap:?}");
    let claims: usize = collections.iter().map(|c| c.claims()).sum();
    assert_eq!(claims, 6);
}

#[tokio::test]
async fn test_stop_waits_for_job_in_progress() {
    let (queues, collections) = counting_queues(&["foo", "bar", "baz"]);
    for _ in 0..2 {
        queues[0]
            .enqueue("slow", json!({}), EnqueueOptions::new())
            .await
            .unwrap();
    }

    let gate = Arc::new(Notify::new());
    let worker = Arc::new(Worker::new(queues.clone(), WorkerConfig::default()));
    let g = gate.clone();
    worker.register_fn("slow", move |_| {
        let g = g.clone();
        async move {
            g.notified().await;
            Ok::<_, BoxError>(json!("foobar"))
        }
    });

    let mut dequeued = subscribe(&worker, EventKind::Dequeued);
    let done_listeners = worker.listener_count(EventKind::Done);

    worker.start().await.unwrap();
    next(&mut dequeued).await;
    assert!(worker.is_working());

    let stopping = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(worker.state().await, WorkerState::Stopping);
    assert!(worker.is_working());

    gate.notify_one();
    tokio::time::timeout(WAIT, stopping).await.unwrap().unwrap();

    assert!(!worker.is_working());
    assert_eq!(worker.state().await, WorkerState::Stopped);
    assert_eq!(worker.listener_count(EventKind::Done), done_listeners);

    // Only the queue already in motion was polled.
    let claims: Vec<usize> = collections.iter().map(|c| c.claims()).collect();
    assert_eq!(claims, vec![1, 0, 0]);

    let stats = queues[0].stats().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.queued, 1);
}

#[tokio::test]
async fn test_stop_during_empty_dequeue() {
    let gated = Arc::new(CountingCollection::gated("foo"));
    let mut collections = vec![gated.clone()];
    collections.extend(["bar", "baz"].map(|n| Arc::new(CountingCollection::new(n))));
    let queues = ["foo", "bar", "baz"]
        .iter()
        .zip(&collections)
        .map(|(name, c)| {
            let collection: Arc<dyn Collection> = c.clone();
            Queue::new(collection, *name, QueueConfig::default())
        })
        .collect();

    let worker = Arc::new(Worker::new(queues, WorkerConfig::default()));
    let mut empty = subscribe(&worker, EventKind::Empty);

    worker.start().await.unwrap();
    tokio::time::timeout(WAIT, gated.claim_started()).await.unwrap();

    let stopping = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(worker.state().await, WorkerState::Stopping);

    gated.open_gate();
    tokio::time::timeout(WAIT, stopping).await.unwrap().unwrap();

    assert_eq!(worker.state().await, WorkerState::Stopped);
    let claims: Vec<usize> = collections.iter().map(|c| c.claims()).collect();
    assert_eq!(claims, vec![1, 0, 0]);
    assert!(empty.try_recv().is_err());
}

#[tokio::test]
async fn test_dropped_stop_still_stops_and_restarts() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    queues[0]
        .enqueue("slow", json!({}), EnqueueOptions::new())
        .await
        .unwrap();

    let gate = Arc::new(Notify::new());
    let worker = Arc::new(Worker::new(
        queues.clone(),
        WorkerConfig::default().with_interval(Duration::from_millis(20)),
    ));
    let g = gate.clone();
    worker.register_fn("slow", move |_| {
        let g = g.clone();
        async move {
            g.notified().await;
            Ok::<_, BoxError>(json!("slow"))
        }
    });
    echo(&worker, "quick");

    let mut dequeued = subscribe(&worker, EventKind::Dequeued);
    let mut complete = subscribe(&worker, EventKind::Complete);
    worker.start().await.unwrap();
    next(&mut dequeued).await;

    // Give up on the stop while the job is still running.
    let abandoned = tokio::time::timeout(Duration::from_millis(20), worker.stop()).await;
    assert!(abandoned.is_err());
    assert_eq!(worker.state().await, WorkerState::Stopping);

    gate.notify_one();
    tokio::time::timeout(WAIT, worker.start()).await.unwrap().unwrap();
    assert_eq!(worker.state().await, WorkerState::Running);
    assert_eq!(next(&mut complete).await.job().unwrap().name, "slow");

    queues[0]
        .enqueue("quick", json!({"after": "restart"}), EnqueueOptions::new())
        .await
        .unwrap();
    let event = next(&mut complete).await;
    assert_eq!(event.job().unwrap().params, json!({"after": "restart"}));

    tokio::time::timeout(WAIT, worker.stop()).await.unwrap();
    assert_eq!(worker.state().await, WorkerState::Stopped);
}

#[tokio::test]
async fn test_stop_can_be_abandoned_and_retried() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    queues[0]
        .enqueue("slow", json!({}), EnqueueOptions::new())
        .await
        .unwrap();

    let gate = Arc::new(Notify::new());
    let worker = Arc::new(Worker::new(queues, WorkerConfig::default()));
    let g = gate.clone();
    worker.register_fn("slow", move |_| {
        let g = g.clone();
        async move {
            g.notified().await;
            Ok::<_, BoxError>(Value::Null)
        }
    });

    let mut dequeued = subscribe(&worker, EventKind::Dequeued);
    worker.start().await.unwrap();
    next(&mut dequeued).await;

    assert!(tokio::time::timeout(Duration::from_millis(20), worker.stop())
        .await
        .is_err());

    let stopping = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.stop().await })
    };
    gate.notify_one();
    tokio::time::timeout(WAIT, stopping).await.unwrap().unwrap();
    assert_eq!(worker.state().await, WorkerState::Stopped);
    assert!(!worker.is_working());
}

#[tokio::test]
async fn test_panicking_handler_fails_job_and_loop_continues() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    let bad = queues[0]
        .enqueue("run", json!({"explode": true}), EnqueueOptions::new())
        .await
        .unwrap();
    queues[0]
        .enqueue("run", json!({"n": 2}), EnqueueOptions::new())
        .await
        .unwrap();

    let worker = Arc::new(Worker::new(
        queues.clone(),
        WorkerConfig::default().with_interval(Duration::from_millis(20)),
    ));
    worker.register_fn("run", |params: Value| async move {
        if params.get("explode").is_some() {
            panic!("handler blew up");
        }
        Ok::<_, BoxError>(params)
    });

    let mut failed = subscribe(&worker, EventKind::Failed);
    let mut complete = subscribe(&worker, EventKind::Complete);
    worker.start().await.unwrap();

    let event = next(&mut failed).await;
    let job = event.job().unwrap();
    assert_eq!(job.id, bad.id());
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("handler blew up"));

    let event = next(&mut complete).await;
    assert_eq!(event.job().unwrap().params, json!({"n": 2}));
    assert_eq!(worker.state().await, WorkerState::Running);

    worker.stop().await;
    assert!(!worker.is_working());
    let stats = queues[0].stats().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_process_reports_handler_panic() {
    let worker = Worker::new(Vec::new(), WorkerConfig::default());
    worker.register_fn("boom", |params: Value| async move {
        if params.is_null() {
            panic!("no params");
        }
        Ok::<_, BoxError>(params)
    });

    let doc = docket_queue::JobDocument::new("default", "boom", Value::Null);
    let err = worker.process(&doc).await.unwrap_err();
    assert!(matches!(err, QueueError::Handler(msg) if msg.contains("no params")));
}

#[tokio::test]
async fn test_huge_retry_delay_does_not_stop_the_worker() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    let flaky = queues[0]
        .enqueue(
            "flaky",
            json!({}),
            EnqueueOptions::new()
                .with_attempts(json!({"count": 2, "delay": 9e15, "strategy": "exponential"})),
        )
        .await
        .unwrap();
    queues[0]
        .enqueue("example", json!({"next": true}), EnqueueOptions::new())
        .await
        .unwrap();

    let worker = Arc::new(Worker::new(
        queues.clone(),
        WorkerConfig::default().with_interval(Duration::from_millis(20)),
    ));
    worker.register_fn("flaky", |_| async move {
        Err::<Value, BoxError>("always fails".into())
    });
    echo(&worker, "example");

    let mut failed = subscribe(&worker, EventKind::Failed);
    let mut complete = subscribe(&worker, EventKind::Complete);
    worker.start().await.unwrap();

    let event = next(&mut failed).await;
    assert_eq!(event.job().unwrap().id, flaky.id());
    assert_eq!(event.job().unwrap().status, JobStatus::Queued);
    let event = next(&mut complete).await;
    assert_eq!(event.job().unwrap().params, json!({"next": true}));

    worker.stop().await;
    assert_eq!(worker.state().await, WorkerState::Stopped);
}

#[tokio::test]
async fn test_stop_between_polls() {
    let (queues, collections) = counting_queues(&["foo", "bar", "baz"]);
    let worker = Arc::new(Worker::new(
        queues,
        WorkerConfig::default().with_interval(Duration::from_secs(3600)),
    ));
    let mut empty = subscribe(&worker, EventKind::Empty);

    worker.start().await.unwrap();
    next(&mut empty).await;

    tokio::time::timeout(WAIT, worker.stop())
        .await
        .expect("stop should interrupt the interval wait");

    assert!(!worker.is_working());
    assert_eq!(worker.state().await, WorkerState::Stopped);
    let claims: Vec<usize> = collections.iter().map(|c| c.claims()).collect();
    assert_eq!(claims, vec![1, 1, 1]);
}

#[tokio::test]
async fn test_stop_twice_is_a_no_op() {
    let (queues, _) = counting_queues(&["foo"]);
    let worker = Arc::new(Worker::new(queues, WorkerConfig::default()));

    worker.start().await.unwrap();
    worker.stop().await;
    worker.stop().await;
    assert_eq!(worker.state().await, WorkerState::Stopped);

    // Stopping a worker that never started is fine too.
    let idle = Worker::new(Vec::new(), WorkerConfig::default());
    idle.stop().await;
}

#[tokio::test]
async fn test_worker_can_restart() {
    let db = MemoryDatabase::new();
    let queues = shared_queues(&db, &["foo"]).await;
    let worker = Arc::new(Worker::new(
        queues.clone(),
        WorkerConfig::default().with_interval(Duration::from_millis(20)),
    ));
    echo(&worker, "example");
    let mut done = subscribe(&worker, EventKind::Done);

    for round in 0..3 {
        queues[0]
            .enqueue("example", json!({"round": round}), EnqueueOptions::new())
            .await
            .unwrap();
        worker.start().await.unwrap();
        worker.start().await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Running);

        let event = next(&mut done).await;
        assert_eq!(event.job().unwrap().params, json!({"round": round}));
        worker.stop().await;
        assert_eq!(worker.state().await, WorkerState::Stopped);
    }

    assert_eq!(worker.listener_count(EventKind::Done), 1);
    let completed = queues[0]
        .collection()
        .count(&JobFilter::with_status(JobStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed, 3);
}
