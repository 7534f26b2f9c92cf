//! Worker lifecycle events
//!
//! Each worker owns an [`EventEmitter`]. Listeners are called synchronously,
//! in subscription order, on the task that emits the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::QueueError;
use crate::job::JobDocument;

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was claimed
    Dequeued(JobDocument),
    /// A job finished, successfully or not
    Done(JobDocument),
    Complete(JobDocument),
    Failed(JobDocument),
    /// A full rotation over the queues found nothing
    Empty,
    Error(Arc<QueueError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Dequeued,
    Done,
    Complete,
    Failed,
    Empty,
    Error,
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Dequeued(_) => EventKind::Dequeued,
            Self::Done(_) => EventKind::Done,
            Self::Complete(_) => EventKind::Complete,
            Self::Failed(_) => EventKind::Failed,
            Self::Empty => EventKind::Empty,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// The job document carried by job events
    pub fn job(&self) -> Option<&JobDocument> {
        match self {
            Self::Dequeued(doc) | Self::Done(doc) | Self::Complete(doc) | Self::Failed(doc) => {
                Some(doc)
            }
            Self::Empty | Self::Error(_) => None,
        }
    }
}

pub type Listener = Arc<dyn Fn(&WorkerEvent) + Send + Sync>;

/// Handle returned by `on`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
pub struct EventEmitter {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, false, Arc::new(listener))
    }

    /// Subscribe for the next matching event only
    pub fn once<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&WorkerEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, true, Arc::new(listener))
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut subs = self.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.read().iter().filter(|s| s.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Deliver an event to every listener of its kind
    pub fn emit(&self, event: &WorkerEvent) {
        let kind = event.kind();

        // Snapshot first so listeners may subscribe or unsubscribe freely.
        let listeners: Vec<Listener> = {
            let mut subs = self.write();
            let listeners = subs
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| s.listener.clone())
                .collect();
            subs.retain(|s| !(s.once && s.kind == kind));
            listeners
        };

        for listener in listeners {
            listener(event);
        }
    }

    fn subscribe(&self, kind: EventKind, once: bool, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().push(Subscription {
            id,
            kind,
            once,
            listener,
        });
        id
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
