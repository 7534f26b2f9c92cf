//! Store adapters shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use docket_queue::{
    Collection, JobDocument, JobFilter, JobUpdate, MemoryCollection, StoreError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Memory collection that counts claim attempts.
///
/// A gated collection holds every claim until [`CountingCollection::open_gate`]
/// is called, so tests can act while a dequeue is in flight.
#[derive(Debug)]
pub struct CountingCollection {
    inner: MemoryCollection,
    claims: AtomicUsize,
    entered: Notify,
    gate: Option<Notify>,
}

impl CountingCollection {
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemoryCollection::new(name),
            claims: AtomicUsize::new(0),
            entered: Notify::new(),
            gate: None,
        }
    }

    pub fn gated(name: &str) -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new(name)
        }
    }

    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }

    /// Resolves once a claim has started
    pub async fn claim_started(&self) {
        self.entered.notified().await;
    }

    /// Let one held claim through
    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl Collection for CountingCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert(&self, doc: &JobDocument) -> Result<(), StoreError> {
        self.inner.insert(doc).await
    }

    async fn save(&self, doc: &JobDocument) -> Result<(), StoreError> {
        self.inner.save(doc).await
    }

    async fn find_one(&self, filter: &JobFilter) -> Result<Option<JobDocument>, StoreError> {
        self.inner.find_one(filter).await
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<JobDocument>, StoreError> {
        self.inner.find(filter).await
    }

    async fn claim(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
    ) -> Result<Option<JobDocument>, StoreError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.inner.claim(filter, update).await
    }

    async fn update_many(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
    ) -> Result<u64, StoreError> {
        self.inner.update_many(filter, update).await
    }

    async fn count(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        self.inner.count(filter).await
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Collection whose every operation fails
#[derive(Debug, Default)]
pub struct BrokenCollection;

fn down() -> StoreError {
    StoreError::Connection("store unavailable".into())
}

#[async_trait]
impl Collection for BrokenCollection {
    fn name(&self) -> &str {
        "broken"
    }

    async fn insert(&self, _doc: &JobDocument) -> Result<(), StoreError> {
        Err(down())
    }

    async fn save(&self, _doc: &JobDocument) -> Result<(), StoreError> {
        Err(down())
    }

    async fn find_one(&self, _filter: &JobFilter) -> Result<Option<JobDocument>, StoreError> {
        Err(down())
    }

    async fn find(&self, _filter: &JobFilter) -> Result<Vec<JobDocument>, StoreError> {
        Err(down())
    }

    async fn claim(
        &self,
        _filter: &JobFilter,
        _update: &JobUpdate,
    ) -> Result<Option<JobDocument>, StoreError> {
        Err(down())
    }

    async fn update_many(
        &self,
        _filter: &JobFilter,
        _update: &JobUpdate,
    ) -> Result<u64, StoreError> {
        Err(down())
    }

    async fn count(&self, _filter: &JobFilter) -> Result<u64, StoreError> {
        Err(down())
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        Err(down())
    }
}
