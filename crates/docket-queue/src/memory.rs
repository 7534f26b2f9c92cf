//! In-memory store adapter
//!
//! Documents live in a `BTreeMap` keyed by id behind one lock. `claim`
//! selects and updates under the same write guard, which is what makes it
//! atomic across tasks sharing the collection.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::job::{JobDocument, JobId};
use crate::store::{Collection, Database, JobFilter, JobUpdate, StoreError};

/// Claim order: priority descending, then id ascending
fn claim_order(a: &JobDocument, b: &JobDocument) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    docs: RwLock<BTreeMap<JobId, JobDocument>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, doc: &JobDocument) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        if docs.contains_key(&doc.id) {
            return Err(StoreError::Query(format!("duplicate job id {}", doc.id)));
        }
        docs.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn save(&self, doc: &JobDocument) -> Result<(), StoreError> {
        self.docs.write().await.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn find_one(&self, filter: &JobFilter) -> Result<Option<JobDocument>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .values()
            .filter(|d| filter.matches(d))
            .min_by(|a, b| claim_order(a, b))
            .cloned())
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<JobDocument>, StoreError> {
        let docs = self.docs.read().await;
        let mut found: Vec<JobDocument> =
            docs.values().filter(|d| filter.matches(d)).cloned().collect();
        found.sort_by(claim_order);
        Ok(found)
    }

    async fn claim(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
    ) -> Result<Option<JobDocument>, StoreError> {
        let mut docs = self.docs.write().await;

        let id = docs
            .values()
            .filter(|d| filter.matches(d))
            .min_by(|a, b| claim_order(a, b))
            .map(|d| d.id);

        Ok(id.and_then(|id| {
            docs.get_mut(&id).map(|doc| {
                update.apply(doc);
                doc.clone()
            })
        }))
    }

    async fn update_many(
        &self,
        filter: &JobFilter,
        update: &JobUpdate,
    ) -> Result<u64, StoreError> {
        let mut docs = self.docs.write().await;
        let mut changed = 0;
        for doc in docs.values_mut().filter(|d| filter.matches(d)) {
            update.apply(doc);
            changed += 1;
        }
        Ok(changed)
    }

    async fn count(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs.values().filter(|d| filter.matches(d)).count() as u64)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory database (for testing and single-process use)
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        "memory"
    }

    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone();
        Ok(collection)
    }
}
