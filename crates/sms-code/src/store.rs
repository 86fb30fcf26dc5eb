//! Record store interface and in-memory implementation.

use crate::error::SmsResult;
use crate::types::{MessageRecord, NewRecord, RecordId, RecordQuery};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Append-only ordered collection of ingested messages.
///
/// Implementations must insert atomically and give each query a consistent
/// point-in-time view.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record, assigning it a new id.
    async fn insert(&self, record: NewRecord) -> SmsResult<MessageRecord>;

    /// Records matching `query`, newest first, capped at `query.limit`.
    async fn query(&self, query: &RecordQuery) -> SmsResult<Vec<MessageRecord>>;

    async fn get(&self, id: RecordId) -> SmsResult<Option<MessageRecord>>;

    /// A page of all records, newest first.
    async fn list(&self, limit: usize, offset: usize) -> SmsResult<Vec<MessageRecord>>;

    /// Delete a record. Returns false if it did not exist.
    async fn delete(&self, id: RecordId) -> SmsResult<bool>;

    async fn count(&self) -> SmsResult<usize>;
}

/// Newest first, ties broken by descending id.
pub fn recency_order(a: &MessageRecord, b: &MessageRecord) -> Ordering {
    b.receive_time
        .cmp(&a.receive_time)
        .then_with(|| b.id.cmp(&a.id))
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<MessageRecord>,
    next_id: RecordId,
}

/// In-memory record store. Contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: NewRecord) -> SmsResult<MessageRecord> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let stored = MessageRecord::from_new(inner.next_id, record);
        inner.records.push(stored.clone());

        debug!(id = stored.id, "Memory store: inserted record");
        Ok(stored)
    }

    async fn query(&self, query: &RecordQuery) -> SmsResult<Vec<MessageRecord>> {
        let inner = self.inner.read().await;
        let mut matched: Vec<MessageRecord> = inner
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        matched.sort_by(recency_order);
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn get(&self, id: RecordId) -> SmsResult<Option<MessageRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, limit: usize, offset: usize) -> SmsResult<Vec<MessageRecord>> {
        let inner = self.inner.read().await;
        let mut all: Vec<&MessageRecord> = inner.records.iter().collect();
        all.sort_by(|a, b| recency_order(a, b));

        Ok(all.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn delete(&self, id: RecordId) -> SmsResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        Ok(inner.records.len() != before)
    }

    async fn count(&self) -> SmsResult<usize> {
        Ok(self.inner.read().await.records.len())
    }
}
