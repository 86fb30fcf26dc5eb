//! Ingestion and lookup entry points for the transport layer.

use crate::clock::Clock;
use crate::error::{SmsError, SmsResult};
use crate::extract::{extract_code, extract_phone};
use crate::resolver::{LatestCodeResolver, LookupPolicy};
use crate::store::RecordStore;
use crate::types::{LookupOutcome, MessageRecord, NewMessage, NewRecord, RecordId};
use crate::wait::WaitForCode;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Ties extraction, storage and lookup together.
#[derive(Clone)]
pub struct CodeService {
    store: Arc<dyn RecordStore>,
    waiter: WaitForCode,
}

impl CodeService {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, policy: LookupPolicy) -> Self {
        let resolver = LatestCodeResolver::new(store.clone(), clock, policy);
        Self {
            store,
            waiter: WaitForCode::new(resolver),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn policy(&self) -> &LookupPolicy {
        self.waiter.resolver().policy()
    }

    /// Extract code and phone number from `message` and persist it.
    ///
    /// A message without a recognizable code is still stored.
    #[instrument(skip(self, message), fields(sender = %message.sender))]
    pub async fn ingest(&self, message: NewMessage) -> SmsResult<MessageRecord> {
        let extracted_code = extract_code(&message.body);
        let extracted_phone_number = extract_phone(message.sim_slot_descriptor.as_deref());

        let record = self
            .store
            .insert(NewRecord {
                message,
                extracted_code,
                extracted_phone_number,
            })
            .await?;

        info!(
            id = record.id,
            from = %record.sender,
            code = ?record.extracted_code,
            receive_time = %record.receive_time.to_rfc3339(),
            "SMS received"
        );
        debug!(id = record.id, phone_number = ?record.extracted_phone_number, "SMS recipient");
        Ok(record)
    }

    /// Wait up to `timeout_seconds` for the latest code sent to `phone_number`.
    pub async fn lookup(
        &self,
        phone_number: &str,
        keyword: Option<&str>,
        timeout_seconds: i64,
    ) -> SmsResult<LookupOutcome> {
        if phone_number.trim().is_empty() {
            return Err(SmsError::InvalidInput("phone_number must not be empty".into()));
        }
        self.waiter.wait(phone_number, keyword, timeout_seconds).await
    }

    /// Newest-first page of stored messages.
    pub async fn history(&self, limit: usize, offset: usize) -> SmsResult<Vec<MessageRecord>> {
        self.store.list(limit, offset).await
    }

    pub async fn get(&self, id: RecordId) -> SmsResult<Option<MessageRecord>> {
        self.store.get(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: RecordId) -> SmsResult<bool> {
        let removed = self.store.delete(id).await?;
        if removed {
            info!(id, "SMS record deleted");
        }
        Ok(removed)
    }

    pub async fn count(&self) -> SmsResult<usize> {
        self.store.count().await
    }
}
