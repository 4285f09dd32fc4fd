//! In-process collaborator implementations.
//!
//! Used for embedded deployments and throughout the test suite. Each map is a
//! `DashMap`, so concurrent workers touching distinct entities never contend.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{CancellationSource, Credential, CredentialProvider, DocumentStore, StatusSink};
use crate::error::{SyncError, SyncResult};
use crate::models::{
    BatchId, CursorState, EntityId, FetchedDocument, StatusRecord, StatusRecordId, StatusUpdate,
};

#[derive(Debug, Default)]
pub struct InMemoryCredentialProvider {
    credentials: DashMap<EntityId, Credential>,
}

impl InMemoryCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, credential: Credential) {
        self.credentials.insert(credential.entity_id, credential);
    }

    pub fn remove(&self, entity_id: EntityId) {
        self.credentials.remove(&entity_id);
    }
}

#[async_trait]
impl CredentialProvider for InMemoryCredentialProvider {
    async fn active_valid_credential(&self, entity_id: EntityId) -> SyncResult<Option<Credential>> {
        Ok(self.credentials.get(&entity_id).map(|c| c.value().clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub cursor: u64,
    pub business_date: Option<NaiveDate>,
    pub schema: Option<String>,
}

#[derive(Debug, Default)]
struct EntityDocuments {
    watermark: CursorState,
    documents: BTreeMap<String, StoredDocument>,
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    entities: DashMap<EntityId, EntityDocuments>,
    persist_calls: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_watermark(&self, entity_id: EntityId, state: CursorState) {
        self.entities.entry(entity_id).or_default().watermark = state;
    }

    pub fn document_count(&self, entity_id: EntityId) -> usize {
        self.entities
            .get(&entity_id)
            .map(|e| e.documents.len())
            .unwrap_or(0)
    }

    pub fn access_keys(&self, entity_id: EntityId) -> Vec<String> {
        self.entities
            .get(&entity_id)
            .map(|e| e.documents.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn document(&self, entity_id: EntityId, access_key: &str) -> Option<StoredDocument> {
        self.entities
            .get(&entity_id)
            .and_then(|e| e.documents.get(access_key).cloned())
    }

    /// Total `persist_document` calls across all entities
    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn watermark(&self, entity_id: EntityId) -> SyncResult<CursorState> {
        Ok(self
            .entities
            .get(&entity_id)
            .map(|e| e.watermark)
            .unwrap_or_default())
    }

    async fn set_watermark(
        &self,
        entity_id: EntityId,
        cursor: u64,
        max_cursor: u64,
    ) -> SyncResult<()> {
        let mut entry = self.entities.entry(entity_id).or_default();
        entry.watermark = entry.watermark.advance(cursor, max_cursor);
        Ok(())
    }

    async fn existing_keys(
        &self,
        entity_id: EntityId,
        access_keys: &[String],
    ) -> SyncResult<HashSet<String>> {
        let Some(entity) = self.entities.get(&entity_id) else {
            return Ok(HashSet::new());
        };
        Ok(access_keys
            .iter()
            .filter(|key| entity.documents.contains_key(key.as_str()))
            .cloned()
            .collect())
    }

    async fn persist_document(
        &self,
        entity_id: EntityId,
        document: &FetchedDocument,
    ) -> SyncResult<()> {
        if document.access_key.is_empty() {
            return Err(SyncError::Store(format!(
                "document at cursor {} has an empty access key",
                document.cursor
            )));
        }
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        self.entities.entry(entity_id).or_default().documents.insert(
            document.access_key.clone(),
            StoredDocument {
                cursor: document.cursor,
                business_date: document.business_date,
                schema: document.schema.clone(),
            },
        );
        Ok(())
    }

    async fn min_cursor_for_date(
        &self,
        entity_id: EntityId,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> SyncResult<Option<u64>> {
        let Some(entity) = self.entities.get(&entity_id) else {
            return Ok(None);
        };
        Ok(entity
            .documents
            .values()
            .filter(|doc| {
                doc.business_date.is_some_and(|date| {
                    date >= start_date && end_date.map_or(true, |end| date <= end)
                })
            })
            .map(|doc| doc.cursor)
            .min())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStatusSink {
    records: DashMap<StatusRecordId, StatusRecord>,
}

impl InMemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, id: StatusRecordId) -> Option<StatusRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StatusSink for InMemoryStatusSink {
    async fn create(&self, record: StatusRecord) -> SyncResult<()> {
        if self.records.contains_key(&record.id) {
            return Err(SyncError::StatusSink(format!(
                "status record {} already exists",
                record.id
            )));
        }
        self.records.insert(record.id, record);
        Ok(())
    }

    async fn update(
        &self,
        id: StatusRecordId,
        update: &StatusUpdate,
    ) -> SyncResult<Option<StatusRecord>> {
        Ok(self.records.get_mut(&id).map(|mut record| {
            record.apply(update);
            record.clone()
        }))
    }

    async fn delete(&self, id: StatusRecordId) -> SyncResult<()> {
        self.records.remove(&id);
        Ok(())
    }

    async fn get(&self, id: StatusRecordId) -> SyncResult<Option<StatusRecord>> {
        Ok(self.snapshot(id))
    }

    async fn list_by_batch(&self, batch_id: BatchId) -> SyncResult<Vec<StatusRecord>> {
        let mut records: Vec<StatusRecord> = self
            .records
            .iter()
            .filter(|r| r.batch_id == batch_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| (r.entity_id, r.id));
        Ok(records)
    }
}

/// Cooperative cancellation flags, per task and per batch
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tasks: DashSet<StatusRecordId>,
    batches: DashSet<BatchId>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_task(&self, task_id: StatusRecordId) {
        self.tasks.insert(task_id);
    }

    pub fn cancel_batch(&self, batch_id: BatchId) {
        self.batches.insert(batch_id);
    }

    pub fn clear_task(&self, task_id: StatusRecordId) {
        self.tasks.remove(&task_id);
    }

    pub fn clear_batch(&self, batch_id: BatchId) {
        self.batches.remove(&batch_id);
    }
}

#[async_trait]
impl CancellationSource for CancellationRegistry {
    async fn is_task_cancelled(&self, task_id: StatusRecordId) -> bool {
        self.tasks.contains(&task_id)
    }

    async fn is_batch_cancelled(&self, batch_id: BatchId) -> bool {
        self.batches.contains(&batch_id)
    }
}
