//! # Collaborator Interfaces
//!
//! Traits for everything the engine consumes but does not own: credentials,
//! the document store, the status record sink and the cancellation source.
//! Implementations are expected to be safe for concurrent use per distinct
//! key; the engine adds no locking of its own around them.
//!
//! [`memory`] provides in-process implementations backed by `dashmap`.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

use crate::error::SyncResult;
use crate::models::{
    BatchId, CursorState, EntityId, FetchedDocument, StatusRecord, StatusRecordId, StatusUpdate,
};

pub use memory::{
    CancellationRegistry, InMemoryCredentialProvider, InMemoryDocumentStore, InMemoryStatusSink,
};

/// Client credential of one entity. The material is opaque to the engine
/// and is handed to the transport unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub entity_id: EntityId,
    material: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
}

impl Credential {
    pub fn new(entity_id: EntityId, material: Vec<u8>, is_expired: bool) -> Self {
        Self {
            entity_id,
            material,
            expires_at: None,
            is_expired,
        }
    }

    pub fn with_expiry(entity_id: EntityId, material: Vec<u8>, expires_at: DateTime<Utc>) -> Self {
        Self {
            entity_id,
            material,
            expires_at: Some(expires_at),
            is_expired: expires_at <= Utc::now(),
        }
    }

    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// Expired by flag or by its expiry timestamp
    pub fn has_expired(&self) -> bool {
        self.is_expired || self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("entity_id", &self.entity_id)
            .field("material", &format_args!("[{} bytes redacted]", self.material.len()))
            .field("expires_at", &self.expires_at)
            .field("is_expired", &self.is_expired)
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The entity's active credential, or `None` when it has none
    async fn active_valid_credential(&self, entity_id: EntityId) -> SyncResult<Option<Credential>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn watermark(&self, entity_id: EntityId) -> SyncResult<CursorState>;

    /// Persist a new watermark; implementations must never move it backwards
    async fn set_watermark(&self, entity_id: EntityId, cursor: u64, max_cursor: u64)
        -> SyncResult<()>;

    /// The subset of `access_keys` already stored for the entity
    async fn existing_keys(
        &self,
        entity_id: EntityId,
        access_keys: &[String],
    ) -> SyncResult<HashSet<String>>;

    async fn persist_document(&self, entity_id: EntityId, document: &FetchedDocument)
        -> SyncResult<()>;

    /// Lowest cursor of a stored document whose business date falls in the range
    async fn min_cursor_for_date(
        &self,
        entity_id: EntityId,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> SyncResult<Option<u64>>;
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn create(&self, record: StatusRecord) -> SyncResult<()>;

    /// Apply a partial update; returns the updated record, `None` if it is gone
    async fn update(
        &self,
        id: StatusRecordId,
        update: &StatusUpdate,
    ) -> SyncResult<Option<StatusRecord>>;

    async fn delete(&self, id: StatusRecordId) -> SyncResult<()>;

    async fn get(&self, id: StatusRecordId) -> SyncResult<Option<StatusRecord>>;

    async fn list_by_batch(&self, batch_id: BatchId) -> SyncResult<Vec<StatusRecord>>;
}

#[async_trait]
pub trait CancellationSource: Send + Sync {
    async fn is_task_cancelled(&self, task_id: StatusRecordId) -> bool;
    async fn is_batch_cancelled(&self, batch_id: BatchId) -> bool;
}
