//! # Sync Task Model
//!
//! A [`SyncTask`] identifies one entity synchronization submitted to the worker
//! pool. Tasks are immutable; all mutable progress lives on the task's
//! [`StatusRecord`](super::StatusRecord).

use serde::{Deserialize, Serialize};

use super::{EntityId, StatusRecord, StatusRecordId};

/// Entity to be registered for synchronization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_id: EntityId,
    /// Identity key sent to the remote service (tax ID)
    pub external_key: String,
    pub display_name: String,
}

impl EntityRef {
    pub fn new(
        entity_id: EntityId,
        external_key: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            external_key: external_key.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTask {
    pub entity_id: EntityId,
    pub external_key: String,
    pub display_name: String,
    pub status_record_id: StatusRecordId,
}

impl SyncTask {
    pub fn new(entity: EntityRef, status_record_id: StatusRecordId) -> Self {
        Self {
            entity_id: entity.entity_id,
            external_key: entity.external_key,
            display_name: entity.display_name,
            status_record_id,
        }
    }

    /// Rebuild the task a status record was created for
    pub fn from_record(record: &StatusRecord) -> Self {
        Self {
            entity_id: record.entity_id,
            external_key: record.external_key.clone(),
            display_name: record.display_name.clone(),
            status_record_id: record.id,
        }
    }

    pub fn task_id(&self) -> StatusRecordId {
        self.status_record_id
    }
}
