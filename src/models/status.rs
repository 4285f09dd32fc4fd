//! # Status Records
//!
//! The authoritative progress record of one sync task. Created `pending`
//! before the task starts and terminal once it reaches `succeeded`, `failed`
//! or `cancelled`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BatchId, EntityId, EntityRef, StatusRecordId};
use crate::constants::system::MAX_ERROR_MESSAGE_LEN;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskPhase::Succeeded | TaskPhase::Failed | TaskPhase::Cancelled
        )
    }

    /// Terminal phases the auto-resume supervisor re-queues
    pub fn is_resumable(&self) -> bool {
        matches!(self, TaskPhase::Failed | TaskPhase::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Pending => "pending",
            TaskPhase::Running => "running",
            TaskPhase::Succeeded => "succeeded",
            TaskPhase::Failed => "failed",
            TaskPhase::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: StatusRecordId,
    pub batch_id: BatchId,
    pub entity_id: EntityId,
    pub external_key: String,
    pub display_name: String,
    pub phase: TaskPhase,
    pub progress_count: u64,
    pub expected_count: Option<u64>,
    pub last_stage_description: String,
    pub error_message: Option<String>,
    pub certificate_expired: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of times the task has been started, across resume rounds
    pub attempts: u32,
}

impl StatusRecord {
    pub fn pending(batch_id: BatchId, entity: &EntityRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            entity_id: entity.entity_id,
            external_key: entity.external_key.clone(),
            display_name: entity.display_name.clone(),
            phase: TaskPhase::Pending,
            progress_count: 0,
            expected_count: None,
            last_stage_description: "Queued".to_string(),
            error_message: None,
            certificate_expired: false,
            started_at: None,
            finished_at: None,
            attempts: 0,
        }
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        if let Some(phase) = update.phase {
            if phase == TaskPhase::Running && self.phase != TaskPhase::Running {
                self.attempts += 1;
            }
            self.phase = phase;
        }
        if let Some(progress) = update.progress_count {
            self.progress_count = progress;
        }
        if let Some(expected) = update.expected_count {
            self.expected_count = expected;
        }
        if let Some(stage) = &update.last_stage_description {
            self.last_stage_description = stage.clone();
        }
        if let Some(error) = &update.error_message {
            self.error_message = error.clone();
        }
        if let Some(expired) = update.certificate_expired {
            self.certificate_expired = expired;
        }
        if let Some(started) = update.started_at {
            self.started_at = started;
        }
        if let Some(finished) = update.finished_at {
            self.finished_at = finished;
        }
    }
}

/// Partial update of a [`StatusRecord`]; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub phase: Option<TaskPhase>,
    pub progress_count: Option<u64>,
    pub expected_count: Option<Option<u64>>,
    pub last_stage_description: Option<String>,
    pub error_message: Option<Option<String>>,
    pub certificate_expired: Option<bool>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub finished_at: Option<Option<DateTime<Utc>>>,
}

impl StatusUpdate {
    pub fn running() -> Self {
        Self {
            phase: Some(TaskPhase::Running),
            last_stage_description: Some("Starting synchronization".to_string()),
            started_at: Some(Some(Utc::now())),
            finished_at: Some(None),
            ..Self::default()
        }
    }

    pub fn progress(progress_count: u64, expected_count: Option<u64>, stage: impl Into<String>) -> Self {
        Self {
            progress_count: Some(progress_count),
            expected_count: Some(expected_count),
            last_stage_description: Some(stage.into()),
            ..Self::default()
        }
    }

    pub fn stage(stage: impl Into<String>) -> Self {
        Self {
            last_stage_description: Some(stage.into()),
            ..Self::default()
        }
    }

    pub fn succeeded(progress_count: u64, stage: impl Into<String>) -> Self {
        Self {
            phase: Some(TaskPhase::Succeeded),
            progress_count: Some(progress_count),
            last_stage_description: Some(stage.into()),
            error_message: Some(None),
            finished_at: Some(Some(Utc::now())),
            ..Self::default()
        }
    }

    pub fn failed(error_message: &str, certificate_expired: bool) -> Self {
        Self {
            phase: Some(TaskPhase::Failed),
            last_stage_description: Some("Failed".to_string()),
            error_message: Some(Some(truncate_error(error_message))),
            certificate_expired: Some(certificate_expired),
            finished_at: Some(Some(Utc::now())),
            ..Self::default()
        }
    }

    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self {
            phase: Some(TaskPhase::Cancelled),
            last_stage_description: Some(stage.into()),
            finished_at: Some(Some(Utc::now())),
            ..Self::default()
        }
    }

    /// Reset a terminal record so it can be re-queued
    pub fn reset_pending() -> Self {
        Self {
            phase: Some(TaskPhase::Pending),
            progress_count: Some(0),
            expected_count: Some(None),
            last_stage_description: Some("Queued for retry".to_string()),
            error_message: Some(None),
            certificate_expired: Some(false),
            started_at: Some(None),
            finished_at: Some(None),
        }
    }
}

/// Truncate error text to the stored maximum on a char boundary
pub fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LEN {
        return message.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}
