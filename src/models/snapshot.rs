use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{BatchId, StatusRecordId};

/// Live progress telemetry of one pool run. Eventually consistent; the
/// status records remain the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub batch_id: BatchId,
    pub total: usize,
    pub running: usize,
    pub queued: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub active_task_ids: Vec<StatusRecordId>,
    pub updated_at: DateTime<Utc>,
}

impl EngineSnapshot {
    pub fn new(batch_id: BatchId, total: usize) -> Self {
        Self {
            batch_id,
            total,
            running: 0,
            queued: total,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            active_task_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn is_complete(&self) -> bool {
        self.finished() == self.total
    }
}

/// Batch-level progress record maintained by the auto-resume supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: BatchId,
    pub round: u32,
    pub max_rounds: u32,
    pub remaining_failures: usize,
    pub recovered: usize,
    pub finished: bool,
    pub updated_at: DateTime<Utc>,
}

/// Outcome summary of a `run_sync` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Tasks whose empty incremental run removed their status record
    pub discarded: usize,
    pub elapsed: Duration,
}
