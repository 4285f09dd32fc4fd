//! Live telemetry published by the worker pool and the auto-resume
//! supervisor, keyed by batch.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::models::{BatchId, BatchProgress, EngineSnapshot, StatusRecordId};

#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    engines: DashMap<BatchId, EngineSnapshot>,
    progress: DashMap<BatchId, BatchProgress>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine_snapshot(&self, batch_id: BatchId) -> Option<EngineSnapshot> {
        self.engines.get(&batch_id).map(|s| s.value().clone())
    }

    pub fn publish_engine(&self, snapshot: EngineSnapshot) {
        self.engines.insert(snapshot.batch_id, snapshot);
    }

    pub fn batch_progress(&self, batch_id: BatchId) -> Option<BatchProgress> {
        self.progress.get(&batch_id).map(|p| p.value().clone())
    }

    pub fn publish_progress(&self, progress: BatchProgress) {
        self.progress.insert(progress.batch_id, progress);
    }

    /// Drop all telemetry of a batch
    pub fn forget(&self, batch_id: BatchId) {
        self.engines.remove(&batch_id);
        self.progress.remove(&batch_id);
    }
}

/// How a task left the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskDisposition {
    Succeeded,
    Failed,
    Cancelled,
    /// Completed with nothing to report; its status record was removed
    Discarded,
}

impl TaskDisposition {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskDisposition::Succeeded | TaskDisposition::Discarded)
    }
}

/// Per-run counters, republished to the registry after every transition
#[derive(Debug)]
pub(crate) struct SnapshotTracker {
    snapshot: Mutex<EngineSnapshot>,
    registry: Arc<SnapshotRegistry>,
}

impl SnapshotTracker {
    pub(crate) fn new(batch_id: BatchId, total: usize, registry: Arc<SnapshotRegistry>) -> Self {
        let snapshot = EngineSnapshot::new(batch_id, total);
        registry.publish_engine(snapshot.clone());
        Self {
            snapshot: Mutex::new(snapshot),
            registry,
        }
    }

    pub(crate) fn task_started(&self, task_id: StatusRecordId) {
        let mut snapshot = self.snapshot.lock();
        snapshot.queued = snapshot.queued.saturating_sub(1);
        snapshot.running += 1;
        snapshot.active_task_ids.push(task_id);
        Self::publish(&mut snapshot, &self.registry);
    }

    /// `was_running` is false for tasks cancelled before they started
    pub(crate) fn task_finished(
        &self,
        task_id: StatusRecordId,
        was_running: bool,
        disposition: TaskDisposition,
    ) {
        let mut snapshot = self.snapshot.lock();
        if was_running {
            snapshot.running = snapshot.running.saturating_sub(1);
            snapshot.active_task_ids.retain(|id| *id != task_id);
        } else {
            snapshot.queued = snapshot.queued.saturating_sub(1);
        }
        match disposition {
            TaskDisposition::Succeeded | TaskDisposition::Discarded => snapshot.succeeded += 1,
            TaskDisposition::Failed => snapshot.failed += 1,
            TaskDisposition::Cancelled => snapshot.cancelled += 1,
        }
        Self::publish(&mut snapshot, &self.registry);
    }

    pub(crate) fn current(&self) -> EngineSnapshot {
        self.snapshot.lock().clone()
    }

    fn publish(snapshot: &mut EngineSnapshot, registry: &SnapshotRegistry) {
        snapshot.updated_at = Utc::now();
        registry.publish_engine(snapshot.clone());
    }
}
