//! # Sync Observer
//!
//! The capability an entity synchronization uses to talk back to whoever runs
//! it: progress reporting, cooperative cancellation and per-page telemetry.
//! The synchronizer never touches the status sink or cancellation source
//! directly; the worker pool hands it a [`StatusObserver`] bound to one task.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::SyncResult;
use crate::models::{BatchId, StatusRecordId, StatusUpdate};
use crate::store::{CancellationSource, StatusSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub progress_count: u64,
    pub expected_count: Option<u64>,
    pub stage: String,
}

impl SyncProgress {
    pub fn new(progress_count: u64, expected_count: Option<u64>, stage: impl Into<String>) -> Self {
        Self {
            progress_count,
            expected_count,
            stage: stage.into(),
        }
    }
}

/// Telemetry for one processed page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub page_number: u32,
    pub cursor: u64,
    pub new_cursor: u64,
    pub max_cursor: u64,
    pub documents: usize,
    pub persisted: usize,
    pub duplicates: usize,
    pub filtered_out: usize,
    pub skipped: usize,
    pub out_of_range_pages: u32,
}

#[async_trait]
pub trait SyncObserver: Send + Sync {
    /// Record progress; returns once the update is durable
    async fn on_progress(&self, progress: SyncProgress) -> SyncResult<()>;

    /// Whether the run should stop at the next loop iteration
    async fn is_cancelled(&self) -> bool;

    async fn on_page_info(&self, info: &PageInfo);
}

/// Observer that writes progress to the task's status record and reads the
/// task and batch cancellation flags.
pub struct StatusObserver {
    task_id: StatusRecordId,
    batch_id: BatchId,
    status: Arc<dyn StatusSink>,
    cancellation: Arc<dyn CancellationSource>,
}

impl StatusObserver {
    pub fn new(
        task_id: StatusRecordId,
        batch_id: BatchId,
        status: Arc<dyn StatusSink>,
        cancellation: Arc<dyn CancellationSource>,
    ) -> Self {
        Self {
            task_id,
            batch_id,
            status,
            cancellation,
        }
    }
}

impl std::fmt::Debug for StatusObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusObserver")
            .field("task_id", &self.task_id)
            .field("batch_id", &self.batch_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SyncObserver for StatusObserver {
    async fn on_progress(&self, progress: SyncProgress) -> SyncResult<()> {
        let update = StatusUpdate::progress(
            progress.progress_count,
            progress.expected_count,
            progress.stage,
        );
        self.status.update(self.task_id, &update).await?;
        Ok(())
    }

    async fn is_cancelled(&self) -> bool {
        self.cancellation.is_task_cancelled(self.task_id).await
            || self.cancellation.is_batch_cancelled(self.batch_id).await
    }

    async fn on_page_info(&self, info: &PageInfo) {
        debug!(
            task_id = %self.task_id,
            page = info.page_number,
            cursor = info.cursor,
            new_cursor = info.new_cursor,
            max_cursor = info.max_cursor,
            persisted = info.persisted,
            duplicates = info.duplicates,
            filtered_out = info.filtered_out,
            out_of_range_pages = info.out_of_range_pages,
            "📑 OBSERVER: Page processed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityRef, StatusRecord};
    use crate::store::{CancellationRegistry, InMemoryStatusSink};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_progress_is_written_and_batch_cancel_is_seen() {
        let sink = Arc::new(InMemoryStatusSink::new());
        let cancellation = Arc::new(CancellationRegistry::new());
        let batch_id = Uuid::new_v4();
        let record = StatusRecord::pending(batch_id, &EntityRef::new(1, "k", "n"));
        let id = record.id;
        sink.create(record).await.unwrap();

        let observer = StatusObserver::new(id, batch_id, sink.clone(), cancellation.clone());
        observer
            .on_progress(SyncProgress::new(25, Some(100), "Page 1"))
            .await
            .unwrap();

        let stored = sink.snapshot(id).unwrap();
        assert_eq!(stored.progress_count, 25);
        assert_eq!(stored.expected_count, Some(100));
        assert_eq!(stored.last_stage_description, "Page 1");

        assert!(!observer.is_cancelled().await);
        cancellation.cancel_batch(batch_id);
        assert!(observer.is_cancelled().await);
    }
}
