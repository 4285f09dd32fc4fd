//! # Task Engine
//!
//! Bounded-concurrency worker pool that drains a batch of [`SyncTask`]s.
//!
//! Workers claim tasks through one shared atomic index, so every task is
//! claimed exactly once. Each claimed task is cancellation-checked, waits on
//! the process-wide [`CircuitBreaker`], is marked `running`, then runs its
//! [`UnitOfWork`] on a spawned tokio task under a hard timeout. A panic or a
//! timeout fails only that task. The pool writes every terminal transition to
//! the status sink, except for discarded tasks whose record the unit already
//! removed.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::snapshot_registry::{SnapshotRegistry, SnapshotTracker, TaskDisposition};
use crate::config::PoolConfig;
use crate::error::{SyncError, SyncResult};
use crate::logging::log_task_operation;
use crate::models::{BatchId, StatusUpdate, SyncTask};
use crate::orchestration::error_classifier::{
    ErrorClassifier, FailureClassification, StandardErrorClassifier,
};
use crate::orchestration::observer::{StatusObserver, SyncObserver};
use crate::resilience::CircuitBreaker;
use crate::store::{CancellationSource, StatusSink};

/// What a unit of work reports when it returns normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { new_documents: u64, stage: String },
    /// Nothing to report; the unit removed the task's status record
    Discarded,
    /// Stopped early on a cancellation request
    Cancelled { stage: String },
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn execute(
        &self,
        task: &SyncTask,
        observer: Arc<dyn SyncObserver>,
    ) -> SyncResult<TaskOutcome>;
}

/// Final state of one task in a pool run
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub task: SyncTask,
    pub disposition: TaskDisposition,
    pub new_documents: u64,
    pub failure: Option<FailureClassification>,
    pub elapsed: Duration,
}

#[async_trait]
pub trait TaskCompletionListener: Send + Sync {
    async fn on_task_done(&self, result: &TaskResult);
}

#[derive(Clone)]
pub struct TaskEngine {
    status: Arc<dyn StatusSink>,
    cancellation: Arc<dyn CancellationSource>,
    breaker: Arc<CircuitBreaker>,
    snapshots: Arc<SnapshotRegistry>,
    classifier: Arc<dyn ErrorClassifier>,
    config: PoolConfig,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("breaker", &self.breaker.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Shared state of one `run` call
struct PoolRun {
    engine: TaskEngine,
    batch_id: BatchId,
    tasks: Vec<SyncTask>,
    next_index: AtomicUsize,
    unit: Arc<dyn UnitOfWork>,
    listener: Option<Arc<dyn TaskCompletionListener>>,
    tracker: SnapshotTracker,
    results: Mutex<Vec<TaskResult>>,
}

impl TaskEngine {
    pub fn new(
        status: Arc<dyn StatusSink>,
        cancellation: Arc<dyn CancellationSource>,
        breaker: Arc<CircuitBreaker>,
        snapshots: Arc<SnapshotRegistry>,
        config: PoolConfig,
    ) -> Self {
        Self {
            status,
            cancellation,
            breaker,
            snapshots,
            classifier: Arc::new(StandardErrorClassifier::new()),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn snapshots(&self) -> &Arc<SnapshotRegistry> {
        &self.snapshots
    }

    /// Run every task to a terminal state with at most `concurrency` in flight.
    ///
    /// Returns one [`TaskResult`] per task, in completion order. An empty task
    /// list returns immediately.
    pub async fn run(
        &self,
        batch_id: BatchId,
        tasks: Vec<SyncTask>,
        concurrency: usize,
        unit: Arc<dyn UnitOfWork>,
        listener: Option<Arc<dyn TaskCompletionListener>>,
    ) -> Vec<TaskResult> {
        if tasks.is_empty() {
            debug!(batch_id = %batch_id, "🏁 ENGINE: No tasks submitted");
            return Vec::new();
        }

        let total = tasks.len();
        let worker_count = concurrency.clamp(1, total);
        info!(
            batch_id = %batch_id,
            tasks = total,
            workers = worker_count,
            "🚀 ENGINE: Starting pool run"
        );

        let run = Arc::new(PoolRun {
            engine: self.clone(),
            batch_id,
            tasks,
            next_index: AtomicUsize::new(0),
            unit,
            listener,
            tracker: SnapshotTracker::new(batch_id, total, self.snapshots.clone()),
            results: Mutex::new(Vec::with_capacity(total)),
        });

        let stagger = self.config.worker_stagger();
        let mut workers = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            if worker_index > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            let run = run.clone();
            workers.push(tokio::spawn(async move { run.worker_loop(worker_index).await }));
        }

        for joined in join_all(workers).await {
            if let Err(e) = joined {
                error!(batch_id = %batch_id, "❌ ENGINE: Worker terminated abnormally: {}", e);
            }
        }

        let snapshot = run.tracker.current();
        info!(
            batch_id = %batch_id,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            cancelled = snapshot.cancelled,
            "🏁 ENGINE: Pool run finished"
        );

        let results = std::mem::take(&mut *run.results.lock());
        results
    }
}

impl PoolRun {
    async fn worker_loop(&self, worker_index: usize) {
        debug!(batch_id = %self.batch_id, worker = worker_index, "👷 ENGINE: Worker started");
        let inter_task_delay = self.engine.config.inter_task_delay();

        loop {
            let index = self.next_index.fetch_add(1, Ordering::SeqCst);
            let Some(task) = self.tasks.get(index) else {
                break;
            };

            let result = self.process(task).await;
            if let Some(listener) = &self.listener {
                listener.on_task_done(&result).await;
            }
            self.results.lock().push(result);

            if !inter_task_delay.is_zero() && self.next_index.load(Ordering::SeqCst) < self.tasks.len() {
                tokio::time::sleep(inter_task_delay).await;
            }
        }

        debug!(batch_id = %self.batch_id, worker = worker_index, "👷 ENGINE: Worker drained");
    }

    async fn process(&self, task: &SyncTask) -> TaskResult {
        let engine = &self.engine;
        let task_id = task.task_id();
        let started = Instant::now();

        if engine.cancellation.is_task_cancelled(task_id).await
            || engine.cancellation.is_batch_cancelled(self.batch_id).await
        {
            self.write_status(task, &StatusUpdate::cancelled("Cancelled before start"))
                .await;
            self.tracker
                .task_finished(task_id, false, TaskDisposition::Cancelled);
            return self.result(task, TaskDisposition::Cancelled, 0, None, started);
        }

        engine.breaker.wait_if_needed().await;

        match engine.status.update(task_id, &StatusUpdate::running()).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(task_id = %task_id, "⚠️ ENGINE: Status record missing at start"),
            Err(e) => warn!(task_id = %task_id, "⚠️ ENGINE: Could not mark task running: {}", e),
        }
        self.tracker.task_started(task_id);
        log_task_operation(
            "start",
            Some(&task_id.to_string()),
            Some(task.entity_id),
            "running",
            None,
        );

        let outcome = self.execute_isolated(task).await;

        let (disposition, new_documents, failure) = match outcome {
            Ok(TaskOutcome::Completed {
                new_documents,
                stage,
            }) => {
                engine.breaker.on_success();
                self.write_status(task, &StatusUpdate::succeeded(new_documents, stage))
                    .await;
                (TaskDisposition::Succeeded, new_documents, None)
            }
            Ok(TaskOutcome::Discarded) => {
                engine.breaker.on_success();
                (TaskDisposition::Discarded, 0, None)
            }
            Ok(TaskOutcome::Cancelled { stage }) => {
                self.write_status(task, &StatusUpdate::cancelled(stage)).await;
                (TaskDisposition::Cancelled, 0, None)
            }
            Err(e) => {
                engine.breaker.record_rate_limits(e.rate_limit_hits());
                let classification = engine.classifier.classify_error(&e);
                self.write_status(
                    task,
                    &StatusUpdate::failed(
                        &classification.operator_message,
                        classification.certificate_expired,
                    ),
                )
                .await;
                (TaskDisposition::Failed, 0, Some(classification))
            }
        };

        self.tracker.task_finished(task_id, true, disposition);
        log_task_operation(
            "finish",
            Some(&task_id.to_string()),
            Some(task.entity_id),
            match disposition {
                TaskDisposition::Succeeded => "succeeded",
                TaskDisposition::Failed => "failed",
                TaskDisposition::Cancelled => "cancelled",
                TaskDisposition::Discarded => "discarded",
            },
            failure.as_ref().map(|f| f.operator_message.as_str()),
        );
        self.result(task, disposition, new_documents, failure, started)
    }

    /// Run the unit on its own tokio task so a panic or a timeout stays local
    async fn execute_isolated(&self, task: &SyncTask) -> SyncResult<TaskOutcome> {
        let engine = &self.engine;
        let timeout = engine.config.task_timeout();
        let observer: Arc<dyn SyncObserver> = Arc::new(StatusObserver::new(
            task.task_id(),
            self.batch_id,
            engine.status.clone(),
            engine.cancellation.clone(),
        ));

        let unit = self.unit.clone();
        let owned_task = task.clone();
        let mut handle =
            tokio::spawn(async move { unit.execute(&owned_task, observer).await });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!(task_id = %task.task_id(), "💥 ENGINE: Task panicked: {}", join_error);
                Err(SyncError::TaskPanicked(join_error.to_string()))
            }
            Err(_) => {
                handle.abort();
                warn!(
                    task_id = %task.task_id(),
                    timeout_secs = timeout.as_secs(),
                    "⏰ ENGINE: Task timed out"
                );
                Err(SyncError::TaskTimeout(timeout))
            }
        }
    }

    async fn write_status(&self, task: &SyncTask, update: &StatusUpdate) {
        match self.engine.status.update(task.task_id(), update).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                task_id = %task.task_id(),
                phase = ?update.phase,
                "⚠️ ENGINE: Status record missing for terminal update"
            ),
            Err(e) => error!(
                task_id = %task.task_id(),
                phase = ?update.phase,
                "❌ ENGINE: Failed to write status: {}",
                e
            ),
        }
    }

    fn result(
        &self,
        task: &SyncTask,
        disposition: TaskDisposition,
        new_documents: u64,
        failure: Option<FailureClassification>,
        started: Instant,
    ) -> TaskResult {
        TaskResult {
            task: task.clone(),
            disposition,
            new_documents,
            failure,
            elapsed: started.elapsed(),
        }
    }
}
