//! # Sync Engine
//!
//! Entry point that wires the collaborators, the shared circuit breaker, the
//! worker pool and the auto-resume supervisor together.
//!
//! ```rust,no_run
//! use docsync::config::EngineConfig;
//! use docsync::models::{EntityRef, SyncMode};
//! use docsync::orchestration::{EngineCollaborators, SyncEngine};
//! use uuid::Uuid;
//!
//! # async fn example(collaborators: EngineCollaborators) -> docsync::error::SyncResult<()> {
//! let engine = SyncEngine::new(EngineConfig::default(), collaborators)?;
//! let batch_id = Uuid::new_v4();
//! let tasks = engine
//!     .register_tasks(batch_id, vec![EntityRef::new(1, "12345678000190", "Acme")])
//!     .await?;
//! let report = engine.run_sync(batch_id, tasks, None, SyncMode::NewDocumentsOnly).await?;
//! println!("{} succeeded, {} failed", report.succeeded, report.failed);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use super::auto_resume::{AutoResumeSupervisor, ResumeReport};
use super::entity_sync::{DocumentLookup, EntitySynchronizer};
use crate::client::{DistributionTransport, PaginationClient};
use crate::config::{EngineConfig, ResumeConfig};
use crate::constants::system;
use crate::error::{SyncError, SyncResult};
use crate::execution::{SnapshotRegistry, TaskDisposition, TaskEngine, TaskResult};
use crate::models::{
    BatchId, BatchProgress, BatchReport, EngineSnapshot, EntityRef, StatusRecord, SyncMode,
    SyncTask, TaskPhase,
};
use crate::resilience::CircuitBreaker;
use crate::store::{CancellationSource, CredentialProvider, DocumentStore, StatusSink};

/// External collaborators the engine consumes
#[derive(Clone)]
pub struct EngineCollaborators {
    pub transport: Arc<dyn DistributionTransport>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub store: Arc<dyn DocumentStore>,
    pub status: Arc<dyn StatusSink>,
    pub cancellation: Arc<dyn CancellationSource>,
}

pub struct SyncEngine {
    config: EngineConfig,
    client: PaginationClient,
    collaborators: EngineCollaborators,
    breaker: Arc<CircuitBreaker>,
    engine: TaskEngine,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("breaker", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

/// A batch running in the background
#[derive(Debug)]
pub struct BatchHandle {
    pub batch_id: BatchId,
    snapshots: Arc<SnapshotRegistry>,
    join: JoinHandle<SyncResult<BatchReport>>,
}

impl BatchHandle {
    pub fn snapshot(&self) -> Option<EngineSnapshot> {
        self.snapshots.engine_snapshot(self.batch_id)
    }

    pub fn progress(&self) -> Option<BatchProgress> {
        self.snapshots.batch_progress(self.batch_id)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> SyncResult<BatchReport> {
        self.join
            .await
            .map_err(|e| SyncError::TaskPanicked(e.to_string()))?
    }
}

impl SyncEngine {
    /// Build an engine with its own process-wide breaker
    pub fn new(config: EngineConfig, collaborators: EngineCollaborators) -> SyncResult<Self> {
        let breaker = Arc::new(CircuitBreaker::new(system::ENGINE_NAME, &config.breaker));
        Self::with_breaker(config, collaborators, breaker)
    }

    /// Build an engine sharing an existing breaker
    pub fn with_breaker(
        config: EngineConfig,
        collaborators: EngineCollaborators,
        breaker: Arc<CircuitBreaker>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let client = PaginationClient::new(collaborators.transport.clone(), &config.client);
        let engine = TaskEngine::new(
            collaborators.status.clone(),
            collaborators.cancellation.clone(),
            breaker.clone(),
            Arc::new(SnapshotRegistry::new()),
            config.pool.clone(),
        );
        Ok(Self {
            config,
            client,
            collaborators,
            breaker,
            engine,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Create one pending status record per entity and return the tasks
    pub async fn register_tasks(
        &self,
        batch_id: BatchId,
        entities: Vec<EntityRef>,
    ) -> SyncResult<Vec<SyncTask>> {
        let mut tasks = Vec::with_capacity(entities.len());
        for entity in entities {
            let record = StatusRecord::pending(batch_id, &entity);
            let id = record.id;
            self.collaborators.status.create(record).await?;
            tasks.push(SyncTask::new(entity, id));
        }
        info!(batch_id = %batch_id, tasks = tasks.len(), "📝 ENGINE: Tasks registered");
        Ok(tasks)
    }

    /// Run a batch to completion, then auto-resume it when enabled
    pub async fn run_sync(
        &self,
        batch_id: BatchId,
        tasks: Vec<SyncTask>,
        concurrency: Option<usize>,
        mode: SyncMode,
    ) -> SyncResult<BatchReport> {
        let concurrency = concurrency.unwrap_or(self.config.pool.concurrency);
        if concurrency == 0 {
            return Err(SyncError::InvalidInput(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        let total = tasks.len();
        let unit = Arc::new(self.synchronizer(mode));
        let results = self
            .engine
            .run(batch_id, tasks, concurrency, unit.clone(), None)
            .await;
        if self.config.resume.enabled && results.iter().any(|r| !r.disposition.is_success()) {
            let supervisor = AutoResumeSupervisor::new(
                self.engine.clone(),
                self.collaborators.status.clone(),
                self.collaborators.cancellation.clone(),
                self.config.resume.clone(),
                concurrency,
            )?;
            supervisor.resume_failed(batch_id, unit).await?;
            return self.report_from_records(batch_id, total, started).await;
        }

        Ok(BatchReport {
            batch_id,
            total,
            succeeded: count(&results, TaskDisposition::Succeeded),
            failed: count(&results, TaskDisposition::Failed),
            cancelled: count(&results, TaskDisposition::Cancelled),
            discarded: count(&results, TaskDisposition::Discarded),
            elapsed: started.elapsed(),
        })
    }

    /// Run a batch on a background tokio task
    pub fn spawn_sync(
        self: &Arc<Self>,
        batch_id: BatchId,
        tasks: Vec<SyncTask>,
        concurrency: Option<usize>,
        mode: SyncMode,
    ) -> BatchHandle {
        let engine = Arc::clone(self);
        let join =
            tokio::spawn(async move { engine.run_sync(batch_id, tasks, concurrency, mode).await });
        BatchHandle {
            batch_id,
            snapshots: self.engine.snapshots().clone(),
            join,
        }
    }

    /// Run the auto-resume supervisor over a batch with an explicit policy
    pub async fn resume_failed(
        &self,
        batch_id: BatchId,
        config: ResumeConfig,
        mode: SyncMode,
    ) -> SyncResult<ResumeReport> {
        let supervisor = AutoResumeSupervisor::new(
            self.engine.clone(),
            self.collaborators.status.clone(),
            self.collaborators.cancellation.clone(),
            config,
            self.config.pool.concurrency,
        )?;
        supervisor
            .resume_failed(batch_id, Arc::new(self.synchronizer(mode)))
            .await
    }

    pub async fn fetch_single_document(
        &self,
        entity: &EntityRef,
        access_key: &str,
    ) -> SyncResult<DocumentLookup> {
        self.synchronizer(SyncMode::Manual)
            .fetch_single_document(entity, access_key)
            .await
    }

    pub fn engine_snapshot(&self, batch_id: BatchId) -> Option<EngineSnapshot> {
        self.engine.snapshots().engine_snapshot(batch_id)
    }

    pub fn batch_progress(&self, batch_id: BatchId) -> Option<BatchProgress> {
        self.engine.snapshots().batch_progress(batch_id)
    }

    fn synchronizer(&self, mode: SyncMode) -> EntitySynchronizer {
        EntitySynchronizer::new(
            self.client.clone(),
            self.collaborators.credentials.clone(),
            self.collaborators.store.clone(),
            self.collaborators.status.clone(),
            self.breaker.clone(),
            self.config.sync.clone(),
        )
        .with_mode(mode)
    }

    async fn report_from_records(
        &self,
        batch_id: BatchId,
        total: usize,
        started: Instant,
    ) -> SyncResult<BatchReport> {
        let records = self.collaborators.status.list_by_batch(batch_id).await?;
        let tally = |phase: TaskPhase| records.iter().filter(|r| r.phase == phase).count();
        let succeeded = tally(TaskPhase::Succeeded);
        let failed = tally(TaskPhase::Failed);
        let cancelled = tally(TaskPhase::Cancelled);
        Ok(BatchReport {
            batch_id,
            total,
            succeeded,
            failed,
            cancelled,
            // records removed by empty incremental runs
            discarded: total.saturating_sub(succeeded + failed + cancelled),
            elapsed: started.elapsed(),
        })
    }
}

fn count(results: &[TaskResult], disposition: TaskDisposition) -> usize {
    results.iter().filter(|r| r.disposition == disposition).count()
}
