//! In-memory harness and scripted units of work.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use docsync::config::{BreakerConfig, EngineConfig, PoolConfig};
use docsync::error::{FetchError, FetchErrorKind, SyncError, SyncResult};
use docsync::execution::{SnapshotRegistry, TaskEngine, TaskOutcome, UnitOfWork};
use docsync::models::{BatchId, EntityId, EntityRef, StatusRecord, SyncTask};
use docsync::orchestration::{EngineCollaborators, SyncEngine, SyncObserver};
use docsync::resilience::CircuitBreaker;
use docsync::store::{
    CancellationRegistry, Credential, InMemoryCredentialProvider, InMemoryDocumentStore,
    InMemoryStatusSink, StatusSink,
};

use super::distribution::SyntheticDistribution;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Identity key used for an entity throughout the tests
pub fn identity_key(entity_id: EntityId) -> String {
    format!("{entity_id:014}")
}

/// Pool settings without pacing delays
pub fn unpaced_pool() -> PoolConfig {
    PoolConfig {
        inter_task_delay_ms: 0,
        worker_stagger_ms: 0,
        ..PoolConfig::default()
    }
}

pub struct Harness {
    pub transport: Arc<SyntheticDistribution>,
    pub credentials: Arc<InMemoryCredentialProvider>,
    pub store: Arc<InMemoryDocumentStore>,
    pub status: Arc<InMemoryStatusSink>,
    pub cancellation: Arc<CancellationRegistry>,
}

impl Harness {
    pub fn new(page_size: usize) -> Self {
        Self {
            transport: Arc::new(SyntheticDistribution::new(page_size)),
            credentials: Arc::new(InMemoryCredentialProvider::new()),
            store: Arc::new(InMemoryDocumentStore::new()),
            status: Arc::new(InMemoryStatusSink::new()),
            cancellation: Arc::new(CancellationRegistry::new()),
        }
    }

    /// Register an entity with a valid credential
    pub fn add_entity(&self, entity_id: EntityId) -> EntityRef {
        self.credentials
            .insert(Credential::new(entity_id, b"pkcs12-bytes".to_vec(), false));
        EntityRef::new(entity_id, identity_key(entity_id), format!("Entity {entity_id}"))
    }

    pub fn collaborators(&self) -> EngineCollaborators {
        EngineCollaborators {
            transport: self.transport.clone(),
            credentials: self.credentials.clone(),
            store: self.store.clone(),
            status: self.status.clone(),
            cancellation: self.cancellation.clone(),
        }
    }

    pub fn engine(&self, config: EngineConfig) -> SyncEngine {
        SyncEngine::new(config, self.collaborators()).unwrap()
    }

    pub fn record(&self, task: &SyncTask) -> Option<StatusRecord> {
        self.status.snapshot(task.task_id())
    }
}

/// A bare task engine over fresh in-memory status and cancellation stores
pub struct PoolHarness {
    pub status: Arc<InMemoryStatusSink>,
    pub cancellation: Arc<CancellationRegistry>,
    pub breaker: Arc<CircuitBreaker>,
    pub engine: TaskEngine,
}

impl PoolHarness {
    pub fn new(pool: PoolConfig) -> Self {
        let status = Arc::new(InMemoryStatusSink::new());
        let cancellation = Arc::new(CancellationRegistry::new());
        let breaker = Arc::new(CircuitBreaker::new("test", &BreakerConfig::default()));
        let engine = TaskEngine::new(
            status.clone(),
            cancellation.clone(),
            breaker.clone(),
            Arc::new(SnapshotRegistry::new()),
            pool,
        );
        Self {
            status,
            cancellation,
            breaker,
            engine,
        }
    }

    pub async fn register(&self, batch_id: BatchId, entity_ids: impl IntoIterator<Item = EntityId>) -> Vec<SyncTask> {
        let mut tasks = Vec::new();
        for entity_id in entity_ids {
            let entity = EntityRef::new(entity_id, identity_key(entity_id), "entity");
            let record = StatusRecord::pending(batch_id, &entity);
            let id = record.id;
            self.status.create(record).await.unwrap();
            tasks.push(SyncTask::new(entity, id));
        }
        tasks
    }
}

pub fn new_batch() -> BatchId {
    Uuid::new_v4()
}

/// Succeeds once an entity has been attempted `succeed_on_attempt[entity]` times
#[derive(Default)]
pub struct ScheduledUnit {
    succeed_on_attempt: HashMap<EntityId, u32>,
    attempts: DashMap<EntityId, u32>,
}

impl ScheduledUnit {
    pub fn new(schedule: impl IntoIterator<Item = (EntityId, u32)>) -> Self {
        Self {
            succeed_on_attempt: schedule.into_iter().collect(),
            attempts: DashMap::new(),
        }
    }

    /// A unit that never succeeds
    pub fn always_failing() -> Self {
        Self::default()
    }

    pub fn attempts(&self, entity_id: EntityId) -> u32 {
        self.attempts.get(&entity_id).map(|a| *a).unwrap_or(0)
    }
}

#[async_trait]
impl UnitOfWork for ScheduledUnit {
    async fn execute(&self, task: &SyncTask, _observer: Arc<dyn SyncObserver>) -> SyncResult<TaskOutcome> {
        let attempt = {
            let mut entry = self.attempts.entry(task.entity_id).or_insert(0);
            *entry += 1;
            *entry
        };
        match self.succeed_on_attempt.get(&task.entity_id) {
            Some(needed) if attempt >= *needed => Ok(TaskOutcome::Completed {
                new_documents: 1,
                stage: format!("Recovered on attempt {attempt}"),
            }),
            _ => Err(SyncError::Fetch(FetchError::new(
                FetchErrorKind::Server(503),
                "service unavailable",
            ))),
        }
    }
}

/// Behaviours for pool isolation tests, chosen per entity
pub enum Behaviour {
    Succeed,
    Panic,
    Hang,
    RateLimited,
}

pub struct BehaviourUnit {
    behaviours: HashMap<EntityId, Behaviour>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    executions: DashMap<EntityId, usize>,
    work_time: Duration,
}

impl BehaviourUnit {
    pub fn new(behaviours: impl IntoIterator<Item = (EntityId, Behaviour)>) -> Self {
        Self {
            behaviours: behaviours.into_iter().collect(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            executions: DashMap::new(),
            work_time: Duration::ZERO,
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_work_time(mut self, work_time: Duration) -> Self {
        self.work_time = work_time;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn executions(&self, entity_id: EntityId) -> usize {
        self.executions.get(&entity_id).map(|e| *e).unwrap_or(0)
    }

    pub fn total_executions(&self) -> usize {
        self.executions.iter().map(|e| *e.value()).sum()
    }
}

#[async_trait]
impl UnitOfWork for BehaviourUnit {
    async fn execute(&self, task: &SyncTask, _observer: Arc<dyn SyncObserver>) -> SyncResult<TaskOutcome> {
        *self.executions.entry(task.entity_id).or_insert(0) += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.work_time.is_zero() {
            tokio::time::sleep(self.work_time).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.behaviours.get(&task.entity_id).unwrap_or(&Behaviour::Succeed) {
            Behaviour::Succeed => Ok(TaskOutcome::Completed {
                new_documents: 0,
                stage: "done".to_string(),
            }),
            Behaviour::Panic => panic!("unit panicked for entity {}", task.entity_id),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                Ok(TaskOutcome::Completed {
                    new_documents: 0,
                    stage: "woke up".to_string(),
                })
            }
            Behaviour::RateLimited => Err(SyncError::Fetch(FetchError::new(
                FetchErrorKind::RateLimited,
                "656: consumo indevido",
            ))),
        }
    }
}
