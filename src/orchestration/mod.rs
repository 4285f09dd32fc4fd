//! # Sync Orchestration
//!
//! Everything above the worker pool: the per-entity synchronization state
//! machine, failure classification, batch auto-resume and the engine facade.
//!
//! ## Core Components
//!
//! - **EntitySynchronizer**: runs one entity's page loop and commits its watermark
//! - **SyncObserver**: progress, cancellation and page telemetry capability
//! - **StandardErrorClassifier**: maps typed failures to operator-facing categories
//! - **AutoResumeSupervisor**: re-queues failed tasks in bounded or unbounded rounds
//! - **SyncEngine**: registers tasks, runs batches and exposes live snapshots

pub mod auto_resume;
pub mod entity_sync;
pub mod error_classifier;
pub mod observer;
pub mod sync_engine;

pub use auto_resume::{AutoResumeSupervisor, ResumeReport, ResumeStopReason};
pub use entity_sync::{DocumentLookup, EntitySynchronizer, StopReason, SyncSummary};
pub use error_classifier::{
    ErrorClassifier, FailureCategory, FailureClassification, StandardErrorClassifier,
};
pub use observer::{PageInfo, StatusObserver, SyncObserver, SyncProgress};
pub use sync_engine::{BatchHandle, EngineCollaborators, SyncEngine};
