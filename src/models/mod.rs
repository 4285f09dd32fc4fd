//! # Data Model
//!
//! Value types shared by every component of the synchronization engine.
//!
//! - [`task`] - submitted units of work
//! - [`cursor`] - cursor watermarks, period filters and sync modes
//! - [`document`] - decoded documents and pages
//! - [`status`] - authoritative per-task progress records
//! - [`snapshot`] - live pool telemetry and batch summaries

pub mod cursor;
pub mod document;
pub mod snapshot;
pub mod status;
pub mod task;

pub use cursor::{CursorState, PeriodFilter, SyncMode};
pub use document::{FetchedDocument, Page, PageStatus};
pub use snapshot::{BatchProgress, BatchReport, EngineSnapshot};
pub use status::{StatusRecord, StatusUpdate, TaskPhase};
pub use task::{EntityRef, SyncTask};

/// Identifier of a batch of tasks submitted together
pub type BatchId = uuid::Uuid;

/// Identifier of a status record; doubles as the task identifier
pub type StatusRecordId = uuid::Uuid;

/// Identifier of a tenant-owned entity
pub type EntityId = i64;
