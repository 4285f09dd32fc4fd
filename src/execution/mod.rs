//! # Execution
//!
//! The bounded worker pool and the telemetry it publishes.

pub mod snapshot_registry;
pub mod worker_pool;

pub use snapshot_registry::{SnapshotRegistry, TaskDisposition};
pub use worker_pool::{TaskCompletionListener, TaskEngine, TaskOutcome, TaskResult, UnitOfWork};
