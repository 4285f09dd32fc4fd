#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # DocSync Core
//!
//! Concurrent, rate-limit-aware synchronization engine for cursor-paginated
//! fiscal document distribution services.
//!
//! ## Overview
//!
//! A batch of entities is drained by a bounded worker pool. Each entity is
//! synchronized by walking the remote cursor from its persisted watermark,
//! deduplicating documents against the store and committing the watermark
//! page by page. A process-wide circuit breaker pauses every worker while the
//! remote service is rate limiting, and an auto-resume supervisor re-queues
//! failed tasks in rounds.
//!
//! ## Module Organization
//!
//! - [`models`] - tasks, cursors, documents, status records and snapshots
//! - [`client`] - transport seam, payload decoding and the retrying pagination client
//! - [`store`] - collaborator traits and in-memory implementations
//! - [`resilience`] - the rate-limit circuit breaker
//! - [`execution`] - the worker pool and its telemetry
//! - [`orchestration`] - entity synchronization, classification, auto-resume, engine facade
//! - [`config`] - layered configuration
//! - [`error`] - typed errors
//! - [`logging`] - structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docsync::config::ConfigManager;
//! use docsync::models::{EntityRef, SyncMode};
//! use docsync::orchestration::{EngineCollaborators, SyncEngine};
//! use uuid::Uuid;
//!
//! # async fn example(collaborators: EngineCollaborators) -> Result<(), Box<dyn std::error::Error>> {
//! docsync::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//! let engine = SyncEngine::new(manager.config().clone(), collaborators)?;
//!
//! let batch_id = Uuid::new_v4();
//! let tasks = engine
//!     .register_tasks(batch_id, vec![EntityRef::new(1, "12345678000190", "Acme")])
//!     .await?;
//! let report = engine.run_sync(batch_id, tasks, Some(4), SyncMode::NewDocumentsOnly).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod store;

pub use config::{ConfigManager, EngineConfig};
pub use error::{FetchError, FetchErrorKind, SyncError, SyncResult};
pub use execution::{TaskEngine, UnitOfWork};
pub use orchestration::{BatchHandle, EngineCollaborators, SyncEngine};
pub use resilience::CircuitBreaker;
