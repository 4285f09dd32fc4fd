//! # Engine Configuration
//!
//! Typed configuration for every component of the synchronization engine.
//! Each section carries defaults, so a configuration file only needs to name
//! the values it overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docsync::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().pool.task_timeout();
//! let concurrency = manager.config().pool.concurrency;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, system};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool sizing and pacing
    pub pool: PoolConfig,

    /// Process-wide rate-limit breaker
    pub breaker: BreakerConfig,

    /// Pagination client retry policy and ambient request parameters
    pub client: ClientConfig,

    /// Per-entity page loop tunables
    pub sync: SyncConfig,

    /// Auto-resume supervisor
    pub resume: ResumeConfig,
}

impl EngineConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pool.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "pool.concurrency",
                "must be at least 1",
            ));
        }
        if self.pool.task_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "pool.task_timeout_seconds",
                "must be at least 1",
            ));
        }
        if self.breaker.base_delay_seconds > self.breaker.max_delay_seconds {
            return Err(ConfigurationError::invalid_value(
                "breaker.base_delay_seconds",
                format!(
                    "{} exceeds breaker.max_delay_seconds ({})",
                    self.breaker.base_delay_seconds, self.breaker.max_delay_seconds
                ),
            ));
        }
        if self.client.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "client.max_attempts",
                "must be at least 1",
            ));
        }
        if self.sync.out_of_range_page_threshold == 0 {
            return Err(ConfigurationError::invalid_value(
                "sync.out_of_range_page_threshold",
                "must be at least 1",
            ));
        }
        self.resume.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub task_timeout_seconds: u64,
    pub inter_task_delay_ms: u64,
    pub worker_stagger_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::CONCURRENCY,
            task_timeout_seconds: defaults::TASK_TIMEOUT_SECONDS,
            inter_task_delay_ms: defaults::INTER_TASK_DELAY_MS,
            worker_stagger_ms: defaults::WORKER_STAGGER_MS,
        }
    }
}

impl PoolConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }

    pub fn inter_task_delay(&self) -> Duration {
        Duration::from_millis(self.inter_task_delay_ms)
    }

    pub fn worker_stagger(&self) -> Duration {
        Duration::from_millis(self.worker_stagger_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub base_delay_seconds: u64,
    pub max_delay_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            base_delay_seconds: defaults::BREAKER_BASE_DELAY_SECONDS,
            max_delay_seconds: defaults::BREAKER_MAX_DELAY_SECONDS,
        }
    }
}

impl BreakerConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_seconds)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_seconds)
    }
}

/// Remote service environment sent with every request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceEnvironment {
    #[default]
    Production,
    Homologation,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub environment: ServiceEnvironment,
    /// Code of the issuing authority the requests are addressed from
    pub authority_code: Option<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::FETCH_MAX_ATTEMPTS,
            backoff_base_ms: defaults::FETCH_BACKOFF_BASE_MS,
            environment: ServiceEnvironment::default(),
            authority_code: None,
        }
    }
}

impl ClientConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub inter_page_delay_ms: u64,
    pub out_of_range_page_threshold: u32,
    pub start_cursor_safety_margin: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            inter_page_delay_ms: defaults::INTER_PAGE_DELAY_MS,
            out_of_range_page_threshold: defaults::OUT_OF_RANGE_PAGE_THRESHOLD,
            start_cursor_safety_margin: defaults::START_CURSOR_SAFETY_MARGIN,
        }
    }
}

impl SyncConfig {
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    #[default]
    Bounded,
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResumeConfig {
    /// Run the supervisor automatically after `run_sync`
    pub enabled: bool,
    pub mode: ResumeMode,
    /// Round cap in bounded mode (1..=10)
    pub max_rounds: u32,
    /// Round cap in unbounded mode
    pub unbounded_round_cap: u32,
    pub round_delay_seconds: u64,
    /// Minimum inter-round delay in unbounded mode after a round that recovered nothing
    pub unbounded_delay_floor_seconds: u64,
    pub cancel_poll_ms: u64,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ResumeMode::default(),
            max_rounds: defaults::RESUME_MAX_ROUNDS,
            unbounded_round_cap: defaults::RESUME_UNBOUNDED_ROUND_CAP,
            round_delay_seconds: defaults::RESUME_ROUND_DELAY_SECONDS,
            unbounded_delay_floor_seconds: defaults::RESUME_UNBOUNDED_DELAY_FLOOR_SECONDS,
            cancel_poll_ms: defaults::RESUME_CANCEL_POLL_MS,
        }
    }
}

impl ResumeConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.mode == ResumeMode::Bounded
            && !(1..=system::MAX_BOUNDED_RESUME_ROUNDS).contains(&self.max_rounds)
        {
            return Err(ConfigurationError::invalid_value(
                "resume.max_rounds",
                format!(
                    "{} is outside 1..={}",
                    self.max_rounds,
                    system::MAX_BOUNDED_RESUME_ROUNDS
                ),
            ));
        }
        if self.mode == ResumeMode::Unbounded && self.unbounded_round_cap == 0 {
            return Err(ConfigurationError::invalid_value(
                "resume.unbounded_round_cap",
                "must be at least 1",
            ));
        }
        if self.cancel_poll_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "resume.cancel_poll_ms",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Total rounds the supervisor may run in the configured mode
    pub fn round_cap(&self) -> u32 {
        match self.mode {
            ResumeMode::Bounded => self.max_rounds,
            ResumeMode::Unbounded => self.unbounded_round_cap,
        }
    }

    /// Delay before the next round.
    ///
    /// In unbounded mode a round that recovered nothing raises the delay to
    /// the floor; otherwise the configured delay applies.
    pub fn round_delay(&self, previous_round_recovered: bool) -> Duration {
        let configured = self.round_delay_seconds;
        let seconds = match self.mode {
            ResumeMode::Unbounded if !previous_round_recovered => {
                configured.max(self.unbounded_delay_floor_seconds)
            }
            _ => configured,
        };
        Duration::from_secs(seconds)
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_ms)
    }
}
