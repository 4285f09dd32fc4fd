//! # System Constants
//!
//! Protocol status codes and the default tunables of the synchronization engine.

/// Status codes of the distribution protocol.
pub mod status_codes {
    /// No documents are available from the requested cursor
    pub const NO_DOCUMENTS: u16 = 137;
    /// Documents were found and returned in the page
    pub const DOCUMENTS_FOUND: u16 = 138;
    /// Improper consumption: the service's rate-limit response
    pub const IMPROPER_CONSUMPTION: u16 = 656;
}

/// Default values used by [`crate::config::EngineConfig`].
pub mod defaults {
    pub const CONCURRENCY: usize = 4;
    pub const TASK_TIMEOUT_SECONDS: u64 = 180;
    pub const INTER_TASK_DELAY_MS: u64 = 500;
    pub const WORKER_STAGGER_MS: u64 = 250;

    pub const BREAKER_BASE_DELAY_SECONDS: u64 = 30;
    pub const BREAKER_MAX_DELAY_SECONDS: u64 = 900;

    pub const FETCH_MAX_ATTEMPTS: u32 = 3;
    pub const FETCH_BACKOFF_BASE_MS: u64 = 3_000;

    pub const INTER_PAGE_DELAY_MS: u64 = 400;
    pub const OUT_OF_RANGE_PAGE_THRESHOLD: u32 = 3;
    pub const START_CURSOR_SAFETY_MARGIN: u64 = 1;

    pub const RESUME_MAX_ROUNDS: u32 = 3;
    pub const RESUME_ROUND_DELAY_SECONDS: u64 = 30;
    pub const RESUME_UNBOUNDED_DELAY_FLOOR_SECONDS: u64 = 120;
    pub const RESUME_UNBOUNDED_ROUND_CAP: u32 = 10_000;
    pub const RESUME_CANCEL_POLL_MS: u64 = 1_000;
}

/// Limits enforced regardless of configuration.
pub mod system {
    /// Longest error text stored on a status record
    pub const MAX_ERROR_MESSAGE_LEN: usize = 500;
    /// Upper bound for `resume.max_rounds` in bounded mode
    pub const MAX_BOUNDED_RESUME_ROUNDS: u32 = 10;
    pub const ENGINE_NAME: &str = "docsync";
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
