//! # Structured Logging Module
//!
//! Environment-aware structured logging for the synchronization engine.
//! Human-readable output in development and test, JSON in production.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if environment == "production" {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // An already-installed global subscriber is not an error
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("DOCSYNC_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for task lifecycle operations
pub fn log_task_operation(
    operation: &str,
    task_id: Option<&str>,
    entity_id: Option<i64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = task_id,
        entity_id = entity_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}

/// Log structured data for a fetched page
pub fn log_page_operation(
    entity_id: i64,
    cursor: u64,
    new_cursor: u64,
    max_cursor: u64,
    documents: usize,
    persisted: usize,
) {
    tracing::debug!(
        entity_id = entity_id,
        cursor = cursor,
        new_cursor = new_cursor,
        max_cursor = max_cursor,
        documents = documents,
        persisted = persisted,
        "📄 PAGE_OPERATION"
    );
}

/// Log structured data for rate-limit breaker transitions
pub fn log_breaker_event(event: &str, consecutive_failures: u32, pause_ms: u128) {
    tracing::warn!(
        event = %event,
        consecutive_failures = consecutive_failures,
        pause_ms = pause_ms as u64,
        timestamp = %Utc::now().to_rfc3339(),
        "🛡️ BREAKER_EVENT"
    );
}
