//! # Sync Failure Classification
//!
//! Maps a [`SyncError`] to a category, a stable error code and the message
//! written to the task's status record. Classification reads only the typed
//! error; message text is never inspected.
//!
//! ## Usage
//!
//! ```rust
//! use docsync::error::SyncError;
//! use docsync::orchestration::error_classifier::{
//!     ErrorClassifier, FailureCategory, StandardErrorClassifier,
//! };
//!
//! let classifier = StandardErrorClassifier::new();
//! let classification = classifier.classify_error(&SyncError::CredentialExpired { entity_id: 7 });
//!
//! assert_eq!(classification.category, FailureCategory::CredentialExpired);
//! assert!(classification.certificate_expired);
//! assert!(!classification.is_retryable);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{FetchErrorKind, SyncError};
use crate::models::status::truncate_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    CredentialExpired,
    CredentialInvalid,
    RateLimit,
    Transient,
    ProtocolAnomaly,
    Timeout,
    Storage,
    Unknown,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureCategory::CredentialExpired => "credential_expired",
            FailureCategory::CredentialInvalid => "credential_invalid",
            FailureCategory::RateLimit => "rate_limit",
            FailureCategory::Transient => "transient",
            FailureCategory::ProtocolAnomaly => "protocol_anomaly",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Storage => "storage",
            FailureCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureClassification {
    pub category: FailureCategory,
    /// Whether a later resume round may succeed without operator action
    pub is_retryable: bool,
    pub error_code: String,
    /// Operator-facing text, already truncated for storage
    pub operator_message: String,
    pub certificate_expired: bool,
}

pub trait ErrorClassifier: Send + Sync {
    fn classify_error(&self, error: &SyncError) -> FailureClassification;

    fn classifier_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardErrorClassifier;

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    fn build(
        category: FailureCategory,
        is_retryable: bool,
        error_code: &str,
        message: String,
    ) -> FailureClassification {
        FailureClassification {
            category,
            is_retryable,
            error_code: error_code.to_string(),
            operator_message: truncate_error(&message),
            certificate_expired: category == FailureCategory::CredentialExpired,
        }
    }

    fn classify_fetch(kind: FetchErrorKind, error: &SyncError) -> FailureClassification {
        match kind {
            FetchErrorKind::RateLimited => Self::build(
                FailureCategory::RateLimit,
                true,
                "RATE_LIMITED",
                format!("Rate limited by remote service: {error}"),
            ),
            FetchErrorKind::CredentialRejected => Self::build(
                FailureCategory::CredentialInvalid,
                false,
                "CREDENTIAL_REJECTED",
                format!("Credential rejected by remote service: {error}"),
            ),
            FetchErrorKind::Timeout | FetchErrorKind::Connection | FetchErrorKind::Server(_) => {
                Self::build(
                    FailureCategory::Transient,
                    true,
                    "TRANSIENT_FETCH_FAILURE",
                    error.to_string(),
                )
            }
            FetchErrorKind::Protocol(_) | FetchErrorKind::Decode => Self::build(
                FailureCategory::ProtocolAnomaly,
                false,
                "PROTOCOL_ANOMALY",
                error.to_string(),
            ),
        }
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify_error(&self, error: &SyncError) -> FailureClassification {
        match error {
            SyncError::CredentialExpired { .. } => Self::build(
                FailureCategory::CredentialExpired,
                false,
                "CREDENTIAL_EXPIRED",
                error.to_string(),
            ),
            SyncError::CredentialMissing { .. } | SyncError::CredentialInvalid(_) => Self::build(
                FailureCategory::CredentialInvalid,
                false,
                "CREDENTIAL_INVALID",
                error.to_string(),
            ),
            SyncError::Fetch(fetch) => Self::classify_fetch(fetch.kind, error),
            SyncError::CursorStalled { .. } => Self::build(
                FailureCategory::ProtocolAnomaly,
                true,
                "CURSOR_STALLED",
                error.to_string(),
            ),
            SyncError::TaskTimeout(_) => Self::build(
                FailureCategory::Timeout,
                true,
                "TASK_TIMEOUT",
                error.to_string(),
            ),
            SyncError::Store(_) | SyncError::StatusSink(_) => Self::build(
                FailureCategory::Storage,
                true,
                "STORAGE_FAILURE",
                error.to_string(),
            ),
            SyncError::TaskPanicked(_)
            | SyncError::Configuration(_)
            | SyncError::InvalidInput(_) => Self::build(
                FailureCategory::Unknown,
                false,
                "UNEXPECTED_FAILURE",
                error.to_string(),
            ),
        }
    }

    fn classifier_name(&self) -> &'static str {
        "standard"
    }
}
