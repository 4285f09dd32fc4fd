//! # Error Types
//!
//! Typed failures for the synchronization engine. The transport layer tags each
//! failure with a [`FetchErrorKind`] at the point it happens, so downstream
//! classification never has to inspect message text.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigurationError;

/// Kind of a failed remote call, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Request did not complete in time
    Timeout,
    /// Connection refused, reset or otherwise broken
    Connection,
    /// Remote answered with a server-side error (HTTP status)
    Server(u16),
    /// Remote is rate limiting this client
    RateLimited,
    /// Remote refused the client credential (TLS handshake or auth fault)
    CredentialRejected,
    /// Remote answered with a status code that is not part of the protocol
    Protocol(u16),
    /// Response envelope could not be decoded
    Decode,
}

impl FetchErrorKind {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchErrorKind::Timeout
                | FetchErrorKind::Connection
                | FetchErrorKind::Server(_)
                | FetchErrorKind::RateLimited
        )
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchErrorKind::Timeout => write!(f, "timeout"),
            FetchErrorKind::Connection => write!(f, "connection"),
            FetchErrorKind::Server(code) => write!(f, "server error {code}"),
            FetchErrorKind::RateLimited => write!(f, "rate limited"),
            FetchErrorKind::CredentialRejected => write!(f, "credential rejected"),
            FetchErrorKind::Protocol(code) => write!(f, "protocol status {code}"),
            FetchErrorKind::Decode => write!(f, "decode"),
        }
    }
}

/// Normalized failure of a page or document fetch after the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Fetch failed ({kind}) after {attempts} attempt(s): {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub attempts: u32,
    /// Number of attempts that were answered with a rate-limit signal
    pub rate_limit_hits: u32,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            attempts: 1,
            rate_limit_hits: u32::from(kind == FetchErrorKind::RateLimited),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("No active credential for entity {entity_id}")]
    CredentialMissing { entity_id: i64 },
    #[error("Credential for entity {entity_id} has expired")]
    CredentialExpired { entity_id: i64 },
    #[error("Credential invalid: {0}")]
    CredentialInvalid(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Cursor did not advance past {cursor} (remote returned {new_cursor})")]
    CursorStalled { cursor: u64, new_cursor: u64 },
    #[error("Store error: {0}")]
    Store(String),
    #[error("Status sink error: {0}")]
    StatusSink(String),
    #[error("Task exceeded timeout of {0:?}")]
    TaskTimeout(Duration),
    #[error("Task panicked: {0}")]
    TaskPanicked(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SyncError {
    /// Rate-limit responses observed while producing this error.
    pub fn rate_limit_hits(&self) -> u32 {
        match self {
            SyncError::Fetch(fetch) => fetch
                .rate_limit_hits
                .max(u32::from(fetch.kind == FetchErrorKind::RateLimited)),
            _ => 0,
        }
    }
}

impl From<ConfigurationError> for SyncError {
    fn from(error: ConfigurationError) -> Self {
        SyncError::Configuration(error.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
