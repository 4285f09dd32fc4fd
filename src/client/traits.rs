//! # Distribution Transport
//!
//! The seam between the pagination client and the wire. Implementations issue
//! exactly one remote call per `send` and tag every failure with a
//! [`FetchErrorKind`](crate::error::FetchErrorKind); retrying is the client's job.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, ServiceEnvironment};
use crate::error::FetchError;
use crate::store::Credential;

/// Parameters sent with every request regardless of query
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AmbientParams {
    pub environment: ServiceEnvironment,
    pub authority_code: Option<u16>,
}

impl From<&ClientConfig> for AmbientParams {
    fn from(config: &ClientConfig) -> Self {
        Self {
            environment: config.environment,
            authority_code: config.authority_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionQuery {
    /// Documents after the given cursor
    ByCursor(u64),
    /// One document identified by its access key
    ByAccessKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRequest {
    /// Identity key of the entity (tax ID)
    pub identity_key: String,
    pub query: DistributionQuery,
    pub ambient: AmbientParams,
}

/// Document exactly as returned by the service, still compressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub cursor: u64,
    pub schema: Option<String>,
    /// Access key if the envelope carries it; otherwise read from the payload
    pub access_key: Option<String>,
    /// Base64-encoded gzip payload
    pub compressed_payload: String,
    pub business_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    pub status_code: u16,
    pub status_message: String,
    pub documents: Vec<RawDocument>,
    /// Last cursor covered by this response
    pub last_cursor: u64,
    /// Highest cursor currently available for the entity
    pub max_cursor: u64,
}

#[async_trait]
pub trait DistributionTransport: Send + Sync {
    /// Issue one request to the distribution service
    async fn send(
        &self,
        credential: &Credential,
        request: &DistributionRequest,
    ) -> Result<RawPage, FetchError>;
}
