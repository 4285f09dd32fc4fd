//! # Pagination Client
//!
//! Issues cursor-based page fetches against the distribution service. Each
//! call is retried internally on transient failures with exponential backoff
//! and surfaces a single normalized [`FetchError`] once the attempt budget is
//! spent.
//!
//! Rate-limit responses are retried like any other transient failure but are
//! *not* reported to the circuit breaker here: the count is returned on the
//! [`Page`] (or the error) so the orchestrator can report it.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::decoder::decode_document;
use super::traits::{AmbientParams, DistributionQuery, DistributionRequest, DistributionTransport, RawPage};
use crate::config::ClientConfig;
use crate::constants::status_codes;
use crate::error::{FetchError, FetchErrorKind};
use crate::models::{FetchedDocument, Page, PageStatus};
use crate::store::Credential;

/// Result of a lookup by access key
#[derive(Debug, Clone, PartialEq)]
pub struct AccessKeyLookup {
    pub document: Option<FetchedDocument>,
    /// Rate-limit responses absorbed by retries before the lookup succeeded
    pub rate_limit_hits: u32,
}

#[derive(Clone)]
pub struct PaginationClient {
    transport: Arc<dyn DistributionTransport>,
    ambient: AmbientParams,
    max_attempts: u32,
    backoff_base: Duration,
}

impl std::fmt::Debug for PaginationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationClient")
            .field("ambient", &self.ambient)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base", &self.backoff_base)
            .finish_non_exhaustive()
    }
}

impl PaginationClient {
    pub fn new(transport: Arc<dyn DistributionTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            ambient: AmbientParams::from(config),
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
        }
    }

    /// Fetch the page of documents following `cursor`
    pub async fn fetch_page(
        &self,
        credential: &Credential,
        identity_key: &str,
        cursor: u64,
    ) -> Result<Page, FetchError> {
        let request = DistributionRequest {
            identity_key: identity_key.to_string(),
            query: DistributionQuery::ByCursor(cursor),
            ambient: self.ambient.clone(),
        };
        let (raw, rate_limit_hits) = self.send_with_retry(credential, &request).await?;
        Ok(Self::interpret(raw, rate_limit_hits))
    }

    /// Fetch a single document by its access key.
    ///
    /// `document` is `None` when the service reports no document for the key.
    pub async fn fetch_by_access_key(
        &self,
        credential: &Credential,
        identity_key: &str,
        access_key: &str,
    ) -> Result<AccessKeyLookup, FetchError> {
        let request = DistributionRequest {
            identity_key: identity_key.to_string(),
            query: DistributionQuery::ByAccessKey(access_key.to_string()),
            ambient: self.ambient.clone(),
        };
        let (raw, rate_limit_hits) = self.send_with_retry(credential, &request).await?;
        let page = Self::interpret(raw, rate_limit_hits);

        if page.raw_document_count > 0 && page.documents.is_empty() {
            return Err(FetchError {
                kind: FetchErrorKind::Decode,
                attempts: 1,
                rate_limit_hits,
                message: format!("document {access_key} could not be decoded"),
            });
        }
        Ok(AccessKeyLookup {
            document: page.documents.into_iter().next(),
            rate_limit_hits,
        })
    }

    /// Backoff before attempt `attempt + 1`: `base * 2^(attempt-1)`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }

    async fn send_with_retry(
        &self,
        credential: &Credential,
        request: &DistributionRequest,
    ) -> Result<(RawPage, u32), FetchError> {
        let mut rate_limit_hits = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = match self.transport.send(credential, request).await {
                Ok(raw) => Self::check_status(raw),
                Err(error) => Err(error),
            };

            let error = match outcome {
                Ok(raw) => return Ok((raw, rate_limit_hits)),
                Err(error) => error,
            };

            if error.kind == FetchErrorKind::RateLimited {
                rate_limit_hits += 1;
            }

            if !error.kind.is_transient() || attempt >= self.max_attempts {
                warn!(
                    identity_key = %request.identity_key,
                    attempt = attempt,
                    kind = %error.kind,
                    "❌ CLIENT: Fetch failed: {}",
                    error.message
                );
                return Err(FetchError {
                    kind: error.kind,
                    attempts: attempt,
                    rate_limit_hits,
                    message: error.message,
                });
            }

            let delay = self.backoff_for(attempt);
            debug!(
                identity_key = %request.identity_key,
                attempt = attempt,
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "🔁 CLIENT: Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Reject status codes outside the protocol's success pair
    fn check_status(raw: RawPage) -> Result<RawPage, FetchError> {
        match raw.status_code {
            status_codes::NO_DOCUMENTS | status_codes::DOCUMENTS_FOUND => Ok(raw),
            status_codes::IMPROPER_CONSUMPTION => Err(FetchError::new(
                FetchErrorKind::RateLimited,
                format!("{}: {}", raw.status_code, raw.status_message),
            )),
            other => Err(FetchError::new(
                FetchErrorKind::Protocol(other),
                format!("{other}: {}", raw.status_message),
            )),
        }
    }

    fn interpret(raw: RawPage, rate_limit_hits: u32) -> Page {
        let status = if raw.status_code == status_codes::DOCUMENTS_FOUND {
            PageStatus::DocumentsFound
        } else {
            PageStatus::NoDocuments
        };

        let raw_document_count = raw.documents.len();
        let mut documents = Vec::with_capacity(raw_document_count);
        let mut skipped_documents = 0;
        for document in &raw.documents {
            match decode_document(document) {
                Ok(decoded) => documents.push(decoded),
                Err(e) => {
                    skipped_documents += 1;
                    warn!(
                        cursor = document.cursor,
                        schema = ?document.schema,
                        "⚠️ CLIENT: Skipping undecodable document: {}",
                        e
                    );
                }
            }
        }

        Page {
            status,
            status_code: raw.status_code,
            documents,
            new_cursor: raw.last_cursor,
            max_cursor: raw.max_cursor,
            raw_document_count,
            skipped_documents,
            rate_limit_hits,
        }
    }
}
