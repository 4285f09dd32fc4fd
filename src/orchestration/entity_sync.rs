//! # Entity Synchronizer
//!
//! Runs one entity's synchronization end to end: credential check, start
//! cursor, the page loop with its stop conditions, deduplicated persistence
//! and watermark commits.
//!
//! ## Page loop
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────┐   ┌─────────────────┐
//! │ cancelled? │──▶│ breaker wait │──▶│ fetch page│──▶│ filter + dedup  │
//! └────────────┘   └──────────────┘   └───────────┘   │ persist + commit│
//!       ▲                                             └────────┬────────┘
//!       └──────────────── inter-page delay ◀── no stop cond. ──┘
//! ```
//!
//! The loop stops when the remote reports no documents, when the cursor
//! reaches the maximum cursor, when cancellation is observed, or after a run
//! of consecutive pages dated entirely after the period end. In
//! watermark-driven modes the watermark is committed after every page, so an
//! interrupted run resumes where it stopped.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::PaginationClient;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::execution::{TaskOutcome, UnitOfWork};
use crate::logging::log_page_operation;
use crate::models::{CursorState, EntityRef, FetchedDocument, SyncMode, SyncTask};
use crate::orchestration::observer::{PageInfo, SyncObserver, SyncProgress};
use crate::resilience::CircuitBreaker;
use crate::store::{Credential, CredentialProvider, DocumentStore, StatusSink};

/// Why the page loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    NoDocuments,
    ReachedMaxCursor,
    EarlyTermination,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub start_cursor: u64,
    pub final_cursor: u64,
    pub max_cursor: u64,
    pub pages: u32,
    pub new_documents: u64,
    pub duplicates: u64,
    pub filtered_out: u64,
    pub skipped_documents: u64,
    pub stop_reason: StopReason,
}

impl SyncSummary {
    fn new(start_cursor: u64, max_cursor: u64) -> Self {
        Self {
            start_cursor,
            final_cursor: start_cursor,
            max_cursor,
            pages: 0,
            new_documents: 0,
            duplicates: 0,
            filtered_out: 0,
            skipped_documents: 0,
            stop_reason: StopReason::NoDocuments,
        }
    }

    fn stage_description(&self) -> String {
        match self.stop_reason {
            StopReason::Cancelled => format!(
                "Cancelled after {} page(s), {} new document(s)",
                self.pages, self.new_documents
            ),
            StopReason::EarlyTermination => format!(
                "Completed: {} new document(s), stopped past period end at cursor {}",
                self.new_documents, self.final_cursor
            ),
            _ => format!(
                "Completed: {} new document(s) up to cursor {}",
                self.new_documents, self.final_cursor
            ),
        }
    }
}

/// Result of a single-document lookup by access key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLookup {
    NotFound,
    AlreadyStored(FetchedDocument),
    Persisted(FetchedDocument),
}

#[derive(Clone)]
pub struct EntitySynchronizer {
    client: PaginationClient,
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<dyn DocumentStore>,
    status: Arc<dyn StatusSink>,
    breaker: Arc<CircuitBreaker>,
    config: SyncConfig,
    mode: SyncMode,
}

impl std::fmt::Debug for EntitySynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySynchronizer")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl EntitySynchronizer {
    pub fn new(
        client: PaginationClient,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn DocumentStore>,
        status: Arc<dyn StatusSink>,
        breaker: Arc<CircuitBreaker>,
        config: SyncConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            store,
            status,
            breaker,
            config,
            mode: SyncMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> &SyncMode {
        &self.mode
    }

    /// Synchronize one entity and report what happened
    pub async fn synchronize(
        &self,
        task: &SyncTask,
        observer: &dyn SyncObserver,
    ) -> SyncResult<SyncSummary> {
        let credential = self.valid_credential(task.entity_id).await?;
        let state = self.store.watermark(task.entity_id).await?;
        let start_cursor = self.determine_start_cursor(task, &state).await?;

        info!(
            entity_id = task.entity_id,
            mode = self.mode.label(),
            watermark = state.last_seen_cursor,
            start_cursor = start_cursor,
            "🔄 SYNC: Starting entity synchronization"
        );

        let mut summary = SyncSummary::new(start_cursor, state.max_known_cursor);
        observer
            .on_progress(SyncProgress::new(
                0,
                self.expected_count(&summary),
                "Fetching documents",
            ))
            .await?;

        self.page_loop(task, &credential, observer, &mut summary)
            .await?;

        info!(
            entity_id = task.entity_id,
            pages = summary.pages,
            new_documents = summary.new_documents,
            duplicates = summary.duplicates,
            filtered_out = summary.filtered_out,
            final_cursor = summary.final_cursor,
            stop_reason = ?summary.stop_reason,
            "✅ SYNC: Entity synchronization finished"
        );
        Ok(summary)
    }

    /// Fetch one document by access key and store it if it is new
    pub async fn fetch_single_document(
        &self,
        entity: &EntityRef,
        access_key: &str,
    ) -> SyncResult<DocumentLookup> {
        let credential = self.valid_credential(entity.entity_id).await?;
        self.breaker.wait_if_needed().await;

        let lookup = match self
            .client
            .fetch_by_access_key(&credential, &entity.external_key, access_key)
            .await
        {
            Ok(lookup) => lookup,
            Err(e) => {
                self.breaker.record_rate_limits(e.rate_limit_hits);
                return Err(e.into());
            }
        };
        self.breaker.record_rate_limits(lookup.rate_limit_hits);

        let Some(document) = lookup.document else {
            debug!(entity_id = entity.entity_id, access_key = %access_key, "🔍 SYNC: Document not found");
            return Ok(DocumentLookup::NotFound);
        };

        let existing = self
            .store
            .existing_keys(entity.entity_id, std::slice::from_ref(&document.access_key))
            .await?;
        if existing.contains(&document.access_key) {
            return Ok(DocumentLookup::AlreadyStored(document));
        }

        self.store.persist_document(entity.entity_id, &document).await?;
        info!(entity_id = entity.entity_id, access_key = %access_key, "💾 SYNC: Single document persisted");
        Ok(DocumentLookup::Persisted(document))
    }

    async fn valid_credential(&self, entity_id: i64) -> SyncResult<Credential> {
        let credential = self
            .credentials
            .active_valid_credential(entity_id)
            .await?
            .ok_or(SyncError::CredentialMissing { entity_id })?;

        if credential.has_expired() {
            return Err(SyncError::CredentialExpired { entity_id });
        }
        if credential.material().is_empty() {
            return Err(SyncError::CredentialInvalid(format!(
                "credential for entity {entity_id} carries no key material"
            )));
        }
        Ok(credential)
    }

    /// Start near the period start when the store knows a matching document,
    /// never above the watermark; otherwise start from the watermark.
    async fn determine_start_cursor(&self, task: &SyncTask, state: &CursorState) -> SyncResult<u64> {
        let Some(start_date) = self.mode.period_filter().and_then(|f| f.start_date) else {
            return Ok(state.last_seen_cursor);
        };
        let end_date = self.mode.period_filter().and_then(|f| f.end_date);

        match self
            .store
            .min_cursor_for_date(task.entity_id, start_date, end_date)
            .await?
        {
            Some(known) => {
                let smart = known.saturating_sub(self.config.start_cursor_safety_margin);
                debug!(
                    entity_id = task.entity_id,
                    known_cursor = known,
                    smart_cursor = smart,
                    "🎯 SYNC: Smart start cursor from stored documents"
                );
                Ok(smart.min(state.last_seen_cursor))
            }
            None => Ok(state.last_seen_cursor),
        }
    }

    async fn page_loop(
        &self,
        task: &SyncTask,
        credential: &Credential,
        observer: &dyn SyncObserver,
        summary: &mut SyncSummary,
    ) -> SyncResult<()> {
        let entity_id = task.entity_id;
        let period = self.mode.period_filter().copied();
        let threshold = self.config.out_of_range_page_threshold.max(1);
        let inter_page_delay = self.config.inter_page_delay();
        let mut cursor = summary.start_cursor;
        let mut out_of_range_pages = 0u32;

        loop {
            if observer.is_cancelled().await {
                summary.stop_reason = StopReason::Cancelled;
                break;
            }

            self.breaker.wait_if_needed().await;
            let page = self
                .client
                .fetch_page(credential, &task.external_key, cursor)
                .await?;
            summary.pages += 1;
            // hits on a failed fetch are reported by the pool with the task failure
            self.breaker.record_rate_limits(page.rate_limit_hits);
            summary.max_cursor = summary.max_cursor.max(page.max_cursor);

            if !page.has_documents() {
                let reported = page.new_cursor.max(cursor);
                if self.mode.advances_watermark() {
                    self.store
                        .set_watermark(entity_id, reported, summary.max_cursor)
                        .await?;
                }
                cursor = reported;
                summary.stop_reason = StopReason::NoDocuments;
                break;
            }

            if page.new_cursor <= cursor {
                return Err(SyncError::CursorStalled {
                    cursor,
                    new_cursor: page.new_cursor,
                });
            }

            summary.skipped_documents += page.skipped_documents as u64;
            let (kept, filtered_out): (Vec<&FetchedDocument>, Vec<&FetchedDocument>) = page
                .documents
                .iter()
                .partition(|doc| period.map_or(true, |p| p.contains(doc.business_date)));

            if let Some(filter) = period.filter(|p| p.end_date.is_some()) {
                let all_after_end = !page.documents.is_empty()
                    && page.documents.iter().all(|doc| {
                        doc.business_date
                            .is_some_and(|date| filter.is_after_end(date))
                    });
                if all_after_end {
                    out_of_range_pages += 1;
                } else if !page.documents.is_empty() {
                    out_of_range_pages = 0;
                }
            }

            let (persisted, duplicates) = self.persist_new(entity_id, &kept).await?;
            summary.new_documents += persisted as u64;
            summary.duplicates += duplicates as u64;
            summary.filtered_out += filtered_out.len() as u64;

            let previous = cursor;
            cursor = page.new_cursor;
            if self.mode.advances_watermark() {
                self.store
                    .set_watermark(entity_id, cursor, summary.max_cursor)
                    .await?;
            }

            log_page_operation(
                entity_id,
                previous,
                cursor,
                summary.max_cursor,
                page.documents.len(),
                persisted,
            );
            observer
                .on_page_info(&PageInfo {
                    page_number: summary.pages,
                    cursor: previous,
                    new_cursor: cursor,
                    max_cursor: summary.max_cursor,
                    documents: page.documents.len(),
                    persisted,
                    duplicates,
                    filtered_out: filtered_out.len(),
                    skipped: page.skipped_documents,
                    out_of_range_pages,
                })
                .await;
            observer
                .on_progress(SyncProgress::new(
                    summary.new_documents,
                    self.expected_count(summary),
                    format!("Page {}: cursor {cursor} of {}", summary.pages, summary.max_cursor),
                ))
                .await?;

            if cursor >= summary.max_cursor {
                summary.stop_reason = StopReason::ReachedMaxCursor;
                break;
            }
            if out_of_range_pages >= threshold {
                debug!(
                    entity_id = entity_id,
                    out_of_range_pages = out_of_range_pages,
                    "⏹️ SYNC: Consecutive pages past period end, stopping early"
                );
                summary.stop_reason = StopReason::EarlyTermination;
                break;
            }

            if !inter_page_delay.is_zero() {
                tokio::time::sleep(inter_page_delay).await;
            }
        }

        summary.final_cursor = cursor;
        Ok(())
    }

    /// Persist documents not yet stored; returns (persisted, duplicates)
    async fn persist_new(
        &self,
        entity_id: i64,
        documents: &[&FetchedDocument],
    ) -> SyncResult<(usize, usize)> {
        if documents.is_empty() {
            return Ok((0, 0));
        }

        let keys: Vec<String> = documents.iter().map(|d| d.access_key.clone()).collect();
        let existing = self.store.existing_keys(entity_id, &keys).await?;
        let mut seen_on_page = HashSet::with_capacity(documents.len());
        let mut persisted = 0;
        let mut duplicates = 0;

        for document in documents {
            if existing.contains(&document.access_key)
                || !seen_on_page.insert(document.access_key.as_str())
            {
                duplicates += 1;
                continue;
            }
            self.store.persist_document(entity_id, document).await?;
            persisted += 1;
        }
        Ok((persisted, duplicates))
    }

    fn expected_count(&self, summary: &SyncSummary) -> Option<u64> {
        if self.mode.period_filter().is_some() {
            return None;
        }
        let remaining = summary.max_cursor.saturating_sub(summary.start_cursor);
        (remaining > 0).then_some(remaining)
    }
}

#[async_trait]
impl UnitOfWork for EntitySynchronizer {
    async fn execute(
        &self,
        task: &SyncTask,
        observer: Arc<dyn SyncObserver>,
    ) -> SyncResult<TaskOutcome> {
        let summary = self.synchronize(task, observer.as_ref()).await?;

        if summary.stop_reason == StopReason::Cancelled {
            return Ok(TaskOutcome::Cancelled {
                stage: summary.stage_description(),
            });
        }

        if self.mode.discards_empty_runs() && summary.new_documents == 0 {
            match self.status.delete(task.task_id()).await {
                Ok(()) => {
                    debug!(entity_id = task.entity_id, "🧹 SYNC: Empty incremental run, record removed");
                    return Ok(TaskOutcome::Discarded);
                }
                Err(e) => warn!(
                    entity_id = task.entity_id,
                    "⚠️ SYNC: Could not remove empty run record: {}",
                    e
                ),
            }
        }

        Ok(TaskOutcome::Completed {
            new_documents: summary.new_documents,
            stage: summary.stage_description(),
        })
    }
}
