//! # Auto-Resume Supervisor
//!
//! Re-queues a batch's failed and cancelled tasks in rounds until they all
//! recover or a stop condition is reached. When the supervisor stops for any
//! reason, every record still not `succeeded` is marked permanently
//! `failed`, so a supervised batch always ends with records that are either
//! succeeded or failed.
//!
//! Bounded mode stops after `max_rounds` or after the first round that
//! recovers nothing. Unbounded mode tolerates rounds without improvement but
//! waits at least its delay floor after each of them, and stops at a hard
//! round cap. Both modes poll the batch cancellation flag while waiting.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ResumeConfig, ResumeMode};
use crate::error::SyncResult;
use crate::execution::{SnapshotRegistry, TaskEngine, UnitOfWork};
use crate::models::{BatchId, BatchProgress, StatusRecord, StatusUpdate, SyncTask, TaskPhase};
use crate::store::{CancellationSource, StatusSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeStopReason {
    AllRecovered,
    RoundCapReached,
    NoImprovement,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeReport {
    pub batch_id: BatchId,
    pub rounds: u32,
    pub recovered: usize,
    pub permanently_failed: usize,
    pub stop_reason: ResumeStopReason,
}

pub struct AutoResumeSupervisor {
    engine: TaskEngine,
    status: Arc<dyn StatusSink>,
    cancellation: Arc<dyn CancellationSource>,
    snapshots: Arc<SnapshotRegistry>,
    config: ResumeConfig,
    concurrency: usize,
}

impl std::fmt::Debug for AutoResumeSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoResumeSupervisor")
            .field("config", &self.config)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl AutoResumeSupervisor {
    pub fn new(
        engine: TaskEngine,
        status: Arc<dyn StatusSink>,
        cancellation: Arc<dyn CancellationSource>,
        config: ResumeConfig,
        concurrency: usize,
    ) -> SyncResult<Self> {
        config.validate()?;
        let snapshots = engine.snapshots().clone();
        Ok(Self {
            engine,
            status,
            cancellation,
            snapshots,
            config,
            concurrency: concurrency.max(1),
        })
    }

    pub async fn resume_failed(
        &self,
        batch_id: BatchId,
        unit: Arc<dyn UnitOfWork>,
    ) -> SyncResult<ResumeReport> {
        let round_cap = self.config.round_cap();
        let mut rounds = 0u32;
        let mut recovered_total = 0usize;
        let mut previous_round_recovered = true;

        info!(
            batch_id = %batch_id,
            mode = ?self.config.mode,
            round_cap = round_cap,
            delay_secs = self.config.round_delay_seconds,
            "🔁 RESUME: Supervisor started"
        );

        let stop_reason = loop {
            let resumable = self.resumable_records(batch_id).await?;
            self.publish(batch_id, rounds, resumable.len(), recovered_total, false);

            if resumable.is_empty() {
                break ResumeStopReason::AllRecovered;
            }
            if rounds >= round_cap {
                break ResumeStopReason::RoundCapReached;
            }
            if self.cancellation.is_batch_cancelled(batch_id).await {
                break ResumeStopReason::Cancelled;
            }
            if rounds > 0 {
                let delay = self.config.round_delay(previous_round_recovered);
                if !self.wait_between_rounds(batch_id, delay).await {
                    break ResumeStopReason::Cancelled;
                }
            }

            rounds += 1;
            let failed_before = resumable.len();
            let mut tasks = Vec::with_capacity(failed_before);
            for record in &resumable {
                self.status
                    .update(record.id, &StatusUpdate::reset_pending())
                    .await?;
                tasks.push(SyncTask::from_record(record));
            }

            info!(
                batch_id = %batch_id,
                round = rounds,
                tasks = failed_before,
                "🔁 RESUME: Starting round"
            );
            let results = self
                .engine
                .run(batch_id, tasks, self.concurrency, unit.clone(), None)
                .await;
            let recovered = results
                .iter()
                .filter(|r| r.disposition.is_success())
                .count();
            recovered_total += recovered;
            previous_round_recovered = recovered > 0;

            info!(
                batch_id = %batch_id,
                round = rounds,
                recovered = recovered,
                remaining = failed_before - recovered,
                "🔁 RESUME: Round finished"
            );

            if recovered == 0 {
                match self.config.mode {
                    ResumeMode::Bounded => break ResumeStopReason::NoImprovement,
                    ResumeMode::Unbounded => warn!(
                        batch_id = %batch_id,
                        round = rounds,
                        "⚠️ RESUME: Round recovered nothing, continuing"
                    ),
                }
            }
        };

        let permanently_failed = self.finalize(batch_id, rounds, stop_reason).await?;
        self.publish(batch_id, rounds, permanently_failed, recovered_total, true);

        info!(
            batch_id = %batch_id,
            rounds = rounds,
            recovered = recovered_total,
            permanently_failed = permanently_failed,
            stop_reason = ?stop_reason,
            "🏁 RESUME: Supervisor finished"
        );

        Ok(ResumeReport {
            batch_id,
            rounds,
            recovered: recovered_total,
            permanently_failed,
            stop_reason,
        })
    }

    async fn resumable_records(&self, batch_id: BatchId) -> SyncResult<Vec<StatusRecord>> {
        Ok(self
            .status
            .list_by_batch(batch_id)
            .await?
            .into_iter()
            .filter(|r| r.phase.is_resumable())
            .collect())
    }

    /// Sleep in poll-sized chunks; false when cancellation was observed
    async fn wait_between_rounds(&self, batch_id: BatchId, delay: Duration) -> bool {
        let poll = self.config.cancel_poll_interval();
        let mut remaining = delay;
        while !remaining.is_zero() {
            if self.cancellation.is_batch_cancelled(batch_id).await {
                return false;
            }
            let chunk = remaining.min(poll);
            tokio::time::sleep(chunk).await;
            remaining -= chunk;
        }
        !self.cancellation.is_batch_cancelled(batch_id).await
    }

    /// Mark every record that did not succeed as permanently failed
    async fn finalize(
        &self,
        batch_id: BatchId,
        rounds: u32,
        stop_reason: ResumeStopReason,
    ) -> SyncResult<usize> {
        let mut permanently_failed = 0;
        for record in self.status.list_by_batch(batch_id).await? {
            match record.phase {
                TaskPhase::Succeeded => {}
                TaskPhase::Failed => {
                    permanently_failed += 1;
                    self.status
                        .update(
                            record.id,
                            &StatusUpdate::stage(format!(
                                "Permanently failed after {rounds} resume round(s)"
                            )),
                        )
                        .await?;
                }
                TaskPhase::Pending | TaskPhase::Running | TaskPhase::Cancelled => {
                    permanently_failed += 1;
                    let message = match stop_reason {
                        ResumeStopReason::Cancelled => "Cancelled by operator during auto-resume",
                        _ => "Auto-resume stopped before the task completed",
                    };
                    debug!(task_id = %record.id, phase = %record.phase, "🔁 RESUME: Closing record");
                    self.status
                        .update(record.id, &StatusUpdate::failed(message, record.certificate_expired))
                        .await?;
                }
            }
        }
        Ok(permanently_failed)
    }

    fn publish(
        &self,
        batch_id: BatchId,
        round: u32,
        remaining_failures: usize,
        recovered: usize,
        finished: bool,
    ) {
        self.snapshots.publish_progress(BatchProgress {
            batch_id,
            round,
            max_rounds: self.config.round_cap(),
            remaining_failures,
            recovered,
            finished,
            updated_at: Utc::now(),
        });
    }
}
