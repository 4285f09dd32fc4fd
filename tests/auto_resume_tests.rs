//! Auto-resume supervisor convergence, stop conditions and cancellation

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use common::*;
use docsync::config::{EngineConfig, ResumeConfig, ResumeMode};
use docsync::error::{FetchError, FetchErrorKind};
use docsync::execution::UnitOfWork;
use docsync::models::{BatchId, SyncMode, TaskPhase};
use docsync::orchestration::{AutoResumeSupervisor, ResumeStopReason};
use docsync::store::StatusSink;

fn bounded(max_rounds: u32) -> ResumeConfig {
    ResumeConfig {
        enabled: true,
        mode: ResumeMode::Bounded,
        max_rounds,
        round_delay_seconds: 30,
        ..ResumeConfig::default()
    }
}

fn unbounded(cap: u32) -> ResumeConfig {
    ResumeConfig {
        enabled: true,
        mode: ResumeMode::Unbounded,
        unbounded_round_cap: cap,
        round_delay_seconds: 30,
        ..ResumeConfig::default()
    }
}

fn supervisor(pool: &PoolHarness, config: ResumeConfig) -> AutoResumeSupervisor {
    AutoResumeSupervisor::new(
        pool.engine.clone(),
        pool.status.clone(),
        pool.cancellation.clone(),
        config,
        4,
    )
    .unwrap()
}

async fn phases(pool: &PoolHarness, batch_id: BatchId) -> Vec<TaskPhase> {
    pool.status
        .list_by_batch(batch_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.phase)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_halving_failures_converge_to_zero() {
    let pool = PoolHarness::new(unpaced_pool());
    let batch_id = new_batch();
    let tasks = pool.register(batch_id, 1..=8).await;
    // 7 fail the first run; each round recovers half of what is left
    let unit = Arc::new(ScheduledUnit::new([
        (1, 1),
        (2, 2),
        (3, 2),
        (4, 2),
        (5, 2),
        (6, 3),
        (7, 3),
        (8, 4),
    ]));
    let unit_of_work: Arc<dyn UnitOfWork> = unit.clone();

    pool.engine
        .run(batch_id, tasks, 4, unit_of_work.clone(), None)
        .await;
    let report = supervisor(&pool, bounded(10))
        .resume_failed(batch_id, unit_of_work)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, ResumeStopReason::AllRecovered);
    assert_eq!(report.rounds, 3);
    assert_eq!(report.recovered, 7);
    assert_eq!(report.permanently_failed, 0);
    assert!(phases(&pool, batch_id)
        .await
        .iter()
        .all(|p| *p == TaskPhase::Succeeded));
    assert_eq!(unit.attempts(8), 4);

    let progress = pool.engine.snapshots().batch_progress(batch_id).unwrap();
    assert!(progress.finished);
    assert_eq!(progress.remaining_failures, 0);
    assert_eq!(progress.round, 3);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_round_without_improvement_stops() {
    let pool = PoolHarness::new(unpaced_pool());
    let batch_id = new_batch();
    let tasks = pool.register(batch_id, 1..=3).await;
    let unit: Arc<dyn UnitOfWork> = Arc::new(ScheduledUnit::always_failing());

    pool.engine.run(batch_id, tasks.clone(), 2, unit.clone(), None).await;
    let report = supervisor(&pool, bounded(5))
        .resume_failed(batch_id, unit)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, ResumeStopReason::NoImprovement);
    assert_eq!(report.rounds, 1);
    assert_eq!(report.permanently_failed, 3);
    for task in &tasks {
        let record = pool.status.snapshot(task.task_id()).unwrap();
        assert_eq!(record.phase, TaskPhase::Failed);
        assert_eq!(record.attempts, 2);
        assert_eq!(
            record.last_stage_description,
            "Permanently failed after 1 resume round(s)"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_bounded_rounds_are_capped() {
    let pool = PoolHarness::new(unpaced_pool());
    let batch_id = new_batch();
    let tasks = pool.register(batch_id, 1..=4).await;
    // one recovery per round keeps every round improving
    let unit: Arc<dyn UnitOfWork> =
        Arc::new(ScheduledUnit::new([(1, 2), (2, 3), (3, 4), (4, 5)]));

    pool.engine.run(batch_id, tasks, 4, unit.clone(), None).await;
    let report = supervisor(&pool, bounded(2))
        .resume_failed(batch_id, unit)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, ResumeStopReason::RoundCapReached);
    assert_eq!(report.rounds, 2);
    assert_eq!(report.recovered, 2);
    assert_eq!(report.permanently_failed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_mode_keeps_going_with_delay_floor() {
    let pool = PoolHarness::new(unpaced_pool());
    let batch_id = new_batch();
    let tasks = pool.register(batch_id, 1..=2).await;
    let unit: Arc<dyn UnitOfWork> = Arc::new(ScheduledUnit::always_failing());

    pool.engine.run(batch_id, tasks, 2, unit.clone(), None).await;
    let started = Instant::now();
    let report = supervisor(&pool, unbounded(3))
        .resume_failed(batch_id, unit)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, ResumeStopReason::RoundCapReached);
    assert_eq!(report.rounds, 3);
    // two waits between three rounds, each raised to the 120s floor
    assert!(started.elapsed() >= Duration::from_secs(240));
    assert!(phases(&pool, batch_id)
        .await
        .iter()
        .all(|p| *p == TaskPhase::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_rounds_that_improve_keep_the_configured_delay() {
    let pool = PoolHarness::new(unpaced_pool());
    let batch_id = new_batch();
    let tasks = pool.register(batch_id, 1..=2).await;
    let unit: Arc<dyn UnitOfWork> = Arc::new(ScheduledUnit::new([(1, 2), (2, 3)]));

    pool.engine.run(batch_id, tasks, 2, unit.clone(), None).await;
    let started = Instant::now();
    let report = supervisor(&pool, unbounded(10))
        .resume_failed(batch_id, unit)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, ResumeStopReason::AllRecovered);
    assert_eq!(report.rounds, 2);
    // one 30s wait after a round that recovered entity 1
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(30), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(120), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_wait_stops_promptly() {
    let pool = PoolHarness::new(unpaced_pool());
    let batch_id = new_batch();
    let tasks = pool.register(batch_id, 1..=2).await;
    let unit: Arc<dyn UnitOfWork> = Arc::new(ScheduledUnit::always_failing());
    pool.engine.run(batch_id, tasks, 2, unit.clone(), None).await;

    let cancellation = pool.cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        cancellation.cancel_batch(batch_id);
    });

    let started = Instant::now();
    let report = supervisor(&pool, unbounded(100))
        .resume_failed(batch_id, unit)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, ResumeStopReason::Cancelled);
    assert_eq!(report.rounds, 1);
    assert!(started.elapsed() < Duration::from_secs(12));
    assert_eq!(report.permanently_failed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_records_end_failed() {
    let pool = PoolHarness::new(unpaced_pool());
    let batch_id = new_batch();
    let tasks = pool.register(batch_id, 1..=3).await;
    pool.cancellation.cancel_batch(batch_id);
    let unit: Arc<dyn UnitOfWork> = Arc::new(ScheduledUnit::new([(1, 1), (2, 1), (3, 1)]));

    pool.engine.run(batch_id, tasks.clone(), 2, unit.clone(), None).await;
    assert!(phases(&pool, batch_id)
        .await
        .iter()
        .all(|p| *p == TaskPhase::Cancelled));

    let report = supervisor(&pool, bounded(3))
        .resume_failed(batch_id, unit)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, ResumeStopReason::Cancelled);
    assert_eq!(report.rounds, 0);
    for task in &tasks {
        let record = pool.status.snapshot(task.task_id()).unwrap();
        assert_eq!(record.phase, TaskPhase::Failed);
        assert_eq!(
            record.error_message.as_deref(),
            Some("Cancelled by operator during auto-resume")
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_sync_recovers_transient_failures() {
    let harness = Harness::new(5);
    let entities: Vec<_> = (1..=3).map(|id| harness.add_entity(id)).collect();
    for entity in &entities {
        harness
            .transport
            .publish(&entity.external_key, docs_at(1..=5, None));
    }
    // non-retryable at the client level, so the first run fails outright
    harness.transport.queue_fault(
        &entities[1].external_key,
        FetchError::new(FetchErrorKind::Protocol(999), "unexpected status"),
    );

    let config = EngineConfig {
        resume: bounded(3),
        ..EngineConfig::default()
    };
    let engine = harness.engine(config);
    let batch_id = new_batch();
    let tasks = engine.register_tasks(batch_id, entities).await.unwrap();
    let report = engine
        .run_sync(batch_id, tasks.clone(), Some(2), SyncMode::Manual)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    let resumed = harness.record(&tasks[1]).unwrap();
    assert_eq!(resumed.attempts, 2);
    assert_eq!(resumed.progress_count, 5);
    assert_eq!(harness.store.document_count(2), 5);

    let progress = engine.batch_progress(batch_id).unwrap();
    assert!(progress.finished);
    assert_eq!(progress.recovered, 1);
}

#[test]
fn test_invalid_resume_policy_is_rejected() {
    let pool = PoolHarness::new(unpaced_pool());
    let result = AutoResumeSupervisor::new(
        pool.engine.clone(),
        pool.status.clone(),
        pool.cancellation.clone(),
        bounded(11),
        1,
    );
    assert!(result.is_err());
}
