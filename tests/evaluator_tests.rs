//! Integration tests for batch evaluation.
//!
//! These tests validate that:
//! - No more than `max_in_flight` jobs ever run at once
//! - Every job yields exactly one record, failures included
//! - Jobs are submitted in order, one pacing interval apart
//! - Progress totals match the records returned


use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use solver_race::blob::{BlobStore, MemoryBlobStore};
use solver_race::config::EvalConfig;
use solver_race::eval::{EvalPlan, EvalProgress, FanOutEvaluator, ValidationSummary};
use solver_race::executor::{ExecutorClient, JobDescriptor, JobOutcome};
use solver_race::RaceError;
use test_harness::ScriptedExecutor;

fn jobs(n: usize) -> Vec<JobDescriptor> {
    (0..n)
        .map(|i| JobDescriptor::new("./solve", format!("mem://evals/{}/", i)))
        .collect()
}

fn evaluator(executor: Arc<ScriptedExecutor>, limit: u32, pacing: Duration) -> FanOutEvaluator {
    let client = ExecutorClient::new(executor, Duration::from_secs(5));
    FanOutEvaluator::new(
        client,
        EvalConfig::default()
            .with_max_in_flight(limit)
            .with_pacing(pacing),
    )
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_never_exceeds_limit() {
    let executor = Arc::new(
        ScriptedExecutor::from_fn(|_, _| JobOutcome::exited(0))
            .with_delay(Duration::from_millis(100)),
    );
    let evaluator = evaluator(executor.clone(), 3, Duration::from_millis(1));

    let records = evaluator.evaluate(jobs(10), &CancellationToken::new()).await;

    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.is_success()));
    assert_eq!(executor.calls(), 10);
    assert!(executor.max_in_flight() <= 3);
    assert_eq!(executor.max_in_flight(), 3);
    assert_eq!(evaluator.limiter().outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_affect_siblings() {
    // Every third job exits non-zero.
    let executor = Arc::new(ScriptedExecutor::from_fn(|job, _| {
        let index: usize = job
            .output_uri()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        if index % 3 == 0 {
            JobOutcome::exited(1)
        } else {
            JobOutcome::exited(0)
        }
    }));
    let evaluator = evaluator(executor, 4, Duration::from_millis(1));

    let mut updates = Vec::new();
    let records = evaluator
        .evaluate_with_progress(jobs(9), &CancellationToken::new(), |p| updates.push(*p))
        .await;

    assert_eq!(records.len(), 9);
    let mut failed: Vec<usize> = records
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.index)
        .collect();
    failed.sort();
    assert_eq!(failed, vec![0, 3, 6]);
    assert!(records
        .iter()
        .filter(|r| !r.is_success())
        .all(|r| matches!(r.error, Some(RaceError::ExitCode(1)))));

    // One update before the first result, then one per result.
    assert_eq!(updates.len(), 10);
    assert_eq!(updates[0].done, 0);
    let last = updates.last().unwrap();
    assert_eq!(last.done, 9);
    assert_eq!(last.total, 9);
    assert_eq!(last.failed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_jobs_submitted_in_order_with_pacing() {
    let executor = Arc::new(ScriptedExecutor::from_fn(|_, _| JobOutcome::exited(0)));
    let evaluator = evaluator(executor.clone(), 100, Duration::from_millis(200));
    let batch = jobs(5);
    let expected: Vec<String> = batch.iter().map(|j| j.output_uri().to_string()).collect();

    let start = tokio::time::Instant::now();
    let records = evaluator.evaluate(batch, &CancellationToken::new()).await;

    assert_eq!(records.len(), 5);
    assert_eq!(executor.seen(), expected);
    assert!(start.elapsed() >= Duration::from_millis(800));
}

#[tokio::test(start_paused = true)]
async fn test_total_duration_and_cost() {
    let executor = Arc::new(
        ScriptedExecutor::from_fn(|_, _| JobOutcome::exited(0))
            .with_delay(Duration::from_secs(10)),
    );
    let evaluator = evaluator(executor, 2, Duration::from_millis(1));

    let mut last = EvalProgress::default();
    evaluator
        .evaluate_with_progress(jobs(4), &CancellationToken::new(), |p| last = *p)
        .await;

    assert!(last.total_duration >= Duration::from_secs(40));
    assert!(last.estimated_cost(1.0) >= 40.0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_batch_still_reports_every_job() {
    let executor = Arc::new(
        ScriptedExecutor::from_fn(|_, _| JobOutcome::exited(0))
            .with_delay(Duration::from_secs(60)),
    );
    let evaluator = evaluator(executor, 2, Duration::from_millis(1));
    let cancel = CancellationToken::new();

    let handle = {
        let evaluator = evaluator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { evaluator.evaluate(jobs(6), &cancel).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    let records = handle.await.unwrap();
    assert_eq!(records.len(), 6);
    assert!(records
        .iter()
        .all(|r| matches!(r.error, Some(RaceError::Cancelled))));
    assert_eq!(evaluator.limiter().outstanding(), 0);
}

#[tokio::test]
async fn test_plan_results_read_back_from_store() {
    let store = MemoryBlobStore::new("gs://bucket");
    let plan = EvalPlan::new(
        "greedy",
        vec!["prob-001".to_string()],
        vec![String::new(), "BF".to_string()],
        Duration::from_secs(30),
    )
    .unwrap();
    let eval_jobs = plan.jobs(&store);
    assert_eq!(eval_jobs.len(), 2);

    store
        .put(
            &eval_jobs[1].validation_key(),
            br#"{"score":90,"lastBestScore":120}"#.to_vec(),
            "text/plain",
        )
        .await
        .unwrap();

    let summary = ValidationSummary::load(&store, &eval_jobs[1]).await.unwrap();
    assert_eq!(summary.score, Some(90));
    assert!(summary.improved());
    assert!(ValidationSummary::load(&store, &eval_jobs[0]).await.is_err());
}

#[tokio::test]
async fn test_missing_validation_points_at_output() {
    let store = MemoryBlobStore::new("gs://bucket");
    let plan = EvalPlan::new(
        "greedy",
        vec!["prob-002".to_string()],
        vec![String::new()],
        Duration::from_secs(30),
    )
    .unwrap();
    let eval_jobs = plan.jobs(&store);

    let err = ValidationSummary::load(&store, &eval_jobs[0])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RaceError::WithLocation { ref source, .. } if matches!(**source, RaceError::BlobNotFound(_))
    ));
    assert!(err
        .to_string()
        .ends_with("check logs at gs://bucket/evals/greedy/prob-002/"));
}
