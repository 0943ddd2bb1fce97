//! Integration tests for racing solver pools.
//!
//! Solvers are scripted with per-run delays and results; tokio's paused
//! clock makes arrival order deterministic.


use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use solver_race::config::SelectionConfig;
use solver_race::selection::{Pool, PoolKind, SelectionEngine};
use solver_race::RaceError;
use test_harness::{attempts, ScriptedRunner, Step};

fn deadline_in(secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(secs)
}

// =============================================================================
// First-success pool
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_success_wins_regardless_of_order() {
    for names in [["a", "b", "c"], ["c", "b", "a"], ["b", "a", "c"]] {
        let runner = Arc::new(
            ScriptedRunner::new()
                .solver("a", vec![Step::fail(5)])
                .solver("b", vec![Step::pass(10, "solution-b")])
                .solver("c", vec![Step::fail(5)]),
        );
        let pool = Pool::first_success(PoolKind::Puzzle, runner, false);

        let report = pool
            .run(attempts(&names), &CancellationToken::new(), deadline_in(60))
            .await;

        let winner = report.winner.expect("b passes");
        assert_eq!(winner.winner_name, "b");
        assert_eq!(winner.solution, "solution-b");
        assert_eq!(report.failures.len(), 2);
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_success_abandons_slower_attempts() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("fast", vec![Step::pass(10, "fast")])
            .solver("slow", vec![Step::pass(1000, "slow")])
            .solver("slower", vec![Step::pass(5000, "slower")]),
    );
    let pool = Pool::first_success(PoolKind::Puzzle, runner.clone(), true);

    let start = Instant::now();
    let report = pool
        .run(
            attempts(&["slow", "fast", "slower"]),
            &CancellationToken::new(),
            deadline_in(60),
        )
        .await;

    assert_eq!(report.winner.unwrap().winner_name, "fast");
    assert!(start.elapsed() < Duration::from_secs(1));
    let mut abandoned = report.abandoned.clone();
    abandoned.sort();
    assert_eq!(abandoned, vec!["slow", "slower"]);

    // The losers observe cancellation once the pool returns.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(runner.cancelled(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_puzzle_retried_exactly_once() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("flaky", vec![Step::fail(5), Step::pass(5, "second try")]),
    );
    let pool = Pool::first_success(PoolKind::Puzzle, runner.clone(), true);

    let report = pool
        .run(attempts(&["flaky"]), &CancellationToken::new(), deadline_in(60))
        .await;

    assert_eq!(runner.runs("flaky"), 2);
    assert_eq!(report.winner.unwrap().solution, "second try");
    assert!(report.failures.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_puzzle_retry_is_not_repeated() {
    let runner = Arc::new(ScriptedRunner::new().solver("broken", vec![Step::fail(5)]));
    let pool = Pool::first_success(PoolKind::Puzzle, runner.clone(), true);

    let report = pool
        .run(attempts(&["broken"]), &CancellationToken::new(), deadline_in(60))
        .await;

    assert_eq!(runner.runs("broken"), 2);
    assert!(report.winner.is_none());
    assert_eq!(report.failures.len(), 1);
    assert!(!report.deadline_elapsed);
    assert_eq!(
        report.no_winner_error().unwrap().to_string(),
        "No puzzle solver passed: all 1 solvers failed"
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_after_deadline() {
    let runner = Arc::new(ScriptedRunner::new().solver("late", vec![Step::fail(2000)]));
    let pool = Pool::first_success(PoolKind::Puzzle, runner.clone(), true);

    let report = pool
        .run(attempts(&["late"]), &CancellationToken::new(), deadline_in(1))
        .await;

    assert!(report.deadline_elapsed);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(runner.runs("late"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_first_success_deadline_elapsed() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("a", vec![Step::pass(30_000, "a")])
            .solver("b", vec![Step::pass(40_000, "b")]),
    );
    let pool = Pool::first_success(PoolKind::Puzzle, runner, true);

    let report = pool
        .run(attempts(&["a", "b"]), &CancellationToken::new(), deadline_in(10))
        .await;

    assert!(report.winner.is_none());
    assert!(report.deadline_elapsed);
    assert_eq!(report.abandoned.len(), 2);
    assert!(matches!(
        report.no_winner_error(),
        Some(RaceError::NoWinner { ref reason, .. }) if reason == "deadline elapsed"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_empty_pool_has_no_winner() {
    let pool = Pool::first_success(PoolKind::Puzzle, Arc::new(ScriptedRunner::new()), true);

    let report = pool
        .run(Vec::new(), &CancellationToken::new(), deadline_in(10))
        .await;

    assert!(report.winner.is_none());
    assert!(!report.deadline_elapsed);
}

// =============================================================================
// Best-score pool
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_lowest_score_wins() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("a", vec![Step::scored(10, "sol-a", 150)])
            .solver("b", vec![Step::scored(30, "sol-b", 90)])
            .solver("c", vec![Step::scored(20, "sol-c", 120)]),
    );
    let pool = Pool::best_score(PoolKind::Task, runner);

    let report = pool
        .run(attempts(&["a", "b", "c"]), &CancellationToken::new(), deadline_in(60))
        .await;

    let winner = report.winner.unwrap();
    assert_eq!(winner.winner_name, "b");
    assert_eq!(winner.solution, "sol-b");
    assert_eq!(report.winner_score, Some(90));
    assert_eq!(report.passed.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_score_tie_keeps_earlier_arrival() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("a", vec![Step::scored(10, "sol-a", 100)])
            .solver("b", vec![Step::scored(20, "sol-b", 100)]),
    );
    let pool = Pool::best_score(PoolKind::Task, runner);

    let report = pool
        .run(attempts(&["b", "a"]), &CancellationToken::new(), deadline_in(60))
        .await;

    assert_eq!(report.winner.unwrap().winner_name, "a");
}

#[tokio::test(start_paused = true)]
async fn test_task_failures_are_not_retried() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("bad", vec![Step::fail(5), Step::scored(5, "never", 1)])
            .solver("good", vec![Step::scored(50, "sol", 200)]),
    );
    let pool = Pool::best_score(PoolKind::Task, runner.clone());

    let report = pool
        .run(attempts(&["bad", "good"]), &CancellationToken::new(), deadline_in(60))
        .await;

    assert_eq!(runner.runs("bad"), 1);
    assert_eq!(report.winner.unwrap().winner_name, "good");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "bad");
}

#[tokio::test(start_paused = true)]
async fn test_unscored_success_is_a_failure() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("unscored", vec![Step::pass(5, "sol")])
            .solver("scored", vec![Step::scored(10, "sol", 500)]),
    );
    let pool = Pool::best_score(PoolKind::Task, runner);

    let report = pool
        .run(
            attempts(&["unscored", "scored"]),
            &CancellationToken::new(),
            deadline_in(60),
        )
        .await;

    assert_eq!(report.winner.unwrap().winner_name, "scored");
    assert_eq!(report.failures[0].name, "unscored");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_compares_reported_attempts() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("quick", vec![Step::scored(100, "quick", 400)])
            .solver("thorough", vec![Step::scored(60_000, "thorough", 10)]),
    );
    let pool = Pool::best_score(PoolKind::Task, runner);

    let report = pool
        .run(
            attempts(&["quick", "thorough"]),
            &CancellationToken::new(),
            deadline_in(10),
        )
        .await;

    assert!(report.deadline_elapsed);
    assert_eq!(report.winner.unwrap().winner_name, "quick");
    assert_eq!(report.abandoned, vec!["thorough"]);
}

#[tokio::test(start_paused = true)]
async fn test_all_task_solvers_fail() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .solver("a", vec![Step::fail(5)])
            .solver("b", vec![Step::fail(10)]),
    );
    let pool = Pool::best_score(PoolKind::Task, runner);

    let report = pool
        .run(attempts(&["a", "b"]), &CancellationToken::new(), deadline_in(60))
        .await;

    assert!(report.winner.is_none());
    assert!(!report.deadline_elapsed);
    assert_eq!(report.failures.len(), 2);
}

// =============================================================================
// Combined rounds
// =============================================================================

fn engine(puzzle: ScriptedRunner, task: ScriptedRunner, deadline_secs: u64) -> SelectionEngine {
    SelectionEngine::new(
        Arc::new(puzzle),
        Arc::new(task),
        SelectionConfig::default().with_deadline(Duration::from_secs(deadline_secs)),
    )
}

#[tokio::test(start_paused = true)]
async fn test_round_combines_both_winners() {
    let engine = engine(
        ScriptedRunner::new()
            .solver("p1", vec![Step::fail(5)])
            .solver("p2", vec![Step::pass(20, "puzzle")]),
        ScriptedRunner::new()
            .solver("t1", vec![Step::scored(10, "task-1", 300)])
            .solver("t2", vec![Step::scored(30, "task-2", 200)]),
        60,
    );

    let report = engine
        .run_round(
            attempts(&["p1", "p2"]),
            attempts(&["t1", "t2"]),
            &CancellationToken::new(),
        )
        .await;
    let decision = report.decision().unwrap();

    assert_eq!(decision.puzzle.winner_name, "p2");
    assert_eq!(decision.puzzle.solution, "puzzle");
    assert_eq!(decision.task.winner_name, "t2");
    assert_eq!(decision.task.solution, "task-2");
}

#[tokio::test(start_paused = true)]
async fn test_round_fails_without_puzzle_winner() {
    let engine = engine(
        ScriptedRunner::new().solver("p1", vec![Step::fail(5)]),
        ScriptedRunner::new().solver("t1", vec![Step::scored(10, "task", 300)]),
        60,
    );

    let report = engine
        .run_round(attempts(&["p1"]), attempts(&["t1"]), &CancellationToken::new())
        .await;

    assert!(report.task.has_winner());
    assert!(matches!(
        report.decision(),
        Err(RaceError::NoCombinedDecision)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_round_fails_without_task_winner() {
    let engine = engine(
        ScriptedRunner::new().solver("p1", vec![Step::pass(5, "puzzle")]),
        ScriptedRunner::new().solver("t1", vec![Step::fail(10)]),
        60,
    );

    let report = engine
        .run_round(attempts(&["p1"]), attempts(&["t1"]), &CancellationToken::new())
        .await;

    assert!(report.puzzle.has_winner());
    assert!(report.decision().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_round_shares_one_deadline() {
    let engine = engine(
        ScriptedRunner::new().solver("p1", vec![Step::pass(5, "puzzle")]),
        ScriptedRunner::new().solver("t1", vec![Step::scored(120_000, "task", 1)]),
        30,
    );

    let start = Instant::now();
    let report = engine
        .run_round(attempts(&["p1"]), attempts(&["t1"]), &CancellationToken::new())
        .await;

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert!(start.elapsed() < Duration::from_secs(31));
    assert!(report.task.deadline_elapsed);
    assert!(report.decision().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_stops_round() {
    let engine = engine(
        ScriptedRunner::new().solver("p1", vec![Step::pass(100_000, "puzzle")]),
        ScriptedRunner::new().solver("t1", vec![Step::scored(100_000, "task", 1)]),
        600,
    );
    let cancel = CancellationToken::new();

    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            engine
                .run_round(attempts(&["p1"]), attempts(&["t1"]), &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    let report = handle.await.unwrap();
    assert!(report.puzzle.winner.is_none());
    assert!(report.task.winner.is_none());
}
