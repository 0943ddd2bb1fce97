use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SelectionConfig;
use crate::error::{RaceError, Result};
use crate::selection::pool::{
    AttemptRunner, Pool, PoolKind, PoolReport, SelectionOutcome, SolverAttempt,
};

/// Winners of both pools of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedDecision {
    pub puzzle: SelectionOutcome,
    pub task: SelectionOutcome,
}

/// What each pool of a round produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub puzzle: PoolReport,
    pub task: PoolReport,
}

impl RoundReport {
    /// The combined decision. Both pools must have a winner.
    pub fn decision(&self) -> Result<CombinedDecision> {
        match (&self.puzzle.winner, &self.task.winner) {
            (Some(puzzle), Some(task)) => Ok(CombinedDecision {
                puzzle: puzzle.clone(),
                task: task.clone(),
            }),
            _ => Err(RaceError::NoCombinedDecision),
        }
    }
}

/// Races a puzzle pool (first success wins, failed attempts retried once)
/// against a task pool (lowest score wins) under one shared deadline.
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    puzzle_pool: Pool,
    task_pool: Pool,
    config: SelectionConfig,
}

impl SelectionEngine {
    pub fn new(
        puzzle_runner: Arc<dyn AttemptRunner>,
        task_runner: Arc<dyn AttemptRunner>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            puzzle_pool: Pool::first_success(
                PoolKind::Puzzle,
                puzzle_runner,
                config.retry_puzzle_failures,
            ),
            task_pool: Pool::best_score(PoolKind::Task, task_runner),
            config,
        }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Run both pools concurrently until each has settled or the deadline
    /// elapses.
    pub async fn run_round(
        &self,
        puzzle_attempts: Vec<SolverAttempt>,
        task_attempts: Vec<SolverAttempt>,
        cancel: &CancellationToken,
    ) -> RoundReport {
        let deadline = Instant::now() + self.config.deadline;

        let (puzzle, task) = tokio::join!(
            self.puzzle_pool.run(puzzle_attempts, cancel, deadline),
            self.task_pool.run(task_attempts, cancel, deadline),
        );

        for report in [&puzzle, &task] {
            match report.winner {
                Some(ref winner) => tracing::info!(
                    pool = %report.kind,
                    winner = %winner.winner_name,
                    score = ?report.winner_score,
                    "Selected solution"
                ),
                None => {
                    if let Some(e) = report.no_winner_error() {
                        tracing::warn!(pool = %report.kind, error = %e, "No solution selected");
                    }
                }
            }
        }

        RoundReport { puzzle, task }
    }
}
