use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RaceError, Result};
use crate::executor::JobDescriptor;

/// The two kinds of solver a round races.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Puzzle,
    Task,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Puzzle => write!(f, "puzzle"),
            PoolKind::Task => write!(f, "task"),
        }
    }
}

/// One named participant in a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverAttempt {
    pub name: String,
    pub job: JobDescriptor,
}

impl SolverAttempt {
    pub fn new(name: impl Into<String>, job: JobDescriptor) -> Self {
        Self {
            name: name.into(),
            job,
        }
    }
}

/// Output of a successful attempt. Lower scores are better.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub text: String,
    pub score: Option<u64>,
}

impl Solution {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: None,
        }
    }

    /// A zero score counts as no score.
    pub fn scored(text: impl Into<String>, score: u64) -> Self {
        Self {
            text: text.into(),
            score: (score > 0).then_some(score),
        }
    }
}

#[derive(Debug)]
pub struct AttemptResult {
    pub name: String,
    pub outcome: Result<Solution>,
}

/// The attempt a pool settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub winner_name: String,
    pub solution: String,
}

/// An attempt that did not win, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub name: String,
    pub reason: String,
}

/// An attempt that succeeded, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassedAttempt {
    pub name: String,
    pub score: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub kind: PoolKind,
    pub winner: Option<SelectionOutcome>,
    pub winner_score: Option<u64>,
    pub passed: Vec<PassedAttempt>,
    pub failures: Vec<AttemptFailure>,
    /// Attempts that never reported, because a winner was already chosen or
    /// the pool stopped waiting
    pub abandoned: Vec<String>,
    pub deadline_elapsed: bool,
}

impl PoolReport {
    fn new(kind: PoolKind) -> Self {
        Self {
            kind,
            winner: None,
            winner_score: None,
            passed: Vec::new(),
            failures: Vec::new(),
            abandoned: Vec::new(),
            deadline_elapsed: false,
        }
    }

    pub fn has_winner(&self) -> bool {
        self.winner.is_some()
    }

    /// Error describing why the pool has no winner, or `None` if it has one.
    pub fn no_winner_error(&self) -> Option<RaceError> {
        if self.winner.is_some() {
            return None;
        }
        let reason = if self.deadline_elapsed {
            "deadline elapsed".to_string()
        } else if self.failures.is_empty() && self.abandoned.is_empty() {
            "no solvers".to_string()
        } else {
            format!("all {} solvers failed", self.failures.len() + self.abandoned.len())
        };
        Some(RaceError::NoWinner {
            pool: self.kind.to_string(),
            reason,
        })
    }

    fn mark_abandoned(&mut self, names: Vec<String>, seen: &HashSet<String>) {
        self.abandoned = names.into_iter().filter(|n| !seen.contains(n)).collect();
    }
}

/// Produces the solution of one attempt.
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn run(&self, attempt: &SolverAttempt, cancel: &CancellationToken) -> Result<Solution>;
}

/// How a pool picks its winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPolicy {
    /// The first successful attempt wins; the rest are abandoned.
    FirstSuccess { retry_failed: bool },
    /// Wait for every attempt (or the deadline); the lowest score wins.
    BestScore,
}

/// A set of attempts sharing one winner policy.
#[derive(Clone)]
pub struct Pool {
    kind: PoolKind,
    policy: PoolPolicy,
    runner: Arc<dyn AttemptRunner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Pool {
    pub fn first_success(kind: PoolKind, runner: Arc<dyn AttemptRunner>, retry_failed: bool) -> Self {
        Self {
            kind,
            policy: PoolPolicy::FirstSuccess { retry_failed },
            runner,
        }
    }

    pub fn best_score(kind: PoolKind, runner: Arc<dyn AttemptRunner>) -> Self {
        Self {
            kind,
            policy: PoolPolicy::BestScore,
            runner,
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn policy(&self) -> PoolPolicy {
        self.policy
    }

    /// Start every attempt and pick a winner before `deadline`.
    ///
    /// Attempts still running when this returns are cancelled; the remote
    /// jobs behind them are not waited for.
    pub async fn run(
        &self,
        attempts: Vec<SolverAttempt>,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> PoolReport {
        let pool_cancel = cancel.child_token();
        let _abandon = pool_cancel.clone().drop_guard();

        let names: Vec<String> = attempts.iter().map(|a| a.name.clone()).collect();
        let retry = matches!(self.policy, PoolPolicy::FirstSuccess { retry_failed: true });
        let rx = self.spawn_attempts(attempts, &pool_cancel, deadline, retry);

        tracing::info!(pool = %self.kind, attempts = names.len(), "Running solvers");
        let (mut report, seen) = match self.policy {
            PoolPolicy::FirstSuccess { .. } => {
                self.collect_first_success(rx, names.len(), cancel, deadline)
                    .await
            }
            PoolPolicy::BestScore => {
                self.collect_best_score(rx, names.len(), cancel, deadline)
                    .await
            }
        };
        report.mark_abandoned(names, &seen);
        report
    }

    fn spawn_attempts(
        &self,
        attempts: Vec<SolverAttempt>,
        cancel: &CancellationToken,
        deadline: Instant,
        retry: bool,
    ) -> mpsc::Receiver<AttemptResult> {
        let (tx, rx) = mpsc::channel(attempts.len().max(1));
        for attempt in attempts {
            let tx = tx.clone();
            let runner = self.runner.clone();
            let cancel = cancel.clone();
            let kind = self.kind;
            tokio::spawn(async move {
                tracing::debug!(pool = %kind, attempt = %attempt.name, "Running solver");
                let mut outcome = runner.run(&attempt, &cancel).await;
                if retry && !cancel.is_cancelled() && Instant::now() < deadline {
                    if let Err(ref e) = outcome {
                        tracing::info!(
                            pool = %kind,
                            attempt = %attempt.name,
                            error = %e,
                            "Solver failed, retrying once"
                        );
                        outcome = runner.run(&attempt, &cancel).await;
                    }
                }
                let _ = tx
                    .send(AttemptResult {
                        name: attempt.name,
                        outcome,
                    })
                    .await;
            });
        }
        rx
    }

    async fn collect_first_success(
        &self,
        mut rx: mpsc::Receiver<AttemptResult>,
        total: usize,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> (PoolReport, HashSet<String>) {
        let mut report = PoolReport::new(self.kind);
        let mut seen = HashSet::new();
        let mut reported = 0;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        while reported < total {
            tokio::select! {
                result = rx.recv() => {
                    let result = match result {
                        Some(result) => result,
                        None => break,
                    };
                    reported += 1;
                    seen.insert(result.name.clone());
                    match result.outcome {
                        Ok(solution) => {
                            tracing::info!(pool = %self.kind, attempt = %result.name, "Solver passed");
                            report.passed.push(PassedAttempt {
                                name: result.name.clone(),
                                score: solution.score,
                            });
                            report.winner_score = solution.score;
                            report.winner = Some(SelectionOutcome {
                                winner_name: result.name,
                                solution: solution.text,
                            });
                            break;
                        }
                        Err(e) => self.record_failure(&mut report, result.name, &e),
                    }
                }
                _ = &mut sleep => {
                    tracing::warn!(pool = %self.kind, "No solver passed before deadline");
                    report.deadline_elapsed = true;
                    break;
                }
                _ = cancel.cancelled() => break,
            }
        }
        (report, seen)
    }

    async fn collect_best_score(
        &self,
        mut rx: mpsc::Receiver<AttemptResult>,
        total: usize,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> (PoolReport, HashSet<String>) {
        let mut report = PoolReport::new(self.kind);
        let mut seen = HashSet::new();
        let mut reported = 0;
        let mut best: Option<(String, String, u64)> = None;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        while reported < total {
            tokio::select! {
                result = rx.recv() => {
                    let result = match result {
                        Some(result) => result,
                        None => break,
                    };
                    reported += 1;
                    seen.insert(result.name.clone());
                    let solution = match result.outcome {
                        Ok(solution) => solution,
                        Err(e) => {
                            self.record_failure(&mut report, result.name, &e);
                            continue;
                        }
                    };
                    let score = match solution.score {
                        Some(score) => score,
                        None => {
                            self.record_failure(&mut report, result.name, &RaceError::MissingScore);
                            continue;
                        }
                    };
                    tracing::info!(pool = %self.kind, attempt = %result.name, score, "Solver passed");
                    report.passed.push(PassedAttempt {
                        name: result.name.clone(),
                        score: Some(score),
                    });
                    // Strictly lower replaces; ties keep the earlier arrival.
                    if best.as_ref().map_or(true, |(_, _, s)| score < *s) {
                        best = Some((result.name, solution.text, score));
                    }
                }
                _ = &mut sleep => {
                    tracing::warn!(
                        pool = %self.kind,
                        reported,
                        total,
                        "Deadline elapsed, comparing reported solvers"
                    );
                    report.deadline_elapsed = true;
                    break;
                }
                _ = cancel.cancelled() => break,
            }
        }

        if let Some((name, text, score)) = best {
            report.winner_score = Some(score);
            report.winner = Some(SelectionOutcome {
                winner_name: name,
                solution: text,
            });
        }
        (report, seen)
    }

    fn record_failure(&self, report: &mut PoolReport, name: String, error: &RaceError) {
        tracing::warn!(pool = %self.kind, attempt = %name, error = %error, "Solver failed");
        report.failures.push(AttemptFailure {
            name,
            reason: error.to_string(),
        });
    }
}
