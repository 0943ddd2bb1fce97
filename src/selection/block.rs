use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::blob::{self, BlobStore};
use crate::admission::AdmissionLimiter;
use crate::config::{BlockConfig, SelectionConfig};
use crate::error::{RaceError, Result};
use crate::executor::{ExecutorClient, InputPackage, JobDescriptor};
use crate::selection::engine::{CombinedDecision, RoundReport, SelectionEngine};
use crate::selection::pool::{AttemptRunner, PoolKind, Solution, SolverAttempt};

const PUZZLE_COMMAND: &str = "set -e\n\
./solve-puzzle < puzzle.cond > $OUT_DIR/out.txt 2> /dev/null\n\
./check-puzzle puzzle.cond $OUT_DIR/out.txt > $OUT_DIR/validation.txt\n\
grep -q Success $OUT_DIR/validation.txt\n";

const TASK_COMMAND: &str = "set -e\n\
./solve-task < task.desc > $OUT_DIR/out.txt 2> /dev/null\n\
./check-task task.desc $OUT_DIR/out.txt > $OUT_DIR/validation.txt\n\
grep -q Success $OUT_DIR/validation.txt\n";

fn package_prefix(kind: PoolKind) -> String {
    format!("packages/solvers/{}/", kind)
}

fn output_key(block: u64, kind: PoolKind, name: &str) -> String {
    format!("results/{}/solvers/{}/{}/", block, kind, name)
}

fn time_units_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Your solution took (\d+) time units").expect("time units pattern is valid")
    })
}

/// Extract the step count from a task validator's output.
pub fn parse_time_units(validation: &str) -> Result<u64> {
    let caps = time_units_regex()
        .captures(validation)
        .ok_or(RaceError::MissingScore)?;
    caps[1].parse().map_err(|_| RaceError::MissingScore)
}

/// Runs a solver job and reads its solution back from the blob store.
///
/// Task solutions are scored by the step count the validator reports.
pub struct BlobAttemptRunner {
    client: ExecutorClient,
    store: Arc<dyn BlobStore>,
    kind: PoolKind,
    block: u64,
}

impl BlobAttemptRunner {
    pub fn new(client: ExecutorClient, store: Arc<dyn BlobStore>, kind: PoolKind, block: u64) -> Self {
        Self {
            client,
            store,
            kind,
            block,
        }
    }
}

#[async_trait]
impl AttemptRunner for BlobAttemptRunner {
    async fn run(&self, attempt: &SolverAttempt, cancel: &CancellationToken) -> Result<Solution> {
        let out = output_key(self.block, self.kind, &attempt.name);
        self.client
            .run(&attempt.job, cancel)
            .await
            .map_err(|e| e.at_location(self.store.uri(&out)))?;

        let text = blob::read_trimmed(self.store.as_ref(), &format!("{}out.txt", out)).await?;
        match self.kind {
            PoolKind::Puzzle => Ok(Solution::new(text)),
            PoolKind::Task => {
                let validation =
                    blob::read_trimmed(self.store.as_ref(), &format!("{}validation.txt", out))
                        .await?;
                Ok(Solution::scored(text, parse_time_units(&validation)?))
            }
        }
    }
}

/// One mining round for a numbered block.
///
/// Solvers are discovered from the packages in the blob store, raced through
/// a [`SelectionEngine`], and the combined decision is written back as the
/// block's submission files.
#[derive(Clone)]
pub struct BlockRound {
    store: Arc<dyn BlobStore>,
    config: BlockConfig,
}

impl BlockRound {
    pub fn new(store: Arc<dyn BlobStore>, config: BlockConfig) -> Self {
        Self { store, config }
    }

    pub fn block(&self) -> u64 {
        self.config.block
    }

    /// Runner reading this block's outputs for solvers of `kind`.
    pub fn runner(&self, client: ExecutorClient, kind: PoolKind) -> Arc<dyn AttemptRunner> {
        Arc::new(BlobAttemptRunner::new(
            client,
            self.store.clone(),
            kind,
            self.config.block,
        ))
    }

    /// Selection engine racing this block's solvers through `client`.
    ///
    /// Both pools share one limiter sized from `config.max_in_flight`,
    /// replacing any limiter already attached to the client.
    pub fn engine(&self, client: ExecutorClient, config: SelectionConfig) -> SelectionEngine {
        let client = client.with_limiter(AdmissionLimiter::new(config.max_in_flight));
        SelectionEngine::new(
            self.runner(client.clone(), PoolKind::Puzzle),
            self.runner(client, PoolKind::Task),
            config,
        )
    }

    /// Names of the solver packages available for `kind`, sorted.
    pub async fn discover(&self, kind: PoolKind) -> Result<Vec<String>> {
        let prefix = package_prefix(kind);
        let mut names: Vec<String> = self
            .store
            .list(&prefix)
            .await?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .filter_map(|rest| rest.split('.').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn attempt(&self, kind: PoolKind, name: &str) -> SolverAttempt {
        let command = match kind {
            PoolKind::Puzzle => PUZZLE_COMMAND,
            PoolKind::Task => TASK_COMMAND,
        };
        let job = JobDescriptor::new(
            command,
            self.store.uri(&output_key(self.config.block, kind, name)),
        )
        .with_input(InputPackage::new(
            self.store
                .uri(&format!("blocks/{}/block.tar.gz", self.config.block)),
        ))
        .with_input(InputPackage::new(
            self.store
                .uri(&format!("{}{}.tar.gz", package_prefix(kind), name)),
        ));
        SolverAttempt::new(name, job)
    }

    pub async fn attempts(&self, kind: PoolKind) -> Result<Vec<SolverAttempt>> {
        Ok(self
            .discover(kind)
            .await?
            .iter()
            .map(|name| self.attempt(kind, name))
            .collect())
    }

    /// Discover the solvers of both kinds and race them.
    pub async fn run(
        &self,
        engine: &SelectionEngine,
        cancel: &CancellationToken,
    ) -> Result<RoundReport> {
        tracing::info!(block = self.config.block, "Start mining block");
        let puzzle = self.attempts(PoolKind::Puzzle).await?;
        let task = self.attempts(PoolKind::Task).await?;
        Ok(engine.run_round(puzzle, task, cancel).await)
    }

    /// Write the block's submission files. Nothing is written on a dry run.
    pub async fn submit(&self, decision: &CombinedDecision) -> Result<bool> {
        if self.config.dry_run {
            tracing::info!(block = self.config.block, "Dry run, not submitting");
            return Ok(false);
        }
        let dir = format!("blocks/{}", self.config.block);
        self.store
            .put(
                &format!("{}/submit.desc", dir),
                decision.puzzle.solution.clone().into_bytes(),
                "text/plain",
            )
            .await?;
        self.store
            .put(
                &format!("{}/submit.sol", dir),
                decision.task.solution.clone().into_bytes(),
                "text/plain",
            )
            .await?;
        tracing::info!(
            block = self.config.block,
            puzzle = %decision.puzzle.winner_name,
            task = %decision.task.winner_name,
            "Submission written"
        );
        Ok(true)
    }
}
