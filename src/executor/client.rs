use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::admission::AdmissionLimiter;
use crate::error::{RaceError, Result};
use crate::executor::job::{JobDescriptor, JobOutcome};
use crate::executor::RemoteExecutor;

/// Submits jobs to the executor collaborator and turns its outcomes into
/// `Result`s.
///
/// A transient outcome is retried exactly once after `retry_backoff`. When a
/// limiter is attached, one permit is held for the whole call, retry included.
#[derive(Clone)]
pub struct ExecutorClient {
    executor: Arc<dyn RemoteExecutor>,
    retry_backoff: Duration,
    limiter: Option<AdmissionLimiter>,
}

impl std::fmt::Debug for ExecutorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorClient")
            .field("retry_backoff", &self.retry_backoff)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl ExecutorClient {
    pub fn new(executor: Arc<dyn RemoteExecutor>, retry_backoff: Duration) -> Self {
        Self {
            executor,
            retry_backoff,
            limiter: None,
        }
    }

    /// Gate every call behind one unit of `limiter`.
    pub fn with_limiter(mut self, limiter: AdmissionLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn limiter(&self) -> Option<&AdmissionLimiter> {
        self.limiter.as_ref()
    }

    /// Run `job` to completion.
    ///
    /// Returns `Ok(())` on exit code 0. Cancelling `cancel` abandons the wait
    /// with [`RaceError::Cancelled`]; the remote job itself keeps running and
    /// whatever it already wrote to the blob store stays there.
    pub async fn run(&self, job: &JobDescriptor, cancel: &CancellationToken) -> Result<()> {
        let run_id = Uuid::new_v4();
        let _permit = match self.limiter {
            Some(ref limiter) => Some(limiter.acquire_cancellable(1, cancel).await?),
            None => None,
        };

        tracing::debug!(run_id = %run_id, out = job.output_uri(), "Submitting job");
        let outcome = self.submit(job, cancel).await?;
        if !outcome.transient {
            return Self::classify(run_id, outcome);
        }

        tracing::warn!(
            run_id = %run_id,
            backoff = ?self.retry_backoff,
            "Executor over capacity, retrying once"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(RaceError::Cancelled),
            _ = tokio::time::sleep(self.retry_backoff) => {}
        }

        let outcome = self.submit(job, cancel).await?;
        if outcome.transient {
            tracing::warn!(run_id = %run_id, "Executor still over capacity, giving up");
            return Err(RaceError::ExecutorOverloaded { attempts: 2 });
        }
        Self::classify(run_id, outcome)
    }

    async fn submit(&self, job: &JobDescriptor, cancel: &CancellationToken) -> Result<JobOutcome> {
        tokio::select! {
            _ = cancel.cancelled() => Err(RaceError::Cancelled),
            outcome = self.executor.execute(job) => outcome,
        }
    }

    fn classify(run_id: Uuid, outcome: JobOutcome) -> Result<()> {
        match outcome.exit_code {
            Some(0) => {
                tracing::debug!(run_id = %run_id, "Job completed");
                Ok(())
            }
            Some(code) => {
                tracing::debug!(run_id = %run_id, exit_code = code, "Job failed");
                Err(RaceError::ExitCode(code))
            }
            None => Err(RaceError::InvalidResponse(
                "executor reported neither an exit code nor a capacity error".to_string(),
            )),
        }
    }
}
