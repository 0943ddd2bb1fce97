use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionLimiter;
use crate::config::EvalConfig;
use crate::error::RaceError;
use crate::executor::{ExecutorClient, JobDescriptor};

/// Result of one job in a batch.
#[derive(Debug)]
pub struct EvalRecord {
    /// Position of the job in the submitted batch
    pub index: usize,
    pub job: JobDescriptor,
    pub started_at: DateTime<Utc>,
    /// Wall-clock time from admission to completion
    pub duration: Duration,
    pub error: Option<RaceError>,
}

impl EvalRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Running totals reported while a batch drains.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalProgress {
    pub done: usize,
    pub total: usize,
    pub failed: usize,
    pub total_duration: Duration,
}

impl EvalProgress {
    pub fn estimated_cost(&self, cost_per_second: f64) -> f64 {
        self.total_duration.as_secs_f64() * cost_per_second
    }
}

/// Runs a batch of independent jobs, at most `max_in_flight` at a time.
///
/// Jobs are dispatched in order with a fixed pacing delay between
/// submissions. A failing job is logged and recorded but never affects its
/// siblings.
#[derive(Debug, Clone)]
pub struct FanOutEvaluator {
    client: ExecutorClient,
    limiter: AdmissionLimiter,
    config: EvalConfig,
}

impl FanOutEvaluator {
    pub fn new(client: ExecutorClient, config: EvalConfig) -> Self {
        Self {
            limiter: AdmissionLimiter::new(config.max_in_flight),
            client,
            config,
        }
    }

    /// Share an existing limiter instead of the one sized from the config.
    pub fn with_limiter(mut self, limiter: AdmissionLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &AdmissionLimiter {
        &self.limiter
    }

    pub async fn evaluate(
        &self,
        jobs: Vec<JobDescriptor>,
        cancel: &CancellationToken,
    ) -> Vec<EvalRecord> {
        self.evaluate_with_progress(jobs, cancel, |_| {}).await
    }

    /// Run every job and return one record per job, in completion order.
    ///
    /// `on_progress` is called once before the first result and again after
    /// each one.
    pub async fn evaluate_with_progress<F>(
        &self,
        jobs: Vec<JobDescriptor>,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Vec<EvalRecord>
    where
        F: FnMut(&EvalProgress),
    {
        let total = jobs.len();
        tracing::info!(total, "Running jobs");

        let (tx, mut rx) = mpsc::channel(total.max(1));
        let dispatcher = tokio::spawn(Self::dispatch(
            jobs,
            self.client.clone(),
            self.limiter.clone(),
            self.config.pacing,
            cancel.clone(),
            tx,
        ));

        let mut progress = EvalProgress {
            total,
            ..Default::default()
        };
        on_progress(&progress);

        let mut records = Vec::with_capacity(total);
        while records.len() < total {
            let record = match rx.recv().await {
                Some(record) => record,
                None => break,
            };

            progress.done += 1;
            progress.total_duration += record.duration;
            if let Some(ref e) = record.error {
                progress.failed += 1;
                tracing::error!(
                    index = record.index,
                    out = record.job.output_uri(),
                    error = %e,
                    "Job failed"
                );
            }
            tracing::debug!(
                done = progress.done,
                total,
                cost = progress.estimated_cost(self.config.cost_per_second),
                "Progress"
            );
            on_progress(&progress);
            records.push(record);
        }

        if let Err(e) = dispatcher.await {
            tracing::error!(error = %e, "Job dispatcher panicked");
        }
        if records.len() < total {
            tracing::warn!(
                received = records.len(),
                total,
                "Some job tasks ended without reporting"
            );
        }

        tracing::info!(
            total,
            failed = progress.failed,
            total_duration = ?progress.total_duration,
            cost = progress.estimated_cost(self.config.cost_per_second),
            "Finished"
        );
        records
    }

    async fn dispatch(
        jobs: Vec<JobDescriptor>,
        client: ExecutorClient,
        limiter: AdmissionLimiter,
        pacing: Duration,
        cancel: CancellationToken,
        tx: mpsc::Sender<EvalRecord>,
    ) {
        for (index, job) in jobs.into_iter().enumerate() {
            if index > 0 && !cancel.is_cancelled() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(pacing) => {}
                }
            }
            tokio::spawn(Self::run_one(
                index,
                job,
                client.clone(),
                limiter.clone(),
                cancel.clone(),
                tx.clone(),
            ));
        }
    }

    async fn run_one(
        index: usize,
        job: JobDescriptor,
        client: ExecutorClient,
        limiter: AdmissionLimiter,
        cancel: CancellationToken,
        tx: mpsc::Sender<EvalRecord>,
    ) {
        let record = match limiter.acquire_cancellable(1, &cancel).await {
            Ok(permit) => {
                let started_at = Utc::now();
                let start = Instant::now();
                let result = client.run(&job, &cancel).await;
                let duration = start.elapsed();
                permit.release();
                EvalRecord {
                    index,
                    job,
                    started_at,
                    duration,
                    error: result.err(),
                }
            }
            Err(e) => EvalRecord {
                index,
                job,
                started_at: Utc::now(),
                duration: Duration::ZERO,
                error: Some(e),
            },
        };

        // The receiver only goes away if the caller stopped waiting.
        let _ = tx.send(record).await;
    }
}
