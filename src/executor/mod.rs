//! Remote job execution.
//!
//! Jobs never run locally. They are described by a [`JobDescriptor`] and
//! handed to a [`RemoteExecutor`], which blocks until the job exits and
//! writes the job's outputs to the blob store.
//!
//! # Components
//!
//! - [`RemoteExecutor`]: the executor collaborator (one request per job)
//! - [`HttpExecutor`]: the collaborator reached over HTTP
//! - [`ExecutorClient`]: retry-once-on-capacity-error wrapper used by the
//!   evaluator and the selection engine

pub mod client;
pub mod http;
pub mod job;

use async_trait::async_trait;

use crate::error::Result;

pub use client::ExecutorClient;
pub use http::HttpExecutor;
pub use job::{InputPackage, JobDescriptor, JobOutcome};

/// The external service that runs jobs.
///
/// `execute` returns once the job has exited. A capacity problem on the
/// executor side is reported as [`JobOutcome::transient`], not as an error.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, job: &JobDescriptor) -> Result<JobOutcome>;
}
