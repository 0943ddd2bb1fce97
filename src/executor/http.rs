use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::ExecutorConfig;
use crate::error::{RaceError, Result};
use crate::executor::job::{JobDescriptor, JobOutcome};
use crate::executor::RemoteExecutor;

#[derive(Debug, Deserialize)]
struct ExecResponse {
    code: i32,
}

/// Executor collaborator reached over HTTP.
///
/// The job is POSTed as JSON and the call blocks until the job exits. A 500
/// response is the executor's capacity signal and is reported as a transient
/// outcome; every other non-200 status is a terminal error.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    config: ExecutorConfig,
}

impl HttpExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }
}

#[async_trait]
impl RemoteExecutor for HttpExecutor {
    async fn execute(&self, job: &JobDescriptor) -> Result<JobOutcome> {
        let mut request = self.client.post(&self.config.endpoint).json(job);
        if let Some(ref key) = self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::debug!(endpoint = %self.config.endpoint, "Executor reported capacity error");
            return Ok(JobOutcome::transient());
        }
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RaceError::ExecutorStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let parsed: ExecResponse = serde_json::from_str(&text)
            .map_err(|e| RaceError::InvalidResponse(format!("{}: {}", e, text)))?;
        Ok(JobOutcome::exited(parsed.code))
    }
}
