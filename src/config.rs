use std::time::Duration;

/// Price of one second of executor time, in yen.
pub const DEFAULT_COST_PER_SECOND: f64 = 0.000029 * 107.32;

/// Configuration for the remote executor collaborator.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// URL jobs are POSTed to
    pub endpoint: String,
    /// Value of the `X-API-Key` header, if the executor requires one
    pub api_key: Option<String>,
    /// Wait before the single retry after a capacity error
    pub retry_backoff: Duration,
    /// Upper bound on one HTTP round trip. `None` waits as long as the job runs.
    pub request_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/exec".to_string(),
            api_key: None,
            retry_backoff: Duration::from_secs(5),
            request_timeout: None,
        }
    }
}

impl ExecutorConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Configuration for batch evaluation runs.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Maximum number of jobs running on the executor at once
    pub max_in_flight: u32,
    /// Delay between two job submissions
    pub pacing: Duration,
    /// Estimated price of one second of job time
    pub cost_per_second: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 100,
            pacing: Duration::from_millis(200),
            cost_per_second: DEFAULT_COST_PER_SECOND,
        }
    }
}

impl EvalConfig {
    pub fn with_max_in_flight(mut self, limit: u32) -> Self {
        self.max_in_flight = limit;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

/// Configuration for one selection round.
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Shared deadline for both pools
    pub deadline: Duration,
    /// Rerun a failed puzzle attempt once while the deadline allows it
    pub retry_puzzle_failures: bool,
    /// Maximum number of solver jobs in flight across both pools; see
    /// `BlockRound::engine`
    pub max_in_flight: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10 * 60),
            retry_puzzle_failures: true,
            max_in_flight: 64,
        }
    }
}

impl SelectionConfig {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_in_flight(mut self, limit: u32) -> Self {
        self.max_in_flight = limit;
        self
    }
}

/// Which block a mining round works on and whether it submits.
#[derive(Debug, Clone, Default)]
pub struct BlockConfig {
    pub block: u64,
    /// Run the solvers but do not write submission files
    pub dry_run: bool,
}

impl BlockConfig {
    pub fn new(block: u64) -> Self {
        Self {
            block,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
