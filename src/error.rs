use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaceError {
    #[error("Requested {requested} units but limiter capacity is {capacity}")]
    CapacityExceeded { requested: u32, capacity: u32 },

    #[error("Admission limiter is closed")]
    LimiterClosed,

    #[error("Task terminated with exit code {0}")]
    ExitCode(i32),

    #[error("Executor returned a capacity error {attempts} times (quota limit?)")]
    ExecutorOverloaded { attempts: u32 },

    #[error("Executor returned {status}: {body}")]
    ExecutorStatus { status: u16, body: String },

    #[error("Invalid executor response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validator output does not contain a score")]
    MissingScore,

    #[error("No {pool} solver passed: {reason}")]
    NoWinner { pool: String, reason: String },

    #[error("No valid solution pair for the round")]
    NoCombinedDecision,

    #[error("Invalid purchase {0:?}")]
    InvalidPurchase(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{source}; check logs at {location}")]
    WithLocation {
        location: String,
        #[source]
        source: Box<RaceError>,
    },
}

impl RaceError {
    /// Attach the blob location of a job's outputs to an error.
    pub fn at_location(self, location: impl Into<String>) -> Self {
        RaceError::WithLocation {
            location: location.into(),
            source: Box::new(self),
        }
    }

    /// True if the error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            RaceError::Cancelled => true,
            RaceError::WithLocation { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RaceError>;
