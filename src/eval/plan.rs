use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::blob::{self, BlobStore};
use crate::error::{RaceError, Result};
use crate::executor::{InputPackage, JobDescriptor};

/// Booster codes a purchase may contain.
pub const VALID_BOOSTERS: [char; 5] = ['B', 'C', 'F', 'L', 'R'];

/// Check that a purchase string only uses known boosters, in sorted order.
pub fn validate_purchase(purchase: &str) -> Result<()> {
    if let Some(c) = purchase.chars().find(|c| !VALID_BOOSTERS.contains(c)) {
        return Err(RaceError::InvalidPurchase(format!(
            "{}: unknown booster {}",
            purchase, c
        )));
    }
    let sorted = purchase
        .as_bytes()
        .windows(2)
        .all(|pair| pair[0] <= pair[1]);
    if !sorted {
        return Err(RaceError::InvalidPurchase(format!(
            "{}: purchase must be sorted",
            purchase
        )));
    }
    Ok(())
}

/// One solver evaluated over a set of problems and purchases.
#[derive(Debug, Clone)]
pub struct EvalPlan {
    pub solver: String,
    pub problems: Vec<String>,
    pub purchases: Vec<String>,
    /// Time limit passed to the solver on the executor
    pub timeout: Duration,
}

/// One (problem, purchase) job of a plan.
#[derive(Debug, Clone)]
pub struct EvalJob {
    pub problem: String,
    pub purchase: String,
    /// Problem name with the purchase appended, e.g. `prob-001_BC`
    pub label: String,
    /// Blob prefix the job writes its outputs under
    pub output_key: String,
    pub job: JobDescriptor,
}

impl EvalJob {
    pub fn validation_key(&self) -> String {
        format!("{}validation.txt", self.output_key)
    }
}

impl EvalPlan {
    pub fn new(
        solver: impl Into<String>,
        problems: Vec<String>,
        purchases: Vec<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let solver = solver.into();
        if solver.is_empty() {
            return Err(RaceError::InvalidPlan("solver must be specified".to_string()));
        }
        if problems.is_empty() {
            return Err(RaceError::InvalidPlan("problems must be specified".to_string()));
        }
        if purchases.is_empty() {
            return Err(RaceError::InvalidPlan("purchase must be specified".to_string()));
        }
        if timeout.is_zero() {
            return Err(RaceError::InvalidPlan("timeout must be specified".to_string()));
        }
        for purchase in &purchases {
            validate_purchase(purchase)?;
        }
        Ok(Self {
            solver,
            problems,
            purchases,
            timeout,
        })
    }

    pub fn len(&self) -> usize {
        self.problems.len() * self.purchases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand the plan into jobs, problem-major.
    pub fn jobs(&self, store: &dyn BlobStore) -> Vec<EvalJob> {
        let problems_pkg = store.uri("packages/problems.tar.gz");
        let solver_pkg = store.uri(&format!("packages/solvers/task/{}.tar.gz", self.solver));

        let mut jobs = Vec::with_capacity(self.len());
        for problem in &self.problems {
            for purchase in &self.purchases {
                let label = if purchase.is_empty() {
                    problem.clone()
                } else {
                    format!("{}_{}", problem, purchase)
                };
                let output_key = format!("evals/{}/{}/", self.solver, label);
                let command = format!(
                    "set -ex\n\
                     cp problems/{problem}.desc task.desc\n\
                     timeout {secs} ./solve-task {purchase} < task.desc > $OUT_DIR/out.txt 2> /dev/null\n\
                     ./validate task.desc $OUT_DIR/out.txt > $OUT_DIR/validation.txt\n",
                    problem = problem,
                    secs = self.timeout.as_secs_f64(),
                    purchase = purchase,
                );
                let job = JobDescriptor::new(command, store.uri(&output_key))
                    .with_input(InputPackage::new(problems_pkg.clone()))
                    .with_input(InputPackage::new(solver_pkg.clone()));
                jobs.push(EvalJob {
                    problem: problem.clone(),
                    purchase: purchase.clone(),
                    label,
                    output_key,
                    job,
                });
            }
        }
        jobs
    }
}

/// What the validator said about one evaluated solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSummary {
    pub text: String,
    pub score: Option<u64>,
    pub last_best_score: Option<u64>,
}

fn score_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""score":(\d+),"lastBestScore":(\d+)"#).expect("score pattern is valid")
    })
}

impl ValidationSummary {
    pub fn parse(text: &str) -> Self {
        let text = text.trim().to_string();
        let (score, last_best_score) = match score_regex().captures(&text) {
            Some(caps) => (caps[1].parse().ok(), caps[2].parse().ok()),
            None => (None, None),
        };
        Self {
            text,
            score,
            last_best_score,
        }
    }

    /// Read and parse the validation output of `job`.
    ///
    /// A missing or unreadable file is an error pointing at the job's output
    /// location.
    pub async fn load(store: &dyn BlobStore, job: &EvalJob) -> Result<Self> {
        let text = blob::read_trimmed(store, &job.validation_key())
            .await
            .map_err(|e| e.at_location(store.uri(&job.output_key)))?;
        Ok(Self::parse(&text))
    }

    /// The solution beats the previous best (or there was none).
    pub fn improved(&self) -> bool {
        match (self.score, self.last_best_score) {
            (Some(score), Some(best)) => best == 0 || score < best,
            _ => false,
        }
    }
}
