//! Batch evaluation of a solver over many problems.
//!
//! - [`FanOutEvaluator`]: runs independent jobs under an admission limit and
//!   reports per-job records plus running cost estimates
//! - [`EvalPlan`]: expands solver × problems × purchases into jobs

pub mod evaluator;
pub mod plan;

pub use evaluator::{EvalProgress, EvalRecord, FanOutEvaluator};
pub use plan::{validate_purchase, EvalJob, EvalPlan, ValidationSummary};
