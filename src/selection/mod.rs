//! Selection of one solution out of many competing solver runs.
//!
//! A round races two pools of [`SolverAttempt`]s under one deadline:
//!
//! - **puzzle** pool: the first attempt to succeed wins and the rest are
//!   abandoned; a failed attempt gets one more run while time remains
//! - **task** pool: every attempt is awaited (up to the deadline) and the
//!   lowest score wins, earliest arrival breaking ties
//!
//! The round only yields a [`CombinedDecision`] if both pools have a winner.
//!
//! # Components
//!
//! - [`Pool`]: runs attempts through an [`AttemptRunner`] under a policy
//! - [`SelectionEngine`]: runs both pools of a round concurrently
//! - [`BlockRound`]: discovers solver packages for a block, builds their
//!   jobs and writes the submission

pub mod block;
pub mod engine;
pub mod pool;

pub use block::{parse_time_units, BlobAttemptRunner, BlockRound};
pub use engine::{CombinedDecision, RoundReport, SelectionEngine};
pub use pool::{
    AttemptFailure, AttemptResult, AttemptRunner, PassedAttempt, Pool, PoolKind, PoolPolicy,
    PoolReport, SelectionOutcome, Solution, SolverAttempt,
};
