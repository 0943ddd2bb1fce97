//! Admission control for remote jobs.
//!
//! Every remote job holds capacity from an [`AdmissionLimiter`] while it is
//! in flight. The limiter is the only shared counter in the engine:
//!
//! - [`AdmissionLimiter::acquire`] waits for capacity and returns a [`Permit`]
//! - [`Permit::release`] (or dropping the permit) gives the capacity back
//! - [`AdmissionLimiter::drain_wait`] is a barrier for "all jobs finished"

pub mod limiter;

pub use limiter::{AdmissionLimiter, Permit};
