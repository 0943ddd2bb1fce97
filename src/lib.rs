pub mod admission;
pub mod blob;
pub mod config;
pub mod error;
pub mod eval;
pub mod executor;
pub mod selection;
pub mod shutdown;

pub use error::{RaceError, Result};
