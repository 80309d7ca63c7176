//! Engine errors.
//!
//! Structured: every error names the offending binding and carries enough of
//! the recent trajectory to diagnose it. The engine never silently clamps or
//! truncates a diverging value.

use thiserror::Error;

/// Engine result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(
        "binding `{binding}` failed to converge after {iterations} iterations \
         (recent trajectory: {tail:?})"
    )]
    Divergence {
        binding: String,
        iterations: u64,
        tail: Vec<f64>,
    },

    #[error("predicate `{requested}` is not valid on `{binding}`")]
    InvalidPredicate { binding: String, requested: String },
}
