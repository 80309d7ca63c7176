//! Bounded fixed-point iteration.
//!
//! Self-referential definitions never re-enter themselves recursively: each
//! self-reference reads the value recorded by the immediately preceding
//! update, and the defining expression is re-applied until a settling
//! predicate holds. The driver owns the iteration budget, so every
//! self-referential evaluation terminates — by settling, by breaching the
//! divergence bound, or by the hard cap.

use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::tracked::TrackedValue;

/// How many trailing samples a divergence report carries.
const DIAGNOSTIC_TAIL: usize = 8;

/// Outcome of one resolution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixpointStatus {
    /// The settling predicate holds; the current value is the result.
    Settled,
    /// Apply the defining expression again.
    Continue,
}

/// Iteration budget for one self-referential resolution.
#[derive(Debug)]
pub struct FixpointDriver {
    iterations: u64,
    cap: u64,
}

impl FixpointDriver {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            iterations: 0,
            cap: cfg.max_fixpoint_iterations,
        }
    }

    /// Steps taken so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Account for one update step and decide whether to keep iterating.
    ///
    /// `settled` is the strategy's settling judgment — `converged` for a
    /// plain binding, `equilibrium` for a paired one. Divergence (bound
    /// breach or cap exhaustion) is an error, never a silent truncation.
    /// Only the magnitude bound aborts early: a monotone approach to a
    /// fixed point keeps iterating until it settles.
    pub fn note_step(
        &mut self,
        binding: &str,
        settled: bool,
        tv: &TrackedValue,
        cfg: &EngineConfig,
    ) -> Result<FixpointStatus> {
        self.iterations += 1;
        if settled {
            trace!(binding, iterations = self.iterations, "fixpoint settled");
            return Ok(FixpointStatus::Settled);
        }
        if tv.value().abs() > cfg.divergence_bound || self.iterations >= self.cap {
            debug!(
                binding,
                iterations = self.iterations,
                value = tv.value(),
                "fixpoint diverged"
            );
            return Err(Error::Divergence {
                binding: binding.to_string(),
                iterations: self.iterations,
                tail: tv.history().tail(DIAGNOSTIC_TAIL),
            });
        }
        Ok(FixpointStatus::Continue)
    }
}
