//! The tracked-value record.
//!
//! One record per binding: the current scalar plus enough trajectory to judge
//! where it is heading. Field order mirrors the record layout the compiled
//! strategy fixes between generated code and the runtime support library.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::context::ConvergenceContext;
use crate::history::History;

/// A scalar binding with live convergence metadata.
#[derive(Debug, Clone, Copy)]
pub struct TrackedValue {
    value: f64,
    gradient: f64,
    previous_value: f64,
    previous_gradient: f64,
    stability: f64,
    iteration: u64,
    history: History,
}

impl TrackedValue {
    /// Create a record for a fresh binding. O(1): only the first history
    /// slot is written.
    pub fn new(initial: f64) -> Self {
        Self {
            value: initial,
            gradient: 0.0,
            previous_value: initial,
            previous_gradient: 0.0,
            stability: 1.0,
            iteration: 0,
            history: History::new(initial),
        }
    }

    /// Rebind to a new value, shifting one step of lag and recomputing the
    /// derived metadata. Feeds the magnitude of change into the threaded
    /// convergence context. Amortized O(1).
    pub fn update(&mut self, new_value: f64, cfg: &EngineConfig, ctx: &mut ConvergenceContext) {
        self.previous_value = self.value;
        self.previous_gradient = self.gradient;
        self.gradient = new_value - self.value;
        self.value = new_value;
        self.history.record(new_value);
        self.iteration += 1;
        self.stability = 1.0 / (1.0 + self.history.variance(cfg.stability_window));
        ctx.record(self.gradient.abs());
    }

    /// Current scalar. No side effects.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// `value - previous_value` as of the last update.
    pub fn gradient(&self) -> f64 {
        self.gradient
    }

    pub fn previous_value(&self) -> f64 {
        self.previous_value
    }

    pub fn previous_gradient(&self) -> f64 {
        self.previous_gradient
    }

    /// Derived stability in `[0, 1]`: `1 / (1 + variance)` over the recent
    /// history window.
    pub fn stability(&self) -> f64 {
        self.stability
    }

    /// Updates since creation.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Project one field of the record.
    ///
    /// `Who` and `Where` are properties of the binding, not the payload, and
    /// return `None`; the calling strategy supplies the name and the lexical
    /// position.
    pub fn interrogate(&self, kind: Interrogative) -> Option<f64> {
        match kind {
            Interrogative::What => Some(self.value),
            Interrogative::When => Some(self.iteration as f64),
            Interrogative::Why => Some(self.gradient),
            Interrogative::How => Some(self.stability),
            Interrogative::Who | Interrogative::Where => None,
        }
    }
}

/// Named projections of a binding's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interrogative {
    /// Identity: the binding's declared name.
    Who,
    /// The current value.
    What,
    /// The iteration count.
    When,
    /// Lexical/activation position.
    Where,
    /// The gradient.
    Why,
    /// The stability metric.
    How,
}
