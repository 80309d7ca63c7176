//! Engine configuration.
//!
//! Thresholds are documented defaults, not contractual constants. Every
//! judgment takes the config explicitly so a conformance suite can vary them
//! without rebuilding.

use serde::Deserialize;

/// Tunable thresholds for convergence judgments.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `converged` holds when `|gradient|` drops below this.
    pub eps_converge: f64,
    /// `stable` holds when stability reaches this.
    pub theta_stable: f64,
    /// `diverging` holds when `|value|` exceeds this bound.
    pub divergence_bound: f64,
    /// Length of the strictly-increasing `|value|` run that counts as divergence.
    pub divergence_run: usize,
    /// Gradient sign flips within the retained window that count as oscillation.
    pub oscillation_flips: usize,
    /// History window used for the stability variance.
    pub stability_window: usize,
    /// Rolling window for framework strength.
    pub strength_window: usize,
    /// Hard cap on self-referential resolution steps.
    pub max_fixpoint_iterations: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            eps_converge: 1e-6,
            theta_stable: 0.8,
            divergence_bound: 1e3,
            divergence_run: 5,
            oscillation_flips: 4,
            stability_window: 10,
            strength_window: 10,
            max_fixpoint_iterations: 10_000,
        }
    }
}
