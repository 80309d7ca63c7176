//! Process-wide convergence context.
//!
//! A bounded window of recent per-update magnitudes of change across all
//! tracked values. Framework strength is derived from its variance. The
//! context is an explicit value threaded through evaluation and codegen —
//! never a hidden global — so independent evaluations cannot interfere.

use std::collections::VecDeque;

use crate::config::EngineConfig;
use crate::stats::variance;

/// Rolling magnitude-of-change window for one evaluation.
#[derive(Debug, Clone)]
pub struct ConvergenceContext {
    window: VecDeque<f64>,
    capacity: usize,
}

impl ConvergenceContext {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(cfg.strength_window),
            capacity: cfg.strength_window.max(1),
        }
    }

    /// Record one update's `|Δ|`, evicting the oldest sample at capacity.
    pub fn record(&mut self, delta_magnitude: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(delta_magnitude);
    }

    /// `FS = 1 / (1 + Var(window))`, in `(0, 1]`. An empty window carries no
    /// evidence of instability and reports 1.0.
    pub fn framework_strength(&self) -> f64 {
        1.0 / (1.0 + variance(self.window.iter().copied()))
    }

    /// Number of samples currently retained.
    pub fn samples(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_full_strength() {
        let ctx = ConvergenceContext::new(&EngineConfig::default());
        assert_eq!(ctx.framework_strength(), 1.0);
    }

    #[test]
    fn steady_updates_keep_strength_high() {
        let mut ctx = ConvergenceContext::new(&EngineConfig::default());
        for _ in 0..20 {
            ctx.record(0.001);
        }
        assert!(ctx.framework_strength() > 0.99);
    }

    #[test]
    fn erratic_updates_weaken_the_framework() {
        let mut ctx = ConvergenceContext::new(&EngineConfig::default());
        for i in 0..20 {
            ctx.record(if i % 2 == 0 { 0.0 } else { 100.0 });
        }
        assert!(ctx.framework_strength() < 0.01);
    }

    #[test]
    fn window_is_bounded_by_config() {
        let cfg = EngineConfig {
            strength_window: 4,
            ..EngineConfig::default()
        };
        let mut ctx = ConvergenceContext::new(&cfg);
        for i in 0..50 {
            ctx.record(i as f64);
        }
        assert_eq!(ctx.samples(), 4);
    }

    #[test]
    fn independent_contexts_do_not_interfere() {
        let cfg = EngineConfig::default();
        let mut noisy = ConvergenceContext::new(&cfg);
        let calm = ConvergenceContext::new(&cfg);
        for i in 0..10 {
            noisy.record(i as f64 * 37.0);
        }
        assert_eq!(calm.framework_strength(), 1.0);
        assert!(noisy.framework_strength() < 1.0);
    }
}
