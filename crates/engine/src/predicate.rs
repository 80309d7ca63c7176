//! Boolean quality judgments over a tracked value's recent state.
//!
//! Predicates are pure functions of the record and the config. The kind set
//! is a closed enum so an unsupported kind is a build error, not a runtime
//! string mismatch.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::history::HISTORY_CAPACITY;
use crate::tracked::TrackedValue;

/// The closed set of single-value predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateKind {
    /// `|gradient|` below the convergence threshold.
    Converged,
    /// Stability at or above the stability threshold.
    Stable,
    /// Magnitude beyond the divergence bound, or strictly growing.
    Diverging,
    /// Gradient sign flipping through the retained window.
    Oscillating,
    /// Distance to a target (or step size) monotonically shrinking.
    Improving,
}

impl PredicateKind {
    pub fn name(&self) -> &'static str {
        match self {
            PredicateKind::Converged => "converged",
            PredicateKind::Stable => "stable",
            PredicateKind::Diverging => "diverging",
            PredicateKind::Oscillating => "oscillating",
            PredicateKind::Improving => "improving",
        }
    }

    /// Evaluate this predicate. `target` only affects `Improving`.
    pub fn evaluate(&self, tv: &TrackedValue, cfg: &EngineConfig, target: Option<f64>) -> bool {
        match self {
            PredicateKind::Converged => converged(tv, cfg),
            PredicateKind::Stable => stable(tv, cfg),
            PredicateKind::Diverging => diverging(tv, cfg),
            PredicateKind::Oscillating => oscillating(tv, cfg),
            PredicateKind::Improving => improving(tv, target),
        }
    }
}

/// The last update barely moved the value.
pub fn converged(tv: &TrackedValue, cfg: &EngineConfig) -> bool {
    tv.gradient().abs() < cfg.eps_converge
}

/// The recent trajectory has low variance.
pub fn stable(tv: &TrackedValue, cfg: &EngineConfig) -> bool {
    tv.stability() >= cfg.theta_stable
}

/// The value has left the trusted region, or its magnitude is strictly
/// growing over the last `divergence_run` retained samples.
pub fn diverging(tv: &TrackedValue, cfg: &EngineConfig) -> bool {
    if tv.value().abs() > cfg.divergence_bound {
        return true;
    }
    let run = cfg.divergence_run;
    if run < 2 || tv.history().len() < run {
        return false;
    }
    let mut previous = f64::NEG_INFINITY;
    for sample in tv.history().recent(run) {
        let magnitude = sample.abs();
        if magnitude <= previous {
            return false;
        }
        previous = magnitude;
    }
    true
}

/// The per-step gradient changed sign at least `oscillation_flips` times
/// within the retained window. Zero-length steps carry no sign.
pub fn oscillating(tv: &TrackedValue, cfg: &EngineConfig) -> bool {
    let mut flips = 0usize;
    let mut last_sign = 0i8;
    for delta in tv.history().recent_deltas(HISTORY_CAPACITY) {
        if delta == 0.0 {
            continue;
        }
        let sign = if delta > 0.0 { 1 } else { -1 };
        if last_sign != 0 && sign != last_sign {
            flips += 1;
            if flips >= cfg.oscillation_flips {
                return true;
            }
        }
        last_sign = sign;
    }
    false
}

/// Distance to `target` (or the step magnitude, when no target is given) is
/// monotonically non-increasing over the retained window. Vacuously true
/// with fewer than two comparable entries.
pub fn improving(tv: &TrackedValue, target: Option<f64>) -> bool {
    match target {
        Some(t) => non_increasing(tv.history().recent(HISTORY_CAPACITY).map(|v| (v - t).abs())),
        None => non_increasing(tv.history().recent_deltas(HISTORY_CAPACITY).map(f64::abs)),
    }
}

fn non_increasing(samples: impl Iterator<Item = f64>) -> bool {
    let mut previous = f64::INFINITY;
    for sample in samples {
        if sample > previous {
            return false;
        }
        previous = sample;
    }
    true
}
