//! Opposing-quantity pair geometry.
//!
//! Two quantities A and B whose disagreement is being driven to zero are
//! characterized by a single invariant `I = (A - B)²`. Everything else is
//! derived from it: radius `√I`, surface area `4πr²`, volume `(4/3)πr³`,
//! curvature `1/r`. As `r → 0` the curvature tends to infinity — that is the
//! distinguished equilibrium state, not an error.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Below this radius the pair is treated as collapsed onto its fixed point.
const CURVATURE_FLOOR: f64 = 1e-10;

/// Derived convergence geometry of one A/B pairing.
#[derive(Debug, Clone, Copy)]
pub struct EigenPair {
    invariant: f64,
    radius: f64,
    surface_area: f64,
    volume: f64,
    curvature: f64,
    improvement_rate: f64,
    observations: u64,
}

impl EigenPair {
    /// Observe the pairing for the first time.
    pub fn observe(a: f64, b: f64) -> Self {
        let mut pair = Self {
            invariant: 0.0,
            radius: 0.0,
            surface_area: 0.0,
            volume: 0.0,
            curvature: f64::INFINITY,
            improvement_rate: 0.0,
            observations: 0,
        };
        pair.reobserve(a, b);
        pair
    }

    /// Re-derive the geometry from fresh A/B values. The improvement rate is
    /// the signed radius change since the previous observation.
    pub fn reobserve(&mut self, a: f64, b: f64) {
        let previous_radius = self.radius;
        let diff = a - b;
        self.invariant = diff * diff;
        self.radius = self.invariant.sqrt();
        self.surface_area = 4.0 * PI * self.radius * self.radius;
        self.volume = (4.0 / 3.0) * PI * self.radius.powi(3);
        self.curvature = if self.radius > CURVATURE_FLOOR {
            1.0 / self.radius
        } else {
            f64::INFINITY
        };
        self.improvement_rate = if self.observations == 0 {
            0.0
        } else {
            self.radius - previous_radius
        };
        self.observations += 1;
    }

    /// `I = (A - B)²`.
    pub fn invariant(&self) -> f64 {
        self.invariant
    }

    /// The pair sits (numerically) on its fixed point: `I` within the square
    /// of the convergence threshold. A paired, exact judgment — distinct from
    /// the single-value `converged` trend predicate.
    pub fn equilibrium(&self, cfg: &EngineConfig) -> bool {
        self.invariant <= cfg.eps_converge * cfg.eps_converge
    }

    /// Project one derived quantity.
    pub fn metric(&self, kind: PairMetric) -> f64 {
        match kind {
            PairMetric::Invariant => self.invariant,
            PairMetric::Radius => self.radius,
            PairMetric::SurfaceArea => self.surface_area,
            PairMetric::Volume => self.volume,
            PairMetric::Curvature => self.curvature,
            PairMetric::ImprovementRate => self.improvement_rate,
        }
    }

    /// Classify problem conditioning from the curvature.
    pub fn conditioning(&self) -> Conditioning {
        if self.curvature > 1e6 {
            Conditioning::Well
        } else if self.curvature > 1.0 {
            Conditioning::Moderate
        } else {
            Conditioning::Ill
        }
    }
}

/// Read-only projections of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairMetric {
    Invariant,
    Radius,
    SurfaceArea,
    Volume,
    Curvature,
    ImprovementRate,
}

/// Conditioning classes: a tight pairing is easy to drive to equilibrium,
/// a flat one is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditioning {
    Well,
    Moderate,
    Ill,
}
