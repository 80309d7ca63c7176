//! EigenScript state-tracking engine.
//!
//! Every scalar binding in EigenScript carries live convergence metadata:
//! current value, rate of change, stability, and a bounded history of recent
//! values. This crate owns that record and everything derived from it — the
//! boolean predicates (`converged`, `diverging`, ...), the opposing-quantity
//! pair geometry, the process-wide framework-strength signal, and the
//! fixed-point driver that bounds self-referential resolution.
//!
//! Both execution strategies (the tree-walking evaluator and the bytecode
//! backend) go through these operations; neither reimplements them.

pub mod config;
pub mod context;
pub mod error;
pub mod fixpoint;
pub mod history;
pub mod pair;
pub mod predicate;
mod stats;
pub mod tracked;

pub use config::EngineConfig;
pub use context::ConvergenceContext;
pub use error::{Error, Result};
pub use history::{HISTORY_CAPACITY, History};
pub use pair::{Conditioning, EigenPair, PairMetric};
pub use predicate::PredicateKind;
pub use tracked::{Interrogative, TrackedValue};
