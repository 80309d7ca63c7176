//! Dynamic execution strategy.
//!
//! A tree-walking evaluator over the shared AST. The environment is a chain
//! of lexically-scoped maps from names to shared tracked-value handles;
//! reclamation is the host's reference counting, so there is no explicit
//! cleanup. Every binding, read, predicate and interrogative goes through
//! the engine crate — the evaluator adds only name resolution, control flow
//! and the self-reference detection that routes an assignment through the
//! fixed-point driver.

pub mod env;
pub mod error;
pub mod interp;
pub mod value;

pub use env::{Binding, Scope, ScopeRef};
pub use error::{Error, Result};
pub use interp::Evaluator;
pub use value::{Handle, Value};
