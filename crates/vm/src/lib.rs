//! Compiled execution strategy.
//!
//! The same AST the tree-walking evaluator consumes is lowered ahead of
//! time to bytecode and run by a stack machine backed by a small runtime
//! support library. Unlike the evaluator, storage is explicit: escape
//! analysis decides at compile time whether a record lives inline on its
//! activation's frame or in an instrumented heap region with a cleanup-list
//! entry, and every activation with a non-empty cleanup list runs exactly
//! one cleanup pass before returning.

pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod runtime;

pub use bytecode::{Chunk, CompiledProgram, Op, Region, SlotAddr};
pub use compiler::compile;
pub use error::{CompileError, Error, Result};
pub use executor::{Outcome, Output, Vm};
pub use runtime::RuntimeStats;
