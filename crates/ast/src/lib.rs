//! EigenScript AST.
//!
//! The tree both execution strategies consume. Producing it (tokenization,
//! grammar) is the front end's job and out of scope here; this crate only
//! defines the node types, traversal helpers, and the static control-flow
//! checks that must pass before either strategy touches a program.

pub mod ast;
pub mod validate;
pub mod walk;

pub use ast::{BinaryOp, Expr, Program, Stmt, UnaryOp};
pub use validate::{ValidateError, validate};
pub use walk::{collect_calls_expr, collect_calls_stmt, expr_mentions, stmt_mentions};
