//! Compile-time and runtime error surfaces.

use eigenscript_ast::ValidateError;
use thiserror::Error;

/// Errors raised while lowering an AST to bytecode.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error("unknown name `{0}`")]
    UnknownName(String),

    #[error("`{name}` is not a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
    },

    #[error("predicate `{requested}` is not defined on `{name}`")]
    InvalidPredicate { name: String, requested: String },

    #[error("`{0}` cannot be returned from a function")]
    NotReturnable(String),

    #[error("a pairing must be bound to a name before it is queried")]
    PairNotBound,

    #[error("list literals must be bound to a name")]
    UnboundList,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while executing bytecode.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] eigenscript_engine::Error),

    #[error("record {0} read after release")]
    UseAfterRelease(u32),

    #[error("record {0} released twice")]
    DoubleRelease(u32),

    #[error("expected a {expected} value")]
    TypeMismatch { expected: &'static str },

    #[error("read of a slot that holds no binding")]
    UnboundSlot,

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("corrupt bytecode: {0}")]
    Corrupt(&'static str),
}
