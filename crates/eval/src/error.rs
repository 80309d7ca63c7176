//! Evaluator errors.

use eigenscript_ast::ValidateError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] eigenscript_engine::Error),

    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error("unbound name `{0}`")]
    Unbound(String),

    #[error("`{name}` is not a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
    },

    #[error("expected a scalar value")]
    NotScalar,

    #[error("a pairing must be bound to a name before it is queried")]
    PairNotBound,

    #[error("index {index} out of bounds for `{list}` (length {len})")]
    IndexOutOfBounds {
        list: String,
        index: i64,
        len: usize,
    },
}
