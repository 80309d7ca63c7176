//! Node types.
//!
//! Scalar expressions plus the convergence surface: predicates,
//! interrogatives, pairings and their metrics. Booleans are represented as
//! `1.0` / `0.0` scalars throughout.

use eigenscript_engine::{Interrogative, PairMetric, PredicateKind};

/// A whole program: a statement sequence evaluated top to bottom.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

impl Program {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// Bind or rebind `name`. A right-hand side that mentions `name` is a
    /// self-referential definition and resolves by bounded fixed-point
    /// iteration.
    Assign { name: String, value: Expr },
    /// Two-armed conditional; a missing else arm is an empty block.
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// Pre-tested loop. The condition is re-evaluated against live tracked
    /// state on every iteration.
    Loop { condition: Expr, body: Vec<Stmt> },
    /// Jump to the exit of the innermost enclosing loop.
    Break,
    /// Single-parameter function definition.
    FunctionDef {
        name: String,
        param: String,
        body: Vec<Stmt>,
    },
    /// Return from the enclosing function.
    Return(Expr),
    /// Append a scalar to a list binding.
    Append { list: String, value: Expr },
    /// Expression evaluated for effect.
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Call a user function with one argument.
    Call { function: String, arg: Box<Expr> },
    /// Quality judgment on a tracked binding. `target` only affects
    /// `Improving`.
    Predicate {
        kind: PredicateKind,
        target: String,
        toward: Option<Box<Expr>>,
    },
    /// Projection of a binding's state.
    Interrogative { kind: Interrogative, target: String },
    /// Pair two tracked bindings as opposing quantities.
    Pair { a: String, b: String },
    /// Derived geometry of a pair binding.
    PairMetric { pair: String, kind: PairMetric },
    /// Exact fixed-point judgment on a pair binding.
    Equilibrium { pair: String },
    /// Process-wide framework strength from the threaded context.
    FrameworkStrength,
    ListLiteral(Vec<Expr>),
    /// Read one element of a list binding.
    Index { list: String, index: Box<Expr> },
    /// Length of a list binding.
    Len { list: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl Expr {
    pub fn number(v: f64) -> Expr {
        Expr::Number(v)
    }

    pub fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn predicate(kind: PredicateKind, target: &str) -> Expr {
        Expr::Predicate {
            kind,
            target: target.to_string(),
            toward: None,
        }
    }

    pub fn interrogate(kind: Interrogative, target: &str) -> Expr {
        Expr::Interrogative {
            kind,
            target: target.to_string(),
        }
    }
}

impl Stmt {
    pub fn assign(name: &str, value: Expr) -> Stmt {
        Stmt::Assign {
            name: name.to_string(),
            value,
        }
    }
}
