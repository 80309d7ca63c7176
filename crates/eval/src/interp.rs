//! Tree-walking evaluator.

use std::rc::Rc;

use eigenscript_ast::{
    BinaryOp, Expr, Program, Stmt, UnaryOp, collect_calls_stmt, expr_mentions, stmt_mentions,
    validate,
};
use eigenscript_engine::fixpoint::{FixpointDriver, FixpointStatus};
use eigenscript_engine::{ConvergenceContext, EngineConfig, Interrogative, predicate};
use tracing::{debug, trace};

use crate::env::{Binding, Function, PairBinding, Scope, ScopeRef};
use crate::error::{Error, Result};
use crate::value::{Handle, Value, new_handle};

/// Control-flow signal threaded through statement evaluation.
enum Flow {
    Normal(Value),
    Break,
    Return(Value),
}

/// The dynamic strategy: walks the AST, holding the engine config and the
/// explicit convergence context for the whole evaluation.
pub struct Evaluator {
    cfg: EngineConfig,
    ctx: ConvergenceContext,
    globals: ScopeRef,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(cfg: EngineConfig) -> Self {
        let ctx = ConvergenceContext::new(&cfg);
        Self {
            cfg,
            ctx,
            globals: Scope::root(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn context(&self) -> &ConvergenceContext {
        &self.ctx
    }

    /// Validate and evaluate a whole program, returning the value of its
    /// last statement.
    pub fn run(&mut self, program: &Program) -> Result<Value> {
        validate(program)?;
        let globals = Rc::clone(&self.globals);
        match self.eval_block(&program.stmts, &globals)? {
            Flow::Normal(value) => Ok(value),
            // Validation rejects top-level break/return.
            Flow::Break | Flow::Return(_) => unreachable!("rejected by validation"),
        }
    }

    /// Current value of a top-level tracked binding, for inspection.
    pub fn scalar_of(&self, name: &str) -> Option<f64> {
        match Scope::lookup(&self.globals, name) {
            Some(Binding::Tracked(handle)) => Some(handle.borrow().value()),
            _ => None,
        }
    }

    /// Live handle of a top-level tracked binding.
    pub fn handle_of(&self, name: &str) -> Option<Handle> {
        match Scope::lookup(&self.globals, name) {
            Some(Binding::Tracked(handle)) => Some(handle),
            _ => None,
        }
    }

    fn eval_block(&mut self, stmts: &[Stmt], scope: &ScopeRef) -> Result<Flow> {
        let mut last = Value::Scalar(0.0);
        for stmt in stmts {
            match self.eval_stmt(stmt, scope)? {
                Flow::Normal(value) => last = value,
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal(last))
    }

    fn eval_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Result<Flow> {
        match stmt {
            Stmt::Assign { name, value } => {
                self.assign(name, value, scope)?;
                Ok(Flow::Normal(Value::Scalar(0.0)))
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.eval_expr(condition, scope)?.truthy()? {
                    self.eval_block(then_body, scope)
                } else {
                    self.eval_block(else_body, scope)
                }
            }
            Stmt::Loop { condition, body } => {
                // The condition re-reads live tracked state on every pass;
                // predicate results are never cached across iterations.
                while self.eval_expr(condition, scope)?.truthy()? {
                    match self.eval_block(body, scope)? {
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                        Flow::Normal(_) => {}
                    }
                }
                Ok(Flow::Normal(Value::Scalar(0.0)))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::FunctionDef { name, param, body } => {
                let function = Function {
                    name: name.clone(),
                    param: param.clone(),
                    body: body.clone(),
                    scope: Rc::clone(scope),
                };
                Scope::insert(scope, name, Binding::Function(Rc::new(function)));
                Ok(Flow::Normal(Value::Scalar(0.0)))
            }
            Stmt::Return(expr) => {
                // Returning a binding by name hands the caller the live
                // handle — the dynamic analogue of record escape.
                let value = match expr {
                    Expr::Ident(name) => match Scope::lookup(scope, name) {
                        Some(Binding::Tracked(handle)) => Value::Tracked(handle),
                        Some(Binding::List(list)) => Value::List(list),
                        _ => self.eval_expr(expr, scope)?,
                    },
                    _ => self.eval_expr(expr, scope)?,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Append { list, value } => {
                let item = self.eval_expr(value, scope)?.as_scalar()?;
                match Scope::lookup(scope, list) {
                    Some(Binding::List(items)) => {
                        items.borrow_mut().push(item);
                        Ok(Flow::Normal(Value::Scalar(0.0)))
                    }
                    Some(_) => Err(Error::WrongKind {
                        name: list.clone(),
                        expected: "list",
                    }),
                    None => Err(Error::Unbound(list.clone())),
                }
            }
            Stmt::Expr(expr) => Ok(Flow::Normal(self.eval_expr(expr, scope)?)),
        }
    }

    fn assign(&mut self, name: &str, expr: &Expr, scope: &ScopeRef) -> Result<()> {
        // Pairings and list literals bind structurally.
        if let Expr::Pair { a, b } = expr {
            let a = self.tracked_handle(a, scope)?;
            let b = self.tracked_handle(b, scope)?;
            Scope::insert(scope, name, Binding::Pair(Rc::new(PairBinding::new(a, b))));
            return Ok(());
        }
        if let Expr::ListLiteral(items) = expr {
            let list = self.eval_list(items, scope)?;
            Scope::insert(scope, name, Binding::List(list));
            return Ok(());
        }

        // Self-reference means the *innermost* scope already owns the name:
        // shadowing an outer binding of the same name resolves its reads
        // against the outer entry and is a plain create.
        if self.is_self_referential(expr, name, scope) {
            if let Some(Binding::Tracked(handle)) = Scope::lookup_local(scope, name) {
                return self.resolve_fixpoint(name, expr, &handle, scope);
            }
        }

        match self.eval_expr(expr, scope)? {
            Value::Scalar(v) => match Scope::lookup_local(scope, name) {
                Some(Binding::Tracked(handle)) => {
                    handle.borrow_mut().update(v, &self.cfg, &mut self.ctx);
                }
                _ => Scope::insert(scope, name, Binding::Tracked(new_handle(v))),
            },
            // Adopt an escaped record rather than copying its value.
            Value::Tracked(handle) => Scope::insert(scope, name, Binding::Tracked(handle)),
            Value::List(list) => Scope::insert(scope, name, Binding::List(list)),
            Value::Text(text) => Scope::insert(scope, name, Binding::Text(text)),
        }
        Ok(())
    }

    /// Bounded fixed-point resolution of `name is f(name)`. Each re-read of
    /// `name` inside the defining expression sees the value recorded by the
    /// immediately preceding update — never a recursive re-entry.
    fn resolve_fixpoint(
        &mut self,
        name: &str,
        expr: &Expr,
        handle: &Handle,
        scope: &ScopeRef,
    ) -> Result<()> {
        debug!(binding = name, "resolving self-referential definition");
        let mut driver = FixpointDriver::new(&self.cfg);
        loop {
            let next = self.eval_expr(expr, scope)?.as_scalar()?;
            let status = {
                let mut tv = handle.borrow_mut();
                tv.update(next, &self.cfg, &mut self.ctx);
                let settled = predicate::converged(&tv, &self.cfg);
                driver.note_step(name, settled, &tv, &self.cfg)?
            };
            match status {
                FixpointStatus::Settled => {
                    trace!(
                        binding = name,
                        iterations = driver.iterations(),
                        "fixpoint resolved"
                    );
                    return Ok(());
                }
                FixpointStatus::Continue => {}
            }
        }
    }

    /// Does the defining expression read `name`, directly or through the
    /// body of any function it (transitively) calls?
    fn is_self_referential(&self, expr: &Expr, name: &str, scope: &ScopeRef) -> bool {
        if expr_mentions(expr, name) {
            return true;
        }
        let mut pending = Vec::new();
        eigenscript_ast::collect_calls_expr(expr, &mut pending);
        let mut seen: Vec<String> = Vec::new();
        while let Some(callee) = pending.pop() {
            if seen.contains(&callee) {
                continue;
            }
            seen.push(callee.clone());
            if let Some(Binding::Function(function)) = Scope::lookup(scope, &callee) {
                if function.body.iter().any(|s| stmt_mentions(s, name)) {
                    return true;
                }
                for stmt in &function.body {
                    collect_calls_stmt(stmt, &mut pending);
                }
            }
        }
        false
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Value> {
        match expr {
            Expr::Number(v) => Ok(Value::Scalar(*v)),
            Expr::Ident(name) => match Scope::lookup(scope, name) {
                Some(Binding::Tracked(handle)) => Ok(Value::Scalar(handle.borrow().value())),
                Some(Binding::List(list)) => Ok(Value::List(list)),
                Some(Binding::Text(text)) => Ok(Value::Text(text)),
                Some(Binding::Pair(_)) | Some(Binding::Function(_)) => Err(Error::WrongKind {
                    name: name.clone(),
                    expected: "scalar",
                }),
                None => Err(Error::Unbound(name.clone())),
            },
            Expr::Binary { op, left, right } => {
                let l = self.eval_expr(left, scope)?.as_scalar()?;
                let r = self.eval_expr(right, scope)?.as_scalar()?;
                Ok(apply_binary(*op, l, r))
            }
            Expr::Unary { op, operand } => {
                let v = self.eval_expr(operand, scope)?.as_scalar()?;
                Ok(match op {
                    UnaryOp::Neg => Value::Scalar(-v),
                    UnaryOp::Not => Value::bool(v == 0.0),
                })
            }
            Expr::Call { function, arg } => self.call(function, arg, scope),
            Expr::Predicate {
                kind,
                target,
                toward,
            } => {
                let toward = match toward {
                    Some(expr) => Some(self.eval_expr(expr, scope)?.as_scalar()?),
                    None => None,
                };
                match Scope::lookup(scope, target) {
                    Some(Binding::Tracked(handle)) => {
                        let holds = kind.evaluate(&handle.borrow(), &self.cfg, toward);
                        Ok(Value::bool(holds))
                    }
                    Some(_) => Err(eigenscript_engine::Error::InvalidPredicate {
                        binding: target.clone(),
                        requested: kind.name().to_string(),
                    }
                    .into()),
                    None => Err(Error::Unbound(target.clone())),
                }
            }
            Expr::Interrogative { kind, target } => {
                self.interrogate(*kind, target, scope)
            }
            Expr::Pair { .. } => Err(Error::PairNotBound),
            Expr::PairMetric { pair, kind } => {
                let binding = self.pair_binding(pair, &format!("{kind:?}"), scope)?;
                Ok(Value::Scalar(binding.refresh().metric(*kind)))
            }
            Expr::Equilibrium { pair } => {
                let binding = self.pair_binding(pair, "equilibrium", scope)?;
                Ok(Value::bool(binding.refresh().equilibrium(&self.cfg)))
            }
            Expr::FrameworkStrength => Ok(Value::Scalar(self.ctx.framework_strength())),
            Expr::ListLiteral(items) => Ok(Value::List(self.eval_list(items, scope)?)),
            Expr::Index { list, index } => {
                let i = self.eval_expr(index, scope)?.as_scalar()? as i64;
                match Scope::lookup(scope, list) {
                    Some(Binding::List(items)) => {
                        let items = items.borrow();
                        if i < 0 || i as usize >= items.len() {
                            return Err(Error::IndexOutOfBounds {
                                list: list.clone(),
                                index: i,
                                len: items.len(),
                            });
                        }
                        Ok(Value::Scalar(items[i as usize]))
                    }
                    Some(_) => Err(Error::WrongKind {
                        name: list.clone(),
                        expected: "list",
                    }),
                    None => Err(Error::Unbound(list.clone())),
                }
            }
            Expr::Len { list } => match Scope::lookup(scope, list) {
                Some(Binding::List(items)) => Ok(Value::Scalar(items.borrow().len() as f64)),
                Some(_) => Err(Error::WrongKind {
                    name: list.clone(),
                    expected: "list",
                }),
                None => Err(Error::Unbound(list.clone())),
            },
        }
    }

    fn interrogate(&mut self, kind: Interrogative, target: &str, scope: &ScopeRef) -> Result<Value> {
        let binding = Scope::lookup(scope, target).ok_or_else(|| Error::Unbound(target.to_string()))?;
        match kind {
            // Identity and position belong to the binding, not the payload.
            Interrogative::Who => Ok(Value::Text(target.to_string())),
            Interrogative::Where => Ok(Value::Scalar(Scope::depth(scope) as f64)),
            _ => match binding {
                Binding::Tracked(handle) => {
                    let projected = handle.borrow().interrogate(kind);
                    // Who/Where were handled above; the engine answers the rest.
                    Ok(Value::Scalar(projected.unwrap_or(0.0)))
                }
                _ => Err(Error::WrongKind {
                    name: target.to_string(),
                    expected: "tracked value",
                }),
            },
        }
    }

    fn call(&mut self, function: &str, arg: &Expr, scope: &ScopeRef) -> Result<Value> {
        let callee = match Scope::lookup(scope, function) {
            Some(Binding::Function(f)) => f,
            Some(_) => {
                return Err(Error::WrongKind {
                    name: function.to_string(),
                    expected: "function",
                });
            }
            None => return Err(Error::Unbound(function.to_string())),
        };
        let arg_value = self.eval_expr(arg, scope)?.as_scalar()?;
        let frame = Scope::child(&callee.scope);
        Scope::insert(&frame, &callee.param, Binding::Tracked(new_handle(arg_value)));
        trace!(function = %callee.name, arg = arg_value, "calling");
        match self.eval_block(&callee.body, &frame)? {
            Flow::Return(value) | Flow::Normal(value) => Ok(value),
            // Validation rejects breaks that cross a function boundary.
            Flow::Break => unreachable!("rejected by validation"),
        }
    }

    fn eval_list(
        &mut self,
        items: &[Expr],
        scope: &ScopeRef,
    ) -> Result<std::rc::Rc<std::cell::RefCell<Vec<f64>>>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(self.eval_expr(item, scope)?.as_scalar()?);
        }
        Ok(Rc::new(std::cell::RefCell::new(values)))
    }

    fn pair_binding(
        &self,
        name: &str,
        requested: &str,
        scope: &ScopeRef,
    ) -> Result<Rc<PairBinding>> {
        match Scope::lookup(scope, name) {
            Some(Binding::Pair(pair)) => Ok(pair),
            Some(_) => Err(eigenscript_engine::Error::InvalidPredicate {
                binding: name.to_string(),
                requested: requested.to_string(),
            }
            .into()),
            None => Err(Error::Unbound(name.to_string())),
        }
    }

    fn tracked_handle(&self, name: &str, scope: &ScopeRef) -> Result<Handle> {
        match Scope::lookup(scope, name) {
            Some(Binding::Tracked(handle)) => Ok(handle),
            Some(_) => Err(Error::WrongKind {
                name: name.to_string(),
                expected: "tracked value",
            }),
            None => Err(Error::Unbound(name.to_string())),
        }
    }
}

fn apply_binary(op: BinaryOp, l: f64, r: f64) -> Value {
    match op {
        BinaryOp::Add => Value::Scalar(l + r),
        BinaryOp::Sub => Value::Scalar(l - r),
        BinaryOp::Mul => Value::Scalar(l * r),
        BinaryOp::Div => Value::Scalar(l / r),
        BinaryOp::Eq => Value::bool(l == r),
        BinaryOp::Ne => Value::bool(l != r),
        BinaryOp::Lt => Value::bool(l < r),
        BinaryOp::Le => Value::bool(l <= r),
        BinaryOp::Gt => Value::bool(l > r),
        BinaryOp::Ge => Value::bool(l >= r),
        BinaryOp::And => Value::bool(l != 0.0 && r != 0.0),
        BinaryOp::Or => Value::bool(l != 0.0 || r != 0.0),
    }
}
