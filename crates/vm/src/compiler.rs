//! AST to bytecode lowering.
//!
//! Name resolution and escape analysis happen here, so the executor never
//! touches names at runtime. Entry-scope bindings are always heap records;
//! function locals stay in the frame region unless some `return` statement
//! yields them by name. A defining expression that reads its own binding
//! (directly or through the body of any function it transitively calls)
//! lowers to a body chunk driven by the `Fixpoint` instruction.
//!
//! Two static approximations of the dynamic strategy's scoping are made: a
//! function's free names resolve against entry-scope bindings that exist at
//! its definition point, and a name assigned anywhere in a body counts as
//! local from the first assignment onward.

use eigenscript_ast::{
    BinaryOp, Expr, Program, Stmt, UnaryOp, collect_calls_expr, collect_calls_stmt, expr_mentions,
    stmt_mentions, validate,
};
use eigenscript_engine::Interrogative;
use indexmap::IndexMap;
use tracing::trace;

use crate::bytecode::{Chunk, CompiledProgram, Op, Region, SlotAddr};
use crate::error::CompileError;

type Result<T> = std::result::Result<T, CompileError>;

pub fn compile(program: &Program) -> Result<CompiledProgram> {
    validate(program)?;
    let mut compiler = Compiler::new();
    compiler.predeclare(&program.stmts);
    let mut ctx = BodyCtx::entry();
    for stmt in &program.stmts {
        compiler.compile_stmt(stmt, &mut ctx)?;
    }
    compiler.chunks[0].slot_count = compiler.globals.len() as u16;
    let globals = compiler
        .globals
        .iter()
        .map(|(name, info)| (name.clone(), info.slot))
        .collect();
    Ok(CompiledProgram {
        chunks: compiler.chunks,
        globals,
    })
}

/// What the compiler knows a slot will hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindKind {
    Record,
    Pair,
    List,
    Function(u16),
}

#[derive(Debug, Clone, Copy)]
struct BindingInfo {
    slot: u16,
    kind: BindKind,
    /// False until the binding assignment has been compiled; predeclared
    /// entry-scope names start uninitialized.
    initialized: bool,
}

/// Per-body compilation state: the local name table, which locals escape,
/// and the stack of pending break patches.
struct BodyCtx {
    entry: bool,
    /// Lexical depth of this body: 0 at the entry scope, one deeper for
    /// every enclosing function definition. `where` reports it.
    depth: u16,
    locals: IndexMap<String, BindingInfo>,
    escaping: Vec<String>,
    loop_exits: Vec<Vec<usize>>,
}

impl BodyCtx {
    fn entry() -> Self {
        Self {
            entry: true,
            depth: 0,
            locals: IndexMap::new(),
            escaping: Vec::new(),
            loop_exits: Vec::new(),
        }
    }

    fn function(param: &str, escaping: Vec<String>, depth: u16) -> Self {
        let mut locals = IndexMap::new();
        locals.insert(
            param.to_string(),
            BindingInfo {
                slot: 0,
                kind: BindKind::Record,
                initialized: true,
            },
        );
        Self {
            entry: false,
            depth,
            locals,
            escaping,
            loop_exits: Vec::new(),
        }
    }
}

struct Compiler {
    chunks: Vec<Chunk>,
    cur: usize,
    globals: IndexMap<String, BindingInfo>,
    /// Bodies of every compiled function, for the transitive
    /// self-reference check.
    function_bodies: IndexMap<String, Vec<Stmt>>,
}

impl Compiler {
    fn new() -> Self {
        Self {
            chunks: vec![Chunk::default()],
            cur: 0,
            globals: IndexMap::new(),
            function_bodies: IndexMap::new(),
        }
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.chunks[self.cur]
    }

    /// Reserve entry-scope slots for every name assigned at the top level,
    /// so function bodies can resolve them regardless of textual order.
    fn predeclare(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::Assign { name, value } => {
                    if !self.globals.contains_key(name) {
                        let kind = match value {
                            Expr::Pair { .. } => BindKind::Pair,
                            Expr::ListLiteral(_) => BindKind::List,
                            _ => BindKind::Record,
                        };
                        let slot = self.globals.len() as u16;
                        self.globals.insert(
                            name.clone(),
                            BindingInfo {
                                slot,
                                kind,
                                initialized: false,
                            },
                        );
                    }
                }
                Stmt::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.predeclare(then_body);
                    self.predeclare(else_body);
                }
                Stmt::Loop { body, .. } => self.predeclare(body),
                _ => {}
            }
        }
    }

    fn lookup(&self, ctx: &BodyCtx, name: &str) -> Option<(SlotAddr, BindKind, bool)> {
        if !ctx.entry {
            if let Some(info) = ctx.locals.get(name) {
                return Some((SlotAddr::local(info.slot), info.kind, info.initialized));
            }
        }
        self.globals
            .get(name)
            .map(|info| (SlotAddr::global(info.slot), info.kind, info.initialized))
    }

    /// Bind `name` in the innermost scope, reusing its slot on rebind.
    fn define(&mut self, ctx: &mut BodyCtx, name: &str, kind: BindKind) -> SlotAddr {
        let table = if ctx.entry {
            &mut self.globals
        } else {
            &mut ctx.locals
        };
        if let Some(info) = table.get_mut(name) {
            info.kind = kind;
            info.initialized = true;
            return if ctx.entry {
                SlotAddr::global(info.slot)
            } else {
                SlotAddr::local(info.slot)
            };
        }
        let slot = table.len() as u16;
        table.insert(
            name.to_string(),
            BindingInfo {
                slot,
                kind,
                initialized: true,
            },
        );
        if ctx.entry {
            SlotAddr::global(slot)
        } else {
            SlotAddr::local(slot)
        }
    }

    fn record_addr(&self, ctx: &BodyCtx, name: &str) -> Result<SlotAddr> {
        match self.lookup(ctx, name) {
            Some((addr, BindKind::Record, _)) => Ok(addr),
            Some(_) => Err(CompileError::WrongKind {
                name: name.to_string(),
                expected: "tracked value",
            }),
            None => Err(CompileError::UnknownName(name.to_string())),
        }
    }

    fn list_addr(&self, ctx: &BodyCtx, name: &str) -> Result<SlotAddr> {
        match self.lookup(ctx, name) {
            Some((addr, BindKind::List, _)) => Ok(addr),
            Some(_) => Err(CompileError::WrongKind {
                name: name.to_string(),
                expected: "list",
            }),
            None => Err(CompileError::UnknownName(name.to_string())),
        }
    }

    fn pair_addr(&self, ctx: &BodyCtx, name: &str, requested: &str) -> Result<SlotAddr> {
        match self.lookup(ctx, name) {
            Some((addr, BindKind::Pair, _)) => Ok(addr),
            Some(_) => Err(CompileError::InvalidPredicate {
                name: name.to_string(),
                requested: requested.to_string(),
            }),
            None => Err(CompileError::UnknownName(name.to_string())),
        }
    }

    /// Does the defining expression read `name`, directly or through the
    /// body of any function it transitively calls?
    fn is_self_referential(&self, expr: &Expr, name: &str) -> bool {
        if expr_mentions(expr, name) {
            return true;
        }
        let mut pending = Vec::new();
        collect_calls_expr(expr, &mut pending);
        let mut seen: Vec<String> = Vec::new();
        while let Some(callee) = pending.pop() {
            if seen.contains(&callee) {
                continue;
            }
            seen.push(callee.clone());
            if let Some(body) = self.function_bodies.get(&callee) {
                if body.iter().any(|s| stmt_mentions(s, name)) {
                    return true;
                }
                for stmt in body {
                    collect_calls_stmt(stmt, &mut pending);
                }
            }
        }
        false
    }

    fn compile_stmt(&mut self, stmt: &Stmt, ctx: &mut BodyCtx) -> Result<()> {
        match stmt {
            Stmt::Assign { name, value } => self.compile_assign(name, value, ctx),
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.compile_expr(condition, ctx)?;
                let to_else = self.chunk().emit(Op::JumpIfFalse(0));
                for s in then_body {
                    self.compile_stmt(s, ctx)?;
                }
                let to_end = self.chunk().emit(Op::Jump(0));
                self.chunk().patch_jump(to_else);
                for s in else_body {
                    self.compile_stmt(s, ctx)?;
                }
                self.chunk().patch_jump(to_end);
                Ok(())
            }
            Stmt::Loop { condition, body } => {
                let entry = self.chunk().ops.len();
                self.compile_expr(condition, ctx)?;
                let exit = self.chunk().emit(Op::JumpIfFalse(0));
                ctx.loop_exits.push(Vec::new());
                for s in body {
                    self.compile_stmt(s, ctx)?;
                }
                self.chunk().emit(Op::Jump(entry as u16));
                self.chunk().patch_jump(exit);
                // Pushed above; this body's break jumps land here too.
                let breaks = match ctx.loop_exits.pop() {
                    Some(breaks) => breaks,
                    None => return Err(eigenscript_ast::ValidateError::BreakOutsideLoop.into()),
                };
                for at in breaks {
                    self.chunk().patch_jump(at);
                }
                Ok(())
            }
            Stmt::Break => {
                let at = self.chunk().emit(Op::Jump(0));
                match ctx.loop_exits.last_mut() {
                    Some(exits) => exits.push(at),
                    None => return Err(eigenscript_ast::ValidateError::BreakOutsideLoop.into()),
                }
                Ok(())
            }
            Stmt::FunctionDef { name, param, body } => self.compile_function(name, param, body, ctx),
            Stmt::Return(expr) => self.compile_return(expr, ctx),
            Stmt::Append { list, value } => {
                self.compile_expr(value, ctx)?;
                let addr = self.list_addr(ctx, list)?;
                self.chunk().emit(Op::Append(addr));
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.compile_expr(expr, ctx)?;
                self.chunk().emit(Op::StashResult);
                Ok(())
            }
        }
    }

    fn compile_assign(&mut self, name: &str, value: &Expr, ctx: &mut BodyCtx) -> Result<()> {
        match value {
            Expr::Pair { a, b } => {
                let a = self.record_addr(ctx, a)?;
                let b = self.record_addr(ctx, b)?;
                let slot = self.define(ctx, name, BindKind::Pair);
                self.chunk().emit(Op::CreatePair { slot, a, b });
                Ok(())
            }
            Expr::ListLiteral(items) => {
                for item in items {
                    self.compile_expr(item, ctx)?;
                }
                let slot = self.define(ctx, name, BindKind::List);
                self.chunk().emit(Op::CreateList {
                    slot,
                    len: items.len() as u16,
                });
                Ok(())
            }
            _ => {
                // Rebinding an existing record in this exact scope updates
                // in place; a self-referential right-hand side iterates.
                let existing = match self.lookup(ctx, name) {
                    Some((addr, BindKind::Record, true))
                        if addr.space == scope_space(ctx) || ctx.entry =>
                    {
                        Some(addr)
                    }
                    _ => None,
                };
                if let Some(addr) = existing {
                    if self.is_self_referential(value, name) {
                        let body = self.compile_body_chunk(value, ctx)?;
                        let name_idx = self.chunk().name(name);
                        trace!(binding = name, body, "lowered self-referential definition");
                        self.chunk().emit(Op::Fixpoint {
                            slot: addr,
                            body,
                            name: name_idx,
                        });
                        return Ok(());
                    }
                    self.compile_expr(value, ctx)?;
                    self.chunk().emit(Op::Update(addr));
                    return Ok(());
                }
                // Compiled before the define so reads of the same name in
                // the right-hand side still resolve to the outer binding.
                self.compile_expr(value, ctx)?;
                let region = self.region_for(ctx, name);
                let slot = self.define(ctx, name, BindKind::Record);
                self.chunk().emit(Op::Create { slot, region });
                Ok(())
            }
        }
    }

    fn region_for(&self, ctx: &BodyCtx, name: &str) -> Region {
        if ctx.entry || ctx.escaping.iter().any(|n| n == name) {
            Region::Heap
        } else {
            Region::Frame
        }
    }

    /// Lower a defining expression into its own chunk ending in `Return`,
    /// to be re-run by the fixpoint driver in the current activation.
    fn compile_body_chunk(&mut self, expr: &Expr, ctx: &mut BodyCtx) -> Result<u16> {
        let idx = self.chunks.len();
        self.chunks.push(Chunk::default());
        let saved = self.cur;
        self.cur = idx;
        self.compile_expr(expr, ctx)?;
        self.chunk().emit(Op::Return);
        self.cur = saved;
        Ok(idx as u16)
    }

    fn compile_function(
        &mut self,
        name: &str,
        param: &str,
        body: &[Stmt],
        ctx: &mut BodyCtx,
    ) -> Result<()> {
        self.function_bodies.insert(name.to_string(), body.to_vec());
        let idx = self.chunks.len();
        self.chunks.push(Chunk::default());
        let mut fctx = BodyCtx::function(param, collect_escaping(body), ctx.depth + 1);
        let saved = self.cur;
        self.cur = idx;
        // The caller leaves the argument on the fresh activation's stack.
        let region = self.region_for(&fctx, param);
        self.chunk().emit(Op::Create {
            slot: SlotAddr::local(0),
            region,
        });
        for stmt in body {
            self.compile_stmt(stmt, &mut fctx)?;
        }
        self.chunks[idx].slot_count = fctx.locals.len() as u16;
        self.cur = saved;
        self.define(ctx, name, BindKind::Function(idx as u16));
        Ok(())
    }

    fn compile_return(&mut self, expr: &Expr, ctx: &mut BodyCtx) -> Result<()> {
        // Returning a local binding by name makes it escape: its record (or
        // list) leaves with its cleanup obligation.
        if let Expr::Ident(n) = expr {
            if let Some(info) = ctx.locals.get(n) {
                match info.kind {
                    BindKind::Record | BindKind::List => {
                        let addr = SlotAddr::local(info.slot);
                        self.chunk().emit(Op::ReturnBinding(addr));
                        return Ok(());
                    }
                    BindKind::Pair | BindKind::Function(_) => {
                        return Err(CompileError::NotReturnable(n.clone()));
                    }
                }
            }
        }
        self.compile_expr(expr, ctx)?;
        self.chunk().emit(Op::Return);
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr, ctx: &mut BodyCtx) -> Result<()> {
        match expr {
            Expr::Number(v) => {
                let idx = self.chunk().constant(*v);
                self.chunk().emit(Op::Const(idx));
                Ok(())
            }
            Expr::Ident(name) => match self.lookup(ctx, name) {
                Some((addr, BindKind::Record, _)) => {
                    self.chunk().emit(Op::Read(addr));
                    Ok(())
                }
                Some(_) => Err(CompileError::WrongKind {
                    name: name.clone(),
                    expected: "scalar",
                }),
                None => Err(CompileError::UnknownName(name.clone())),
            },
            Expr::Binary { op, left, right } => {
                self.compile_expr(left, ctx)?;
                self.compile_expr(right, ctx)?;
                self.chunk().emit(binary_op(*op));
                Ok(())
            }
            Expr::Unary { op, operand } => {
                self.compile_expr(operand, ctx)?;
                self.chunk().emit(match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                });
                Ok(())
            }
            Expr::Call { function, arg } => {
                let chunk = match self.lookup(ctx, function) {
                    Some((_, BindKind::Function(chunk), _)) => chunk,
                    Some(_) => {
                        return Err(CompileError::WrongKind {
                            name: function.clone(),
                            expected: "function",
                        });
                    }
                    None => return Err(CompileError::UnknownName(function.clone())),
                };
                self.compile_expr(arg, ctx)?;
                self.chunk().emit(Op::Call { chunk });
                Ok(())
            }
            Expr::Predicate {
                kind,
                target,
                toward,
            } => {
                let slot = match self.lookup(ctx, target) {
                    Some((addr, BindKind::Record, _)) => addr,
                    Some(_) => {
                        return Err(CompileError::InvalidPredicate {
                            name: target.clone(),
                            requested: kind.name().to_string(),
                        });
                    }
                    None => return Err(CompileError::UnknownName(target.clone())),
                };
                let has_target = toward.is_some();
                if let Some(t) = toward {
                    self.compile_expr(t, ctx)?;
                }
                self.chunk().emit(Op::Predicate {
                    kind: *kind,
                    slot,
                    has_target,
                });
                Ok(())
            }
            Expr::Interrogative { kind, target } => {
                if self.lookup(ctx, target).is_none() {
                    return Err(CompileError::UnknownName(target.clone()));
                }
                match kind {
                    Interrogative::Who => {
                        let idx = self.chunk().name(target);
                        self.chunk().emit(Op::PushName(idx));
                    }
                    Interrogative::Where => {
                        // Lexical position, fixed at compile time; matches
                        // the scope-chain depth the dynamic strategy reports.
                        let idx = self.chunk().constant(f64::from(ctx.depth));
                        self.chunk().emit(Op::Const(idx));
                    }
                    _ => {
                        let slot = self.record_addr(ctx, target)?;
                        self.chunk().emit(Op::Interrogate { kind: *kind, slot });
                    }
                }
                Ok(())
            }
            Expr::Pair { .. } => Err(CompileError::PairNotBound),
            Expr::PairMetric { pair, kind } => {
                let slot = self.pair_addr(ctx, pair, &format!("{kind:?}"))?;
                self.chunk().emit(Op::PairMetric { slot, kind: *kind });
                Ok(())
            }
            Expr::Equilibrium { pair } => {
                let slot = self.pair_addr(ctx, pair, "equilibrium")?;
                self.chunk().emit(Op::Equilibrium(slot));
                Ok(())
            }
            Expr::FrameworkStrength => {
                self.chunk().emit(Op::Strength);
                Ok(())
            }
            Expr::ListLiteral(_) => Err(CompileError::UnboundList),
            Expr::Index { list, index } => {
                let addr = self.list_addr(ctx, list)?;
                self.compile_expr(index, ctx)?;
                self.chunk().emit(Op::IndexList(addr));
                Ok(())
            }
            Expr::Len { list } => {
                let addr = self.list_addr(ctx, list)?;
                self.chunk().emit(Op::LenList(addr));
                Ok(())
            }
        }
    }
}

fn scope_space(ctx: &BodyCtx) -> crate::bytecode::AddrSpace {
    if ctx.entry {
        crate::bytecode::AddrSpace::Global
    } else {
        crate::bytecode::AddrSpace::Local
    }
}

fn binary_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Eq => Op::CmpEq,
        BinaryOp::Ne => Op::CmpNe,
        BinaryOp::Lt => Op::CmpLt,
        BinaryOp::Le => Op::CmpLe,
        BinaryOp::Gt => Op::CmpGt,
        BinaryOp::Ge => Op::CmpGe,
        BinaryOp::And => Op::And,
        BinaryOp::Or => Op::Or,
    }
}

/// Names some `return` statement yields by identity, recursively through
/// control flow but not through nested function definitions.
fn collect_escaping(body: &[Stmt]) -> Vec<String> {
    fn walk(stmts: &[Stmt], out: &mut Vec<String>) {
        for stmt in stmts {
            match stmt {
                Stmt::Return(Expr::Ident(name)) => {
                    if !out.contains(name) {
                        out.push(name.clone());
                    }
                }
                Stmt::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    walk(then_body, out);
                    walk(else_body, out);
                }
                Stmt::Loop { body, .. } => walk(body, out),
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(body, &mut out);
    out
}
