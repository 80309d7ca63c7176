//! Traversal helpers.
//!
//! Both strategies need to know whether a defining expression mentions the
//! binding it defines (directly or through subexpressions) to decide between
//! a plain rebind and fixed-point resolution.

use crate::ast::{Expr, Stmt};

/// Does `expr` read `name` anywhere?
///
/// Predicate and interrogative targets count as reads: `x is converged`
/// inside `x`'s own definition still makes the definition self-referential.
pub fn expr_mentions(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Number(_) | Expr::FrameworkStrength => false,
        Expr::Ident(ident) => ident == name,
        Expr::Binary { left, right, .. } => {
            expr_mentions(left, name) || expr_mentions(right, name)
        }
        Expr::Unary { operand, .. } => expr_mentions(operand, name),
        Expr::Call { arg, .. } => expr_mentions(arg, name),
        Expr::Predicate { target, toward, .. } => {
            target == name || toward.as_deref().is_some_and(|t| expr_mentions(t, name))
        }
        Expr::Interrogative { target, .. } => target == name,
        Expr::Pair { a, b } => a == name || b == name,
        Expr::PairMetric { pair, .. } | Expr::Equilibrium { pair } => pair == name,
        Expr::ListLiteral(items) => items.iter().any(|item| expr_mentions(item, name)),
        Expr::Index { list, index } => list == name || expr_mentions(index, name),
        Expr::Len { list } => list == name,
    }
}

/// Does any expression within `stmt` read `name`?
pub fn stmt_mentions(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::Assign { value, .. } => expr_mentions(value, name),
        Stmt::If {
            condition,
            then_body,
            else_body,
        } => {
            expr_mentions(condition, name)
                || then_body.iter().any(|s| stmt_mentions(s, name))
                || else_body.iter().any(|s| stmt_mentions(s, name))
        }
        Stmt::Loop { condition, body } => {
            expr_mentions(condition, name) || body.iter().any(|s| stmt_mentions(s, name))
        }
        Stmt::Break => false,
        Stmt::FunctionDef { body, .. } => body.iter().any(|s| stmt_mentions(s, name)),
        Stmt::Return(expr) | Stmt::Expr(expr) => expr_mentions(expr, name),
        Stmt::Append { list, value } => list == name || expr_mentions(value, name),
    }
}

/// Collect the names of functions called anywhere inside `expr`.
///
/// Self-reference can hide behind a call chain (`x is f(0)` where `f` reads
/// `x`), so the strategies chase callee bodies through this list.
pub fn collect_calls_expr(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Number(_)
        | Expr::Ident(_)
        | Expr::Interrogative { .. }
        | Expr::Pair { .. }
        | Expr::PairMetric { .. }
        | Expr::Equilibrium { .. }
        | Expr::FrameworkStrength
        | Expr::Len { .. } => {}
        Expr::Binary { left, right, .. } => {
            collect_calls_expr(left, out);
            collect_calls_expr(right, out);
        }
        Expr::Unary { operand, .. } => collect_calls_expr(operand, out),
        Expr::Call { function, arg } => {
            if !out.contains(function) {
                out.push(function.clone());
            }
            collect_calls_expr(arg, out);
        }
        Expr::Predicate { toward, .. } => {
            if let Some(t) = toward {
                collect_calls_expr(t, out);
            }
        }
        Expr::ListLiteral(items) => {
            for item in items {
                collect_calls_expr(item, out);
            }
        }
        Expr::Index { index, .. } => collect_calls_expr(index, out),
    }
}

/// Collect the names of functions called anywhere inside `stmt`.
pub fn collect_calls_stmt(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::Assign { value, .. } | Stmt::Return(value) | Stmt::Expr(value) => {
            collect_calls_expr(value, out)
        }
        Stmt::If {
            condition,
            then_body,
            else_body,
        } => {
            collect_calls_expr(condition, out);
            for s in then_body.iter().chain(else_body) {
                collect_calls_stmt(s, out);
            }
        }
        Stmt::Loop { condition, body } => {
            collect_calls_expr(condition, out);
            for s in body {
                collect_calls_stmt(s, out);
            }
        }
        Stmt::Break => {}
        Stmt::FunctionDef { body, .. } => {
            for s in body {
                collect_calls_stmt(s, out);
            }
        }
        Stmt::Append { value, .. } => collect_calls_expr(value, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use eigenscript_engine::PredicateKind;

    #[test]
    fn direct_mention_is_found() {
        let e = Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::number(1.0));
        assert!(expr_mentions(&e, "x"));
        assert!(!expr_mentions(&e, "y"));
    }

    #[test]
    fn predicate_target_counts_as_a_read() {
        let e = Expr::predicate(PredicateKind::Converged, "x");
        assert!(expr_mentions(&e, "x"));
    }

    #[test]
    fn nested_call_argument_is_searched() {
        let e = Expr::Call {
            function: "f".to_string(),
            arg: Box::new(Expr::ident("x")),
        };
        assert!(expr_mentions(&e, "x"));
    }

    #[test]
    fn call_names_are_collected_once() {
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::Call {
                function: "f".to_string(),
                arg: Box::new(Expr::Call {
                    function: "g".to_string(),
                    arg: Box::new(Expr::number(1.0)),
                }),
            },
            Expr::Call {
                function: "f".to_string(),
                arg: Box::new(Expr::number(2.0)),
            },
        );
        let mut calls = Vec::new();
        collect_calls_expr(&e, &mut calls);
        assert_eq!(calls, vec!["f".to_string(), "g".to_string()]);
    }
}
