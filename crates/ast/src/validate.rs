//! Static control-flow validation.
//!
//! `break` must sit inside a loop, `return` inside a function body, and
//! every call must name a function whose definition precedes it. Both
//! strategies reject a violating program before running or compiling it;
//! the checks are structural, not runtime traps. Function bodies reset the
//! loop nesting: a `break` cannot escape through a call boundary.
//!
//! The call-ordering rule also rules out recursion, direct or mutual: a
//! function can only call functions already defined, and never itself. The
//! language's only looping-by-name construct is the self-referential
//! definition, which iterates instead of re-entering.

use thiserror::Error;

use crate::ast::{Expr, Program, Stmt};
use crate::walk::collect_calls_expr;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("`break` outside of any enclosing loop")]
    BreakOutsideLoop,
    #[error("`return` outside of any function body")]
    ReturnOutsideFunction,
    #[error("recursive call to `{0}`")]
    RecursiveCall(String),
    #[error("call to `{0}` before its definition")]
    CallBeforeDefinition(String),
}

/// Check the whole program. Cheap enough to run unconditionally.
pub fn validate(program: &Program) -> Result<(), ValidateError> {
    let mut functions = Vec::new();
    check_block(&program.stmts, 0, None, &mut functions)
}

fn check_block(
    stmts: &[Stmt],
    loop_depth: usize,
    enclosing: Option<&str>,
    functions: &mut Vec<String>,
) -> Result<(), ValidateError> {
    for stmt in stmts {
        match stmt {
            Stmt::Break => {
                if loop_depth == 0 {
                    return Err(ValidateError::BreakOutsideLoop);
                }
            }
            Stmt::Return(expr) => {
                if enclosing.is_none() {
                    return Err(ValidateError::ReturnOutsideFunction);
                }
                check_calls(expr, enclosing, functions)?;
            }
            Stmt::Loop { condition, body } => {
                check_calls(condition, enclosing, functions)?;
                check_block(body, loop_depth + 1, enclosing, functions)?;
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                check_calls(condition, enclosing, functions)?;
                check_block(then_body, loop_depth, enclosing, functions)?;
                check_block(else_body, loop_depth, enclosing, functions)?;
            }
            // The body is checked before the name is recorded, so a
            // function never sees itself as callable.
            Stmt::FunctionDef { name, body, .. } => {
                check_block(body, 0, Some(name), functions)?;
                functions.push(name.clone());
            }
            Stmt::Assign { value, .. } | Stmt::Append { value, .. } | Stmt::Expr(value) => {
                check_calls(value, enclosing, functions)?;
            }
        }
    }
    Ok(())
}

fn check_calls(
    expr: &Expr,
    enclosing: Option<&str>,
    functions: &[String],
) -> Result<(), ValidateError> {
    let mut calls = Vec::new();
    collect_calls_expr(expr, &mut calls);
    for callee in calls {
        if enclosing == Some(callee.as_str()) {
            return Err(ValidateError::RecursiveCall(callee));
        }
        if !functions.iter().any(|f| *f == callee) {
            return Err(ValidateError::CallBeforeDefinition(callee));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_inside_loop_is_accepted() {
        let program = Program::new(vec![Stmt::Loop {
            condition: Expr::number(1.0),
            body: vec![Stmt::Break],
        }]);
        assert!(validate(&program).is_ok());
    }

    #[test]
    fn bare_break_is_rejected() {
        let program = Program::new(vec![Stmt::Break]);
        assert_eq!(validate(&program), Err(ValidateError::BreakOutsideLoop));
    }

    #[test]
    fn break_cannot_escape_a_function_body() {
        let program = Program::new(vec![Stmt::Loop {
            condition: Expr::number(1.0),
            body: vec![Stmt::FunctionDef {
                name: "f".to_string(),
                param: "a".to_string(),
                body: vec![Stmt::Break],
            }],
        }]);
        assert_eq!(validate(&program), Err(ValidateError::BreakOutsideLoop));
    }

    #[test]
    fn break_in_conditional_arm_inside_loop_is_accepted() {
        let program = Program::new(vec![Stmt::Loop {
            condition: Expr::number(1.0),
            body: vec![Stmt::If {
                condition: Expr::number(0.0),
                then_body: vec![Stmt::Break],
                else_body: vec![],
            }],
        }]);
        assert!(validate(&program).is_ok());
    }

    #[test]
    fn top_level_return_is_rejected() {
        let program = Program::new(vec![Stmt::Return(Expr::number(1.0))]);
        assert_eq!(validate(&program), Err(ValidateError::ReturnOutsideFunction));
    }

    #[test]
    fn call_after_definition_is_accepted() {
        let program = Program::new(vec![
            Stmt::FunctionDef {
                name: "f".to_string(),
                param: "n".to_string(),
                body: vec![Stmt::Return(Expr::ident("n"))],
            },
            Stmt::Expr(Expr::Call {
                function: "f".to_string(),
                arg: Box::new(Expr::number(1.0)),
            }),
        ]);
        assert!(validate(&program).is_ok());
    }

    #[test]
    fn call_before_definition_is_rejected() {
        let program = Program::new(vec![
            Stmt::Expr(Expr::Call {
                function: "f".to_string(),
                arg: Box::new(Expr::number(1.0)),
            }),
            Stmt::FunctionDef {
                name: "f".to_string(),
                param: "n".to_string(),
                body: vec![Stmt::Return(Expr::ident("n"))],
            },
        ]);
        assert_eq!(
            validate(&program),
            Err(ValidateError::CallBeforeDefinition("f".to_string()))
        );
    }

    #[test]
    fn direct_recursion_is_rejected() {
        let program = Program::new(vec![Stmt::FunctionDef {
            name: "f".to_string(),
            param: "n".to_string(),
            body: vec![Stmt::Return(Expr::Call {
                function: "f".to_string(),
                arg: Box::new(Expr::number(0.0)),
            })],
        }]);
        assert_eq!(
            validate(&program),
            Err(ValidateError::RecursiveCall("f".to_string()))
        );
    }

    #[test]
    fn mutual_recursion_is_rejected_by_ordering() {
        // f calls g before g exists; the cycle never forms.
        let program = Program::new(vec![Stmt::FunctionDef {
            name: "f".to_string(),
            param: "n".to_string(),
            body: vec![Stmt::Return(Expr::Call {
                function: "g".to_string(),
                arg: Box::new(Expr::number(0.0)),
            })],
        }]);
        assert_eq!(
            validate(&program),
            Err(ValidateError::CallBeforeDefinition("g".to_string()))
        );
    }
}
