//! End-to-end tests running the same program through both execution
//! strategies and checking they agree on every observable result.

use eigenscript_ast::{BinaryOp, Expr, Stmt, UnaryOp};
use eigenscript_engine::{EngineConfig, Interrogative, PairMetric, PredicateKind};
use eigenscript_tests::TestHarness;

fn averaging_toward(target: f64, name: &str) -> Expr {
    Expr::binary(
        BinaryOp::Div,
        Expr::binary(BinaryOp::Add, Expr::ident(name), Expr::number(target)),
        Expr::number(2.0),
    )
}

/// A tiny convergence sequence ends converged and not diverging under both
/// strategies.
#[test]
fn near_fixed_sequence_is_converged() {
    let harness = TestHarness::new(vec![
        Stmt::assign("x", Expr::number(10.0)),
        Stmt::assign("x", Expr::number(10.000_000_1)),
        Stmt::assign("x", Expr::number(10.000_000_05)),
        Stmt::Expr(Expr::binary(
            BinaryOp::And,
            Expr::predicate(PredicateKind::Converged, "x"),
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(Expr::predicate(PredicateKind::Diverging, "x")),
            },
        )),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 1.0);
}

/// `pair(5, 3)` derives invariant 4, radius 2, curvature 0.5 identically.
#[test]
fn separated_pair_geometry() {
    for (kind, expected) in [
        (PairMetric::Invariant, 4.0),
        (PairMetric::Radius, 2.0),
        (PairMetric::Curvature, 0.5),
    ] {
        let harness = TestHarness::new(vec![
            Stmt::assign("a", Expr::number(5.0)),
            Stmt::assign("b", Expr::number(3.0)),
            Stmt::assign(
                "p",
                Expr::Pair {
                    a: "a".to_string(),
                    b: "b".to_string(),
                },
            ),
            Stmt::Expr(Expr::PairMetric {
                pair: "p".to_string(),
                kind,
            }),
        ]);
        assert_eq!(harness.assert_strategies_agree(0.0), expected);
    }
}

/// `pair(5, 5)` sits on its fixed point: invariant 0, equilibrium true.
#[test]
fn identical_pair_is_in_equilibrium() {
    let harness = TestHarness::new(vec![
        Stmt::assign("a", Expr::number(5.0)),
        Stmt::assign("b", Expr::number(5.0)),
        Stmt::assign(
            "p",
            Expr::Pair {
                a: "a".to_string(),
                b: "b".to_string(),
            },
        ),
        Stmt::Expr(Expr::Equilibrium {
            pair: "p".to_string(),
        }),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 1.0);
}

/// Contractive self-reference terminates within the cap, converged, under
/// both strategies.
#[test]
fn contractive_self_reference_settles() {
    let harness = TestHarness::new(vec![
        Stmt::assign("x", Expr::number(0.0)),
        Stmt::assign("x", averaging_toward(10.0, "x")),
        Stmt::Expr(Expr::predicate(PredicateKind::Converged, "x")),
    ]);
    assert_eq!(harness.assert_strategies_agree(1e-6), 1.0);
}

/// Divergent self-reference raises under both strategies, no later than
/// the iteration cap.
#[test]
fn divergent_self_reference_raises_in_both_strategies() {
    let stmts = vec![
        Stmt::assign("x", Expr::number(1.0)),
        Stmt::assign(
            "x",
            Expr::binary(BinaryOp::Mul, Expr::ident("x"), Expr::number(2.0)),
        ),
    ];

    let mut evaluator = eigenscript_eval::Evaluator::new();
    let program = eigenscript_ast::Program::new(stmts);
    assert!(matches!(
        evaluator.run(&program).unwrap_err(),
        eigenscript_eval::Error::Engine(eigenscript_engine::Error::Divergence { .. })
    ));

    let compiled = eigenscript_vm::compile(&program).unwrap();
    assert!(matches!(
        eigenscript_vm::Vm::new().run(&compiled).unwrap_err(),
        eigenscript_vm::Error::Engine(eigenscript_engine::Error::Divergence { .. })
    ));
}

/// Self-reference hidden behind a call chain still resolves by iteration.
#[test]
fn self_reference_through_call_chain() {
    let harness = TestHarness::new(vec![
        Stmt::assign("x", Expr::number(0.0)),
        Stmt::FunctionDef {
            name: "step".to_string(),
            param: "d".to_string(),
            body: vec![Stmt::Return(Expr::binary(
                BinaryOp::Add,
                Expr::binary(BinaryOp::Div, Expr::ident("x"), Expr::number(2.0)),
                Expr::ident("d"),
            ))],
        },
        Stmt::assign(
            "x",
            Expr::Call {
                function: "step".to_string(),
                arg: Box::new(Expr::number(5.0)),
            },
        ),
        Stmt::Expr(Expr::ident("x")),
    ]);
    let result = harness.assert_strategies_agree(1e-4);
    assert!((result - 10.0).abs() < 1e-4);
}

/// Predicate-driven loop conditions re-read live state each iteration and
/// terminate identically.
#[test]
fn predicate_driven_loop_terminates() {
    let harness = TestHarness::new(vec![
        Stmt::assign("x", Expr::number(0.0)),
        Stmt::assign("x", Expr::number(100.0)),
        Stmt::Loop {
            condition: Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(Expr::predicate(PredicateKind::Converged, "x")),
            },
            body: vec![Stmt::assign("x", averaging_toward(10.0, "x"))],
        },
        Stmt::Expr(Expr::ident("x")),
    ]);
    let result = harness.assert_strategies_agree(1e-4);
    assert!((result - 10.0).abs() < 1e-4);
}

/// `L1{ L2{ break } }` resumes after `L2`'s body, inside `L1`.
#[test]
fn break_targets_the_innermost_loop() {
    let harness = TestHarness::new(vec![
        Stmt::assign("steps", Expr::ListLiteral(vec![])),
        Stmt::assign("resumed", Expr::ListLiteral(vec![])),
        Stmt::Loop {
            condition: Expr::binary(
                BinaryOp::Lt,
                Expr::Len {
                    list: "steps".to_string(),
                },
                Expr::number(3.0),
            ),
            body: vec![
                Stmt::Loop {
                    condition: Expr::number(1.0),
                    body: vec![
                        Stmt::Append {
                            list: "steps".to_string(),
                            value: Expr::number(1.0),
                        },
                        Stmt::Break,
                        Stmt::Append {
                            list: "steps".to_string(),
                            value: Expr::number(99.0),
                        },
                    ],
                },
                Stmt::Append {
                    list: "resumed".to_string(),
                    value: Expr::number(1.0),
                },
            ],
        },
        Stmt::Expr(Expr::binary(
            BinaryOp::Add,
            Expr::Len {
                list: "steps".to_string(),
            },
            Expr::Len {
                list: "resumed".to_string(),
            },
        )),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 6.0);
}

/// Escaping a record from its defining activation transfers ownership to
/// the caller; the allocation is still released exactly once.
#[test]
fn escaped_record_is_released_exactly_once() {
    let harness = TestHarness::new(vec![
        Stmt::FunctionDef {
            name: "make".to_string(),
            param: "v".to_string(),
            body: vec![
                Stmt::assign("out", Expr::ident("v")),
                Stmt::assign(
                    "out",
                    Expr::binary(BinaryOp::Add, Expr::ident("v"), Expr::number(1.0)),
                ),
                Stmt::Return(Expr::ident("out")),
            ],
        },
        Stmt::assign(
            "kept",
            Expr::Call {
                function: "make".to_string(),
                arg: Box::new(Expr::number(7.0)),
            },
        ),
        Stmt::Expr(Expr::ident("kept")),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 8.0);

    let outcome = harness.compiled();
    assert_eq!(outcome.stats.record_allocations, 1);
    assert_eq!(outcome.stats.record_releases, 1);
}

/// A record that never leaves its activation triggers no heap allocation
/// under the compiled strategy.
#[test]
fn non_escaping_record_is_frame_allocated() {
    let harness = TestHarness::new(vec![
        Stmt::FunctionDef {
            name: "f".to_string(),
            param: "p".to_string(),
            body: vec![
                Stmt::assign("scratch", Expr::ident("p")),
                Stmt::Return(Expr::binary(
                    BinaryOp::Mul,
                    Expr::ident("scratch"),
                    Expr::number(2.0),
                )),
            ],
        },
        Stmt::Expr(Expr::Call {
            function: "f".to_string(),
            arg: Box::new(Expr::number(21.0)),
        }),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 42.0);

    let outcome = harness.compiled();
    assert_eq!(outcome.stats.record_allocations, 0);
    assert!(outcome.stats.balanced());
}

/// A binding first assigned inside a loop body keeps one record across
/// iterations: both strategies count the later passes as updates, and the
/// compiled strategy allocates exactly once.
#[test]
fn loop_body_rebinding_keeps_one_record() {
    let harness = TestHarness::new(vec![
        Stmt::assign("steps", Expr::ListLiteral(vec![])),
        Stmt::Loop {
            condition: Expr::binary(
                BinaryOp::Lt,
                Expr::Len {
                    list: "steps".to_string(),
                },
                Expr::number(3.0),
            ),
            body: vec![
                Stmt::assign("t", Expr::number(5.0)),
                Stmt::Append {
                    list: "steps".to_string(),
                    value: Expr::number(1.0),
                },
            ],
        },
        Stmt::Expr(Expr::interrogate(Interrogative::When, "t")),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 2.0);

    let outcome = harness.compiled();
    assert_eq!(outcome.stats.record_allocations, 1);
}

/// `where` is lexical position under both strategies: a function called
/// through another function still sits one scope below the entry.
#[test]
fn where_agrees_through_nested_calls() {
    let harness = TestHarness::new(vec![
        Stmt::FunctionDef {
            name: "g".to_string(),
            param: "q".to_string(),
            body: vec![Stmt::Return(Expr::interrogate(Interrogative::Where, "q"))],
        },
        Stmt::FunctionDef {
            name: "f".to_string(),
            param: "p".to_string(),
            body: vec![Stmt::Return(Expr::Call {
                function: "g".to_string(),
                arg: Box::new(Expr::ident("p")),
            })],
        },
        Stmt::Expr(Expr::Call {
            function: "f".to_string(),
            arg: Box::new(Expr::number(0.0)),
        }),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 1.0);
}

/// Recursive calls are rejected up front by both strategies.
#[test]
fn recursion_is_rejected_by_both_strategies() {
    let program = eigenscript_ast::Program::new(vec![
        Stmt::FunctionDef {
            name: "f".to_string(),
            param: "n".to_string(),
            body: vec![
                Stmt::If {
                    condition: Expr::binary(BinaryOp::Gt, Expr::ident("n"), Expr::number(0.0)),
                    then_body: vec![Stmt::Return(Expr::Call {
                        function: "f".to_string(),
                        arg: Box::new(Expr::binary(
                            BinaryOp::Sub,
                            Expr::ident("n"),
                            Expr::number(1.0),
                        )),
                    })],
                    else_body: vec![],
                },
                Stmt::Return(Expr::number(0.0)),
            ],
        },
        Stmt::Expr(Expr::Call {
            function: "f".to_string(),
            arg: Box::new(Expr::number(3.0)),
        }),
    ]);

    let mut evaluator = eigenscript_eval::Evaluator::new();
    assert!(matches!(
        evaluator.run(&program).unwrap_err(),
        eigenscript_eval::Error::Validate(eigenscript_ast::ValidateError::RecursiveCall(_))
    ));
    assert!(matches!(
        eigenscript_vm::compile(&program).unwrap_err(),
        eigenscript_vm::CompileError::Validate(eigenscript_ast::ValidateError::RecursiveCall(_))
    ));
}

/// Interrogatives project the same record state under both strategies.
#[test]
fn interrogatives_agree_across_strategies() {
    for (kind, expected) in [
        (Interrogative::What, 4.0),
        (Interrogative::When, 1.0),
        (Interrogative::Why, 3.0),
    ] {
        let harness = TestHarness::new(vec![
            Stmt::assign("t", Expr::number(1.0)),
            Stmt::assign("t", Expr::number(4.0)),
            Stmt::Expr(Expr::interrogate(kind, "t")),
        ]);
        assert_eq!(harness.assert_strategies_agree(0.0), expected);
    }
}

/// Shadowing an outer binding inside a function is an ordinary create, not
/// self-reference, and leaves the outer record untouched.
#[test]
fn shadowing_is_not_self_reference() {
    let harness = TestHarness::new(vec![
        Stmt::assign("x", Expr::number(100.0)),
        Stmt::FunctionDef {
            name: "bump".to_string(),
            param: "ignored".to_string(),
            body: vec![
                Stmt::assign(
                    "x",
                    Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::number(1.0)),
                ),
                Stmt::Return(Expr::ident("x")),
            ],
        },
        Stmt::assign(
            "r",
            Expr::Call {
                function: "bump".to_string(),
                arg: Box::new(Expr::number(0.0)),
            },
        ),
        Stmt::Expr(Expr::ident("r")),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 101.0);

    let (evaluator, _) = harness.eval();
    assert_eq!(evaluator.scalar_of("x"), Some(100.0));
}

/// Framework strength degrades identically as noisy updates accumulate.
#[test]
fn framework_strength_tracks_update_noise() {
    let mut stmts = vec![Stmt::assign("x", Expr::number(0.0))];
    for i in 0..10 {
        let v = if i % 2 == 0 { 50.0 } else { -50.0 };
        stmts.push(Stmt::assign("x", Expr::number(v)));
    }
    stmts.push(Stmt::Expr(Expr::FrameworkStrength));
    let harness = TestHarness::new(stmts);
    let strength = harness.assert_strategies_agree(1e-12);
    assert!(strength < 0.5);
}

/// A tighter iteration cap turns a slowly wandering definition into a
/// divergence error in both strategies.
#[test]
fn iteration_cap_is_honored() {
    let cfg = EngineConfig {
        max_fixpoint_iterations: 25,
        divergence_bound: f64::INFINITY,
        ..EngineConfig::default()
    };
    let stmts = vec![
        Stmt::assign("x", Expr::number(0.0)),
        // Alternates between 0 and 1 without shrinking steps.
        Stmt::assign(
            "x",
            Expr::binary(BinaryOp::Sub, Expr::number(1.0), Expr::ident("x")),
        ),
    ];
    let program = eigenscript_ast::Program::new(stmts);

    let mut evaluator = eigenscript_eval::Evaluator::with_config(cfg.clone());
    match evaluator.run(&program).unwrap_err() {
        eigenscript_eval::Error::Engine(eigenscript_engine::Error::Divergence {
            iterations,
            ..
        }) => assert_eq!(iterations, 25),
        other => panic!("expected divergence at the cap, got {other:?}"),
    }

    let compiled = eigenscript_vm::compile(&program).unwrap();
    match eigenscript_vm::Vm::with_config(cfg).run(&compiled).unwrap_err() {
        eigenscript_vm::Error::Engine(eigenscript_engine::Error::Divergence {
            iterations,
            ..
        }) => assert_eq!(iterations, 25),
        other => panic!("expected divergence at the cap, got {other:?}"),
    }
}

/// Improving toward an explicit target agrees across strategies.
#[test]
fn improving_toward_target() {
    let harness = TestHarness::new(vec![
        Stmt::assign("x", Expr::number(0.0)),
        Stmt::assign("x", Expr::number(5.0)),
        Stmt::assign("x", Expr::number(8.0)),
        Stmt::assign("x", Expr::number(9.5)),
        Stmt::Expr(Expr::Predicate {
            kind: PredicateKind::Improving,
            target: "x".to_string(),
            toward: Some(Box::new(Expr::number(10.0))),
        }),
    ]);
    assert_eq!(harness.assert_strategies_agree(0.0), 1.0);
}
