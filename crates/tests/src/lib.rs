//! Integration test harness for EigenScript.
//!
//! Runs one program through both execution strategies — the tree-walking
//! evaluator and the compiled bytecode backend — so tests can assert that
//! they agree on observable results and that the compiled strategy's
//! allocation accounting balances.

use eigenscript_ast::{Program, Stmt};
use eigenscript_engine::EngineConfig;
use eigenscript_eval::{Evaluator, Value};
use eigenscript_vm::{Outcome, Vm, compile};

/// One program, both strategies.
pub struct TestHarness {
    program: Program,
    cfg: EngineConfig,
}

impl TestHarness {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            program: Program::new(stmts),
            cfg: EngineConfig::default(),
        }
    }

    pub fn with_config(stmts: Vec<Stmt>, cfg: EngineConfig) -> Self {
        Self {
            program: Program::new(stmts),
            cfg,
        }
    }

    /// Run under the dynamic strategy, returning the evaluator for state
    /// inspection alongside the last statement's value.
    ///
    /// # Panics
    ///
    /// Panics if evaluation fails.
    pub fn eval(&self) -> (Evaluator, Value) {
        let mut evaluator = Evaluator::with_config(self.cfg.clone());
        let value = evaluator
            .run(&self.program)
            .expect("dynamic evaluation failed");
        (evaluator, value)
    }

    /// Compile and run under the compiled strategy.
    ///
    /// # Panics
    ///
    /// Panics if compilation or execution fails.
    pub fn compiled(&self) -> Outcome {
        let compiled = compile(&self.program).expect("compilation failed");
        Vm::with_config(self.cfg.clone())
            .run(&compiled)
            .expect("compiled execution failed")
    }

    /// Assert both strategies produce the same last-statement scalar and
    /// agree (within `tol`) on every top-level tracked binding the compiled
    /// strategy reports. Returns the shared scalar result.
    ///
    /// # Panics
    ///
    /// Panics on any disagreement.
    pub fn assert_strategies_agree(&self, tol: f64) -> f64 {
        let (evaluator, value) = self.eval();
        let outcome = self.compiled();

        for (name, &compiled_value) in &outcome.globals {
            let dynamic_value = evaluator
                .scalar_of(name)
                .unwrap_or_else(|| panic!("`{name}` missing under the dynamic strategy"));
            assert!(
                (dynamic_value - compiled_value).abs() <= tol,
                "`{name}` disagrees: dynamic {dynamic_value}, compiled {compiled_value}"
            );
        }
        assert!(
            outcome.stats.balanced(),
            "compiled strategy leaked or double-released: {:?}",
            outcome.stats
        );

        let dynamic_result = value.as_scalar().expect("dynamic result is not scalar");
        let compiled_result = outcome.value.as_num().expect("compiled result is not scalar");
        assert!(
            (dynamic_result - compiled_result).abs() <= tol,
            "results disagree: dynamic {dynamic_result}, compiled {compiled_result}"
        );
        dynamic_result
    }
}
