//! Lexically-scoped environment.
//!
//! A chain of name→binding maps. Assignment rebinds the innermost scope's
//! entry — shadowing, never mutating an outer scope's binding of the same
//! name in place. Lookups walk the chain outward. Bindings are shared
//! handles, so a record lives as long as any scope or retained reference
//! can reach it.

use std::cell::RefCell;
use std::rc::Rc;

use eigenscript_ast::Stmt;
use eigenscript_engine::EigenPair;
use indexmap::IndexMap;

use crate::value::Handle;

pub type ScopeRef = Rc<RefCell<Scope>>;

/// One level of the lexical chain.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: IndexMap<String, Binding>,
    parent: Option<ScopeRef>,
}

/// What a name can be bound to.
#[derive(Debug, Clone)]
pub enum Binding {
    Tracked(Handle),
    Pair(Rc<PairBinding>),
    List(Rc<RefCell<Vec<f64>>>),
    Function(Rc<Function>),
    Text(String),
}

/// A named pairing of two tracked bindings as opposing quantities. The
/// geometry is re-derived from the live handles on every query.
#[derive(Debug)]
pub struct PairBinding {
    pub a: Handle,
    pub b: Handle,
    pub geometry: RefCell<EigenPair>,
}

impl PairBinding {
    pub fn new(a: Handle, b: Handle) -> Self {
        let geometry = RefCell::new(EigenPair::observe(a.borrow().value(), b.borrow().value()));
        Self { a, b, geometry }
    }

    /// Refresh the geometry from the current A/B values.
    pub fn refresh(&self) -> EigenPair {
        let mut geometry = self.geometry.borrow_mut();
        geometry.reobserve(self.a.borrow().value(), self.b.borrow().value());
        *geometry
    }
}

/// A user function: one parameter, a body, and the scope it closes over.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub param: String,
    pub body: Vec<Stmt>,
    pub scope: ScopeRef,
}

impl Scope {
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            bindings: IndexMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Walk the chain outward for `name`.
    pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Binding> {
        let mut current = Rc::clone(scope);
        loop {
            if let Some(binding) = current.borrow().bindings.get(name) {
                return Some(binding.clone());
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return None,
            }
        }
    }

    /// Only the innermost scope — the rebinding rule needs to distinguish
    /// "this exact scope already owns the name" from "an outer scope does".
    pub fn lookup_local(scope: &ScopeRef, name: &str) -> Option<Binding> {
        scope.borrow().bindings.get(name).cloned()
    }

    pub fn insert(scope: &ScopeRef, name: &str, binding: Binding) {
        scope.borrow_mut().bindings.insert(name.to_string(), binding);
    }

    /// Scope-chain depth (root = 0). The `where` interrogative reports this.
    pub fn depth(scope: &ScopeRef) -> usize {
        let mut depth = 0;
        let mut current = Rc::clone(scope);
        loop {
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => {
                    depth += 1;
                    current = p;
                }
                None => return depth,
            }
        }
    }
}
