//! Lexical environments.
//!
//! An `Env` is a cheap handle to a shared scope; the parent chain gives
//! lexical nesting. Closures capture by cloning the handle, so a function
//! keeps its creation chain alive after the creator returns. Environments
//! are reference-counted rather than heap-managed: the collector walks
//! reachable chains during marking but never owns them.

use std::cell::RefCell;
use std::rc::Rc;

use super::value::{FastHashMap, Value, fast_map_new};
use crate::errors::RuntimeError;

#[derive(Clone, Copy, Debug)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

#[derive(Debug)]
pub struct Scope {
    pub(crate) bindings: FastHashMap<String, Binding>,
    pub(crate) parent: Option<Env>,
}

#[derive(Clone, Debug)]
pub struct Env(Rc<RefCell<Scope>>);

impl Env {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Scope {
            bindings: fast_map_new(),
            parent: None,
        })))
    }

    /// A fresh scope whose parent is this one. Used for blocks, loops, and
    /// function calls (with the callee's closure as parent).
    pub fn child(&self) -> Self {
        Self(Rc::new(RefCell::new(Scope {
            bindings: fast_map_new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn parent(&self) -> Option<Env> {
        self.0.borrow().parent.clone()
    }

    /// Insert into this scope, shadowing any outer binding. Re-defining a
    /// name in the same scope replaces it.
    pub fn define(&self, name: &str, value: Value, mutable: bool) {
        self.0
            .borrow_mut()
            .bindings
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        let mut cur = self.clone();
        loop {
            let next = {
                let scope = cur.0.borrow();
                if let Some(b) = scope.bindings.get(name) {
                    return Ok(b.value);
                }
                scope.parent.clone()
            };
            match next {
                Some(p) => cur = p,
                None => return Err(RuntimeError::UndefinedName(name.to_string())),
            }
        }
    }

    /// Assign to an existing binding somewhere on the chain. Never creates.
    pub fn set(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut cur = self.clone();
        loop {
            let next = {
                let mut scope = cur.0.borrow_mut();
                if let Some(b) = scope.bindings.get_mut(name) {
                    if !b.mutable {
                        return Err(RuntimeError::ImmutableAssignment(name.to_string()));
                    }
                    b.value = value;
                    return Ok(());
                }
                scope.parent.clone()
            };
            match next {
                Some(p) => cur = p,
                None => return Err(RuntimeError::UndefinedName(name.to_string())),
            }
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        let mut cur = self.clone();
        loop {
            let next = {
                let scope = cur.0.borrow();
                if scope.bindings.contains_key(name) {
                    return true;
                }
                scope.parent.clone()
            };
            match next {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Stable address of the scope, used as a visited-set key while marking.
    pub(crate) fn scope_ptr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub(crate) fn scope(&self) -> &Rc<RefCell<Scope>> {
        &self.0
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
