//! The interpreter: owner of the heap, the environments, and the VM state.
//!
//! One `Interpreter` hosts both execution paths over the same globals; a run
//! goes through [`Interpreter::execute`] (tree-walker) or
//! [`Interpreter::execute_chunk`] (VM). `alloc` is the single GC safepoint:
//! it gathers the precise root set (value stack, frames, environment chains,
//! pinned temporaries) and collects before placing the new object.

use std::rc::Rc;

use pebbl_ir::{Program, Stmt};

use crate::ast_exec::Flow;
use crate::builtins_registry::{BuiltinProvider, BuiltinRegistry, StdBuiltinProvider};
use crate::core::chunk::Chunk;
use crate::core::env::Env;
use crate::core::gc::{Heap, ManagedObject, ObjectId};
use crate::core::value::Value;
use crate::errors::RuntimeError;
use crate::util::value_to_string;
use crate::vm::CallFrame;

/// Outcome of a run: the program's final value and everything `print` wrote.
#[derive(Debug, PartialEq)]
pub struct ExecResult {
    pub value: Value,
    pub output: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InterpreterConfig {
    /// Collect on every allocation. Makes rooting mistakes deterministic;
    /// meant for tests.
    pub gc_stress: bool,
}

pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) globals: Env,
    /// Environment of the statement currently executing on the tree-walking
    /// path. The VM keeps its current environment in the active frame.
    pub(crate) env: Env,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    /// Values pinned across allocations while they live only in host locals
    /// (literal element buffers, builtin arguments, iteration sources).
    pub(crate) temp_roots: Vec<Value>,
    pub(crate) output: String,
    pub(crate) call_depth: usize,
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let globals = Env::new();
        let mut interp = Self {
            heap: Heap::new(),
            env: globals.clone(),
            globals,
            stack: Vec::with_capacity(64),
            frames: Vec::new(),
            temp_roots: Vec::new(),
            output: String::new(),
            call_depth: 0,
            config,
        };
        let mut registry = BuiltinRegistry::new();
        StdBuiltinProvider.install(&mut registry);
        registry.install_into(&interp.globals, &mut interp.heap);
        interp
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn globals(&self) -> &Env {
        &self.globals
    }

    /// Allocate a managed object. This is the only safepoint: a collection
    /// may run here, so every live heap value must be reachable from the
    /// stack, a frame, an environment, or `temp_roots`.
    pub fn alloc(&mut self, obj: ManagedObject) -> ObjectId {
        if self.config.gc_stress || self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    /// Run one mark/sweep cycle over the full root set.
    pub fn collect_garbage(&mut self) {
        let mut roots: Vec<Value> =
            Vec::with_capacity(self.stack.len() + self.temp_roots.len());
        roots.extend_from_slice(&self.stack);
        roots.extend_from_slice(&self.temp_roots);
        let mut envs: Vec<&Env> = vec![&self.globals, &self.env];
        let mut chunks: Vec<&Rc<Chunk>> = Vec::new();
        for frame in &self.frames {
            envs.push(&frame.env);
            chunks.push(&frame.chunk);
        }
        self.heap.collect(&roots, &envs, &chunks);
    }

    pub fn stringify(&self, value: Value) -> String {
        value_to_string(value, &self.heap)
    }

    pub(crate) fn write_output(&mut self, s: &str) {
        self.output.push_str(s);
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Execute a program with the tree-walking evaluator.
    ///
    /// Top-level expression statements keep their values (the REPL
    /// visibility rule); the result is the last such value, or the value of
    /// a top-level `return`.
    pub fn execute(&mut self, program: &Program) -> Result<ExecResult, RuntimeError> {
        tracing::debug!(statements = program.statements.len(), "tree-walk run");
        self.env = self.globals.clone();
        let last_slot = self.temp_roots.len();
        self.temp_roots.push(Value::NIL);
        let result = self.execute_statements(&program.statements, last_slot);
        let value = self.temp_roots[last_slot];
        self.temp_roots.truncate(last_slot);
        result?;
        Ok(ExecResult {
            value,
            output: self.take_output(),
        })
    }

    fn execute_statements(
        &mut self,
        statements: &[Stmt],
        last_slot: usize,
    ) -> Result<(), RuntimeError> {
        for stmt in statements {
            match stmt {
                Stmt::Expr(e) => {
                    let v = self.eval_expr(e)?;
                    self.temp_roots[last_slot] = v;
                }
                _ => {
                    if let Flow::Return(v) = self.exec_stmt(stmt)? {
                        self.temp_roots[last_slot] = v;
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
