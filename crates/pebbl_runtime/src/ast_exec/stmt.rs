use pebbl_ir::{DeclKind, ForInStmt, Stmt, WhileStmt};

use super::Flow;
use crate::Interpreter;
use crate::core::gc::ManagedObject;
use crate::core::value::{Function, UserFunction, Value};
use crate::errors::RuntimeError;
use crate::util::not_iterable_error;

enum IterSource {
    Array,
    DictKeys(Vec<String>),
}

impl Interpreter {
    pub(crate) fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Expr(e) => {
                self.eval_expr(e)?;
                Ok(Flow::Normal)
            }
            Stmt::VarDecl(decl) => {
                let v = self.eval_expr(&decl.value)?;
                self.env
                    .define(&decl.name, v, decl.decl == DeclKind::Var);
                Ok(Flow::Normal)
            }
            Stmt::FuncDecl(decl) => {
                let func = Function::User(std::rc::Rc::new(UserFunction {
                    decl: (**decl).clone(),
                    env: self.env.clone(),
                }));
                let id = self.alloc(ManagedObject::Function(func));
                self.env.define(&decl.name, Value::gc_ptr(id), false);
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let v = match value {
                    Some(e) => self.eval_expr(e)?,
                    None => Value::NIL,
                };
                Ok(Flow::Return(v))
            }
            Stmt::Block(stmts) => self.exec_block(stmts),
            Stmt::While(w) => self.exec_while(w),
            Stmt::ForIn(f) => self.exec_for_in(f),
        }
    }

    /// Run statements in a fresh child scope, restored on every exit path.
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        let child = self.env.child();
        let prev = std::mem::replace(&mut self.env, child);
        let result = self.exec_stmts(stmts);
        self.env = prev;
        result
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            if let Flow::Return(v) = self.exec_stmt(stmt)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_while(&mut self, w: &WhileStmt) -> Result<Flow, RuntimeError> {
        loop {
            let cond = self.eval_expr(&w.cond)?;
            if !cond.is_truthy() {
                return Ok(Flow::Normal);
            }
            if let Flow::Return(v) = self.exec_block(&w.body)? {
                return Ok(Flow::Return(v));
            }
        }
    }

    fn exec_for_in(&mut self, f: &ForInStmt) -> Result<Flow, RuntimeError> {
        let iterable = self.eval_expr(&f.iterable)?;
        let base = self.temp_roots.len();
        self.temp_roots.push(iterable);
        let loop_env = self.env.child();
        let prev = std::mem::replace(&mut self.env, loop_env);
        let result = self.run_for_in(f, iterable);
        self.env = prev;
        self.temp_roots.truncate(base);
        result
    }

    fn run_for_in(&mut self, f: &ForInStmt, iterable: Value) -> Result<Flow, RuntimeError> {
        if !iterable.is_gc_ptr() {
            return Err(not_iterable_error(iterable));
        }
        let id = iterable.as_object_id();
        let source = match self.heap.get(id) {
            ManagedObject::Array(_) => IterSource::Array,
            ManagedObject::Dict(map) => IterSource::DictKeys(map.keys().cloned().collect()),
            _ => return Err(not_iterable_error(iterable)),
        };

        // The loop variable lives in the loop scope and is rebound per
        // iteration, exactly as the compiled path does it.
        self.env.define(&f.var, Value::NIL, true);

        match source {
            IterSource::Array => {
                let mut i = 0;
                loop {
                    // Re-read the length so body mutations are observed.
                    let item = match self.heap.get(id) {
                        ManagedObject::Array(items) if i < items.len() => items[i],
                        ManagedObject::Array(_) => break,
                        _ => return Err(not_iterable_error(iterable)),
                    };
                    self.env.set(&f.var, item)?;
                    if let Flow::Return(v) = self.exec_block(&f.body)? {
                        return Ok(Flow::Return(v));
                    }
                    i += 1;
                }
            }
            IterSource::DictKeys(keys) => {
                for key in keys {
                    let key_id = self.alloc(ManagedObject::Str(key));
                    self.env.set(&f.var, Value::gc_ptr(key_id))?;
                    if let Flow::Return(v) = self.exec_block(&f.body)? {
                        return Ok(Flow::Return(v));
                    }
                }
            }
        }
        Ok(Flow::Normal)
    }
}
