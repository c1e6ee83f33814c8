use std::rc::Rc;

use pebbl_ir::{CallExpr, Stmt};
use smallvec::SmallVec;

use super::Flow;
use crate::Interpreter;
use crate::core::gc::ManagedObject;
use crate::core::value::{Function, UserFunction, Value};
use crate::errors::RuntimeError;
use crate::vm::FRAMES_MAX;

impl Interpreter {
    /// Evaluate callee then arguments left-to-right, pinning each in
    /// `temp_roots` (the caller truncates back to `base`), then dispatch.
    pub(crate) fn eval_call(
        &mut self,
        call: &CallExpr,
        base: usize,
    ) -> Result<Value, RuntimeError> {
        let callee = self.eval_expr(&call.callee)?;
        self.temp_roots.push(callee);
        for arg in call.args.iter() {
            let v = self.eval_expr(arg)?;
            self.temp_roots.push(v);
        }
        let args: SmallVec<[Value; 8]> = self.temp_roots[base + 1..].iter().copied().collect();

        if !callee.is_gc_ptr() {
            return Err(RuntimeError::NotCallable);
        }
        let func = match self.heap.get(callee.as_object_id()) {
            ManagedObject::Function(f) => f.clone(),
            _ => return Err(RuntimeError::NotCallable),
        };
        self.call_function(func, &args)
    }

    /// Invoke any callable with already-evaluated arguments. The arguments
    /// must be rooted by the caller for the duration of the call.
    pub(crate) fn call_function(
        &mut self,
        func: Function,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match func {
            Function::Builtin(b) => {
                if let Some(expected) = b.arity {
                    if args.len() != expected {
                        return Err(RuntimeError::ArityMismatch {
                            expected,
                            got: args.len(),
                        });
                    }
                }
                (b.func)(self, args)
            }
            Function::User(f) => self.call_user(f, args),
            Function::Bytecode(f) => self.call_bytecode(f, args),
        }
    }

    pub(crate) fn call_user(
        &mut self,
        func: Rc<UserFunction>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        if self.call_depth >= FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        if args.len() != func.decl.params.len() {
            return Err(RuntimeError::ArityMismatch {
                expected: func.decl.params.len(),
                got: args.len(),
            });
        }
        let call_env = func.env.child();
        for (param, value) in func.decl.params.iter().zip(args) {
            call_env.define(param, *value, true);
        }
        let prev = std::mem::replace(&mut self.env, call_env);
        self.call_depth += 1;
        let result = self.run_function_body(&func.decl.body);
        self.call_depth -= 1;
        self.env = prev;
        result
    }

    /// A body's trailing expression statement is its implicit return value;
    /// every other statement form yields nil unless `return` fires.
    fn run_function_body(&mut self, body: &[Stmt]) -> Result<Value, RuntimeError> {
        let n = body.len();
        for (i, stmt) in body.iter().enumerate() {
            if i + 1 == n {
                if let Stmt::Expr(e) = stmt {
                    return self.eval_expr(e);
                }
            }
            if let Flow::Return(v) = self.exec_stmt(stmt)? {
                return Ok(v);
            }
        }
        Ok(Value::NIL)
    }
}
