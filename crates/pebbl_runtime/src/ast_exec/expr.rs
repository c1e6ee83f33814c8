use pebbl_ir::{BinaryOp, Expr, UnaryOp};

use crate::Interpreter;
use crate::core::gc::ManagedObject;
use crate::core::value::{Value, fast_map_with_capacity};
use crate::errors::RuntimeError;
use crate::util::{index_value, narrow_int_literal};

impl Interpreter {
    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Int(i) => narrow_int_literal(*i),
            Expr::Float(f) => Ok(Value::from_f64(*f)),
            Expr::Bool(b) => Ok(Value::from_bool(*b)),
            Expr::Nil => Ok(Value::NIL),
            Expr::Str(s) => {
                let id = self.alloc(ManagedObject::Str(s.clone()));
                Ok(Value::gc_ptr(id))
            }
            Expr::Ident(name) => self.env.get(name),
            Expr::Array(elems) => {
                let base = self.temp_roots.len();
                let result = self.build_array(elems, base);
                self.temp_roots.truncate(base);
                result
            }
            Expr::Dict(entries) => {
                let base = self.temp_roots.len();
                let result = self.build_dict(entries, base);
                self.temp_roots.truncate(base);
                result
            }
            Expr::Unary { op, expr } => {
                let v = self.eval_expr(expr)?;
                match op {
                    UnaryOp::Neg => v.neg(),
                    UnaryOp::Not => Ok(Value::from_bool(!v.is_truthy())),
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Assign(assign) => {
                let v = self.eval_expr(&assign.value)?;
                self.env.set(&assign.target, v)?;
                Ok(v)
            }
            Expr::If(ife) => {
                let cond = self.eval_expr(&ife.cond)?;
                if cond.is_truthy() {
                    self.eval_expr(&ife.then_branch)
                } else if let Some(alt) = &ife.else_branch {
                    self.eval_expr(alt)
                } else {
                    Ok(Value::NIL)
                }
            }
            Expr::Call(call) => {
                let base = self.temp_roots.len();
                let result = self.eval_call(call, base);
                self.temp_roots.truncate(base);
                result
            }
            Expr::Index(ix) => {
                let object = self.eval_expr(&ix.object)?;
                self.temp_roots.push(object);
                let index = self.eval_expr(&ix.index);
                self.temp_roots.pop();
                index_value(object, index?, &self.heap)
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Value, RuntimeError> {
        // and/or short-circuit on truthiness and produce a bool.
        if op == BinaryOp::And {
            let l = self.eval_expr(left)?;
            if !l.is_truthy() {
                return Ok(Value::FALSE);
            }
            let r = self.eval_expr(right)?;
            return Ok(Value::from_bool(r.is_truthy()));
        }
        if op == BinaryOp::Or {
            let l = self.eval_expr(left)?;
            if l.is_truthy() {
                return Ok(Value::TRUE);
            }
            let r = self.eval_expr(right)?;
            return Ok(Value::from_bool(r.is_truthy()));
        }

        let l = self.eval_expr(left)?;
        // Keep the left operand alive while the right one evaluates.
        self.temp_roots.push(l);
        let r = self.eval_expr(right);
        self.temp_roots.pop();
        let r = r?;

        match op {
            BinaryOp::Add => l.add(r),
            BinaryOp::Sub => l.sub(r),
            BinaryOp::Mul => l.mul(r),
            BinaryOp::Div => l.div(r),
            BinaryOp::Eq => Ok(Value::from_bool(l.equals(r))),
            BinaryOp::Ne => Ok(Value::from_bool(!l.equals(r))),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => l.compare(r, op),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn build_array(&mut self, elems: &[Expr], base: usize) -> Result<Value, RuntimeError> {
        for e in elems {
            let v = self.eval_expr(e)?;
            self.temp_roots.push(v);
        }
        let elements = self.temp_roots[base..].to_vec();
        let id = self.alloc(ManagedObject::Array(elements));
        Ok(Value::gc_ptr(id))
    }

    fn build_dict(
        &mut self,
        entries: &[(Expr, Expr)],
        base: usize,
    ) -> Result<Value, RuntimeError> {
        for (k, v) in entries {
            let key = self.eval_expr(k)?;
            self.temp_roots.push(key);
            let val = self.eval_expr(v)?;
            self.temp_roots.push(val);
        }
        let mut map = fast_map_with_capacity(entries.len());
        for i in 0..entries.len() {
            let key = self.dict_key_string(self.temp_roots[base + 2 * i])?;
            map.insert(key, self.temp_roots[base + 2 * i + 1]);
        }
        let id = self.alloc(ManagedObject::Dict(map));
        Ok(Value::gc_ptr(id))
    }

    pub(crate) fn dict_key_string(&self, key: Value) -> Result<String, RuntimeError> {
        if key.is_gc_ptr() {
            if let ManagedObject::Str(s) = self.heap.get(key.as_object_id()) {
                return Ok(s.clone());
            }
        }
        Err(RuntimeError::BadDictKey)
    }
}
