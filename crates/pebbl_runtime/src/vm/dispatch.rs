//! The instruction dispatch loop.

use std::rc::Rc;

use pebbl_ir::BinaryOp;
use smallvec::SmallVec;

use super::frame::CallFrame;
use super::{FRAMES_MAX, STACK_MAX};
use crate::core::chunk::{Chunk, OpCode};
use crate::core::gc::ManagedObject;
use crate::core::value::{BytecodeFunction, Function, Value, fast_map_with_capacity};
use crate::errors::RuntimeError;
use crate::interp::ExecResult;
use crate::util::{index_value, not_iterable_error, value_length};
use crate::Interpreter;

impl Interpreter {
    /// Execute a compiled top-level chunk. The authoritative path for a
    /// bytecode run; globals are shared with the tree-walker.
    pub fn execute_chunk(&mut self, chunk: Rc<Chunk>) -> Result<ExecResult, RuntimeError> {
        tracing::debug!(instructions = chunk.code.len(), "vm run");
        self.stack.clear();
        self.frames.clear();
        self.frames.push(CallFrame {
            chunk,
            ip: 0,
            stack_base: 0,
            env: self.globals.clone(),
        });
        let result = self.run(0);
        let value = self.stack.last().copied().unwrap_or(Value::NIL);
        self.stack.clear();
        self.frames.clear();
        result?;
        Ok(ExecResult {
            value,
            output: self.take_output(),
        })
    }

    /// Run until the frame stack drops back to `base_depth`. The top-level
    /// entry uses 0; nested invocations (a bytecode closure called from the
    /// tree-walker or a builtin) use the current depth.
    fn run(&mut self, base_depth: usize) -> Result<(), RuntimeError> {
        loop {
            let frames_len = self.frames.len();
            if frames_len <= base_depth {
                return Ok(());
            }
            let frame = &mut self.frames[frames_len - 1];
            if frame.ip >= frame.chunk.code.len() {
                if frames_len == base_depth + 1 {
                    return Ok(());
                }
                self.frames.pop();
                continue;
            }
            let ins = frame.chunk.code[frame.ip];
            frame.ip += 1;

            match ins.opcode {
                OpCode::LoadConst => {
                    let v = self.constant(ins.operand)?;
                    self.push(v)?;
                }
                OpCode::LoadNull => self.push(Value::NIL)?,
                OpCode::LoadTrue => self.push(Value::TRUE)?,
                OpCode::LoadFalse => self.push(Value::FALSE)?,
                OpCode::LoadVar => {
                    let v = {
                        let name = self.name(ins.operand)?;
                        self.frame().env.get(name)?
                    };
                    self.push(v)?;
                }
                OpCode::StoreVar => {
                    // Assignment leaves the value on the stack.
                    let v = *self.stack.last().ok_or(RuntimeError::StackUnderflow)?;
                    let name = self.name(ins.operand)?;
                    self.frame().env.set(name, v)?;
                }
                OpCode::DefineVar | OpCode::DefineConst => {
                    let v = self.pop_value()?;
                    let mutable = ins.opcode == OpCode::DefineVar;
                    let name = self.name(ins.operand)?;
                    self.frame().env.define(name, v, mutable);
                }
                OpCode::Add => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    let r = a.add(b)?;
                    self.push(r)?;
                }
                OpCode::Subtract => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    let r = a.sub(b)?;
                    self.push(r)?;
                }
                OpCode::Multiply => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    let r = a.mul(b)?;
                    self.push(r)?;
                }
                OpCode::Divide => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    let r = a.div(b)?;
                    self.push(r)?;
                }
                OpCode::Negate => {
                    let v = self.pop_value()?;
                    let r = v.neg()?;
                    self.push(r)?;
                }
                OpCode::Equal => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    self.push(Value::from_bool(a.equals(b)))?;
                }
                OpCode::NotEqual => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    self.push(Value::from_bool(!a.equals(b)))?;
                }
                OpCode::Less => self.op_compare(BinaryOp::Lt)?,
                OpCode::Greater => self.op_compare(BinaryOp::Gt)?,
                OpCode::LessEqual => self.op_compare(BinaryOp::Le)?,
                OpCode::GreaterEqual => self.op_compare(BinaryOp::Ge)?,
                OpCode::Not => {
                    let v = self.pop_value()?;
                    self.push(Value::from_bool(!v.is_truthy()))?;
                }
                OpCode::Jump => {
                    self.frame_mut().ip = ins.operand as usize;
                }
                OpCode::JumpIfFalse => {
                    let cond = self.pop_value()?;
                    if !cond.is_truthy() {
                        self.frame_mut().ip = ins.operand as usize;
                    }
                }
                OpCode::JumpIfTrue => {
                    let cond = self.pop_value()?;
                    if cond.is_truthy() {
                        self.frame_mut().ip = ins.operand as usize;
                    }
                }
                OpCode::Call => self.op_call(ins.operand as usize)?,
                OpCode::Return => {
                    let r = self.pop_value()?;
                    let frame = self
                        .frames
                        .pop()
                        .expect("frame stack is non-empty while running");
                    self.stack.truncate(frame.stack_base);
                    self.push(r)?;
                    // The loop head terminates once depth reaches base.
                }
                OpCode::MakeFunction => self.op_make_function(ins.operand)?,
                OpCode::BuildArray => self.op_build_array(ins.operand as usize)?,
                OpCode::BuildDict => self.op_build_dict(ins.operand as usize)?,
                OpCode::Index => {
                    let index = self.pop_value()?;
                    let object = self.pop_value()?;
                    let v = index_value(object, index, &self.heap)?;
                    self.push(v)?;
                }
                OpCode::IterPrep => self.op_iter_prep()?,
                OpCode::Len => {
                    let v = self.pop_value()?;
                    let len = value_length(v, &self.heap)?;
                    self.push(len)?;
                }
                OpCode::PushEnv => {
                    let child = self.frame().env.child();
                    self.frame_mut().env = child;
                }
                OpCode::PopEnv => {
                    let parent = self.frame().env.parent().ok_or_else(|| {
                        RuntimeError::InvalidBytecode("POP_ENV at scope root".to_string())
                    })?;
                    self.frame_mut().env = parent;
                }
                OpCode::Pop => {
                    self.pop_value()?;
                }
                OpCode::Dup => {
                    let v = self.peek(0)?;
                    self.push(v)?;
                }
                OpCode::Halt => return Ok(()),
            }
        }
    }

    /// Call a bytecode closure from outside the dispatch loop (tree-walker
    /// or builtin). Arguments must be rooted by the caller.
    pub(crate) fn call_bytecode(
        &mut self,
        func: Rc<BytecodeFunction>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        if args.len() != func.proto.params.len() {
            return Err(RuntimeError::ArityMismatch {
                expected: func.proto.params.len(),
                got: args.len(),
            });
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        let env = func.env.child();
        for (param, value) in func.proto.params.iter().zip(args) {
            env.define(param, *value, true);
        }
        let base_depth = self.frames.len();
        let stack_base = self.stack.len();
        self.frames.push(CallFrame {
            chunk: func.proto.chunk.clone(),
            ip: 0,
            stack_base,
            env,
        });
        match self.run(base_depth) {
            Ok(()) => {
                if self.frames.len() > base_depth {
                    self.frames.truncate(base_depth);
                    self.stack.truncate(stack_base);
                    return Err(RuntimeError::InvalidBytecode(
                        "function chunk ended without RETURN".to_string(),
                    ));
                }
                self.stack.pop().ok_or(RuntimeError::StackUnderflow)
            }
            Err(e) => {
                self.frames.truncate(base_depth);
                self.stack.truncate(stack_base);
                Err(e)
            }
        }
    }

    fn op_call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        if self.stack.len() < argc + 1 {
            return Err(RuntimeError::StackUnderflow);
        }
        let callee_idx = self.stack.len() - 1 - argc;
        let callee = self.stack[callee_idx];
        if !callee.is_gc_ptr() {
            return Err(RuntimeError::NotCallable);
        }
        let func = match self.heap.get(callee.as_object_id()) {
            ManagedObject::Function(f) => f.clone(),
            _ => return Err(RuntimeError::NotCallable),
        };
        match func {
            Function::Bytecode(bf) => {
                if argc != bf.proto.params.len() {
                    return Err(RuntimeError::ArityMismatch {
                        expected: bf.proto.params.len(),
                        got: argc,
                    });
                }
                if self.frames.len() >= FRAMES_MAX {
                    return Err(RuntimeError::StackOverflow);
                }
                let env = bf.env.child();
                for (param, value) in bf.proto.params.iter().zip(&self.stack[callee_idx + 1..]) {
                    env.define(param, *value, true);
                }
                self.stack.truncate(callee_idx);
                let stack_base = self.stack.len();
                self.frames.push(CallFrame {
                    chunk: bf.proto.chunk.clone(),
                    ip: 0,
                    stack_base,
                    env,
                });
                Ok(())
            }
            Function::User(_) | Function::Builtin(_) => {
                // Args leave the stack before the native/tree-walk call, so
                // pin them for its duration.
                let base = self.temp_roots.len();
                self.temp_roots.extend_from_slice(&self.stack[callee_idx + 1..]);
                let args: SmallVec<[Value; 8]> =
                    self.stack[callee_idx + 1..].iter().copied().collect();
                self.stack.truncate(callee_idx);
                let result = self.call_function(func, &args);
                self.temp_roots.truncate(base);
                let r = result?;
                self.push(r)
            }
        }
    }

    fn op_make_function(&mut self, idx: u32) -> Result<(), RuntimeError> {
        let proto = self
            .frame()
            .chunk
            .functions
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| {
                RuntimeError::InvalidBytecode(format!("function index {idx} out of range"))
            })?;
        let env = self.frame().env.clone();
        let id = self.alloc(ManagedObject::Function(Function::Bytecode(Rc::new(
            BytecodeFunction { proto, env },
        ))));
        self.push(Value::gc_ptr(id))
    }

    fn op_build_array(&mut self, count: usize) -> Result<(), RuntimeError> {
        if self.stack.len() < count {
            return Err(RuntimeError::StackUnderflow);
        }
        let start = self.stack.len() - count;
        let elements = self.stack[start..].to_vec();
        // Allocate before truncating so the elements stay rooted if a
        // collection runs here.
        let id = self.alloc(ManagedObject::Array(elements));
        self.stack.truncate(start);
        self.push(Value::gc_ptr(id))
    }

    fn op_build_dict(&mut self, count: usize) -> Result<(), RuntimeError> {
        let needed = count * 2;
        if self.stack.len() < needed {
            return Err(RuntimeError::StackUnderflow);
        }
        let start = self.stack.len() - needed;
        let mut map = fast_map_with_capacity(count);
        for i in 0..count {
            let key = self.dict_key_string(self.stack[start + 2 * i])?;
            map.insert(key, self.stack[start + 2 * i + 1]);
        }
        let id = self.alloc(ManagedObject::Dict(map));
        self.stack.truncate(start);
        self.push(Value::gc_ptr(id))
    }

    /// For-in support: an array iterates itself; a dict iterates a snapshot
    /// of its keys as fresh heap strings.
    fn op_iter_prep(&mut self) -> Result<(), RuntimeError> {
        let v = self.pop_value()?;
        let keys = if v.is_gc_ptr() {
            match self.heap.get(v.as_object_id()) {
                ManagedObject::Array(_) => None,
                ManagedObject::Dict(map) => Some(map.keys().cloned().collect::<Vec<_>>()),
                _ => return Err(not_iterable_error(v)),
            }
        } else {
            return Err(not_iterable_error(v));
        };
        match keys {
            None => self.push(v),
            Some(keys) => {
                let base = self.temp_roots.len();
                self.temp_roots.push(v);
                for key in keys {
                    let id = self.alloc(ManagedObject::Str(key));
                    self.temp_roots.push(Value::gc_ptr(id));
                }
                let elements = self.temp_roots[base + 1..].to_vec();
                let id = self.alloc(ManagedObject::Array(elements));
                self.temp_roots.truncate(base);
                self.push(Value::gc_ptr(id))
            }
        }
    }

    fn op_compare(&mut self, op: BinaryOp) -> Result<(), RuntimeError> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        let r = a.compare(b, op)?;
        self.push(r)
    }

    fn push(&mut self, v: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop_value(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn peek(&self, distance: usize) -> Result<Value, RuntimeError> {
        if distance >= self.stack.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack[self.stack.len() - 1 - distance])
    }

    fn frame(&self) -> &CallFrame {
        self.frames
            .last()
            .expect("frame stack is non-empty while running")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames
            .last_mut()
            .expect("frame stack is non-empty while running")
    }

    fn constant(&self, idx: u32) -> Result<Value, RuntimeError> {
        self.frame()
            .chunk
            .constants
            .get(idx as usize)
            .copied()
            .ok_or_else(|| {
                RuntimeError::InvalidBytecode(format!("constant index {idx} out of range"))
            })
    }

    fn name(&self, idx: u32) -> Result<&str, RuntimeError> {
        self.frame()
            .chunk
            .names
            .get(idx as usize)
            .map(|s| s.as_str())
            .ok_or_else(|| RuntimeError::InvalidBytecode(format!("name index {idx} out of range")))
    }
}
