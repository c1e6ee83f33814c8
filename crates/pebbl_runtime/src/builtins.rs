//! Native implementations of the global builtin functions.
//!
//! Arity is declared at registration and checked by the call paths, so the
//! argument slices here have the declared length (except variadic `print`).

use crate::Interpreter;
use crate::core::gc::ManagedObject;
use crate::core::value::Value;
use crate::errors::RuntimeError;
use crate::util::{type_name, value_length, value_to_string};

/// Print arguments space-separated with a trailing newline; returns nil.
pub fn builtin_print(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    let mut line = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&interp.stringify(*arg));
    }
    line.push('\n');
    interp.write_output(&line);
    Ok(Value::NIL)
}

pub fn builtin_length(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    value_length(args[0], &interp.heap)
}

pub fn builtin_type(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = type_name(args[0], &interp.heap).to_string();
    let id = interp.alloc(ManagedObject::Str(name));
    Ok(Value::gc_ptr(id))
}

/// The `print` rendering, returned as a heap string.
pub fn builtin_str(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    let rendered = value_to_string(args[0], &interp.heap);
    let id = interp.alloc(ManagedObject::Str(rendered));
    Ok(Value::gc_ptr(id))
}

pub fn builtin_push(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    let target = args[0];
    if target.is_gc_ptr() {
        if let ManagedObject::Array(items) = interp.heap.get_mut(target.as_object_id()) {
            items.push(args[1]);
            return Ok(Value::NIL);
        }
    }
    Err(RuntimeError::TypeError(
        "push() first argument must be an array".to_string(),
    ))
}

/// Removes and returns the last element; nil when the array is empty.
pub fn builtin_pop(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    let target = args[0];
    if target.is_gc_ptr() {
        if let ManagedObject::Array(items) = interp.heap.get_mut(target.as_object_id()) {
            return Ok(items.pop().unwrap_or(Value::NIL));
        }
    }
    Err(RuntimeError::TypeError(
        "pop() argument must be an array".to_string(),
    ))
}
