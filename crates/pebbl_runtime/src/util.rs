//! Value rendering and small shared helpers.

use std::fmt::Write as _;

use crate::core::gc::{Heap, ManagedObject};
use crate::core::value::{Function, Value};
use crate::errors::RuntimeError;

/// The rendering used by `print` and `str`: raw strings, bracketed arrays,
/// braced dicts with quoted keys, `<function NAME>` / `<builtin NAME>`.
pub fn value_to_string(value: Value, heap: &Heap) -> String {
    if value.is_nil() {
        "nil".to_string()
    } else if value.is_bool() {
        if value.as_bool() { "true" } else { "false" }.to_string()
    } else if value.is_int32() {
        value.as_i32().to_string()
    } else if value.is_double() {
        value.as_f64().to_string()
    } else if value.is_gc_ptr() {
        match heap.get(value.as_object_id()) {
            ManagedObject::Str(s) => s.clone(),
            ManagedObject::Array(items) => {
                let mut out = String::from("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&value_to_string(*item, heap));
                }
                out.push(']');
                out
            }
            ManagedObject::Dict(map) => {
                let mut out = String::from("{");
                for (i, (key, val)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "\"{key}\": {}", value_to_string(*val, heap));
                }
                out.push('}');
                out
            }
            ManagedObject::Function(f) => match f {
                Function::Builtin(b) => format!("<builtin {}>", b.name),
                _ => format!("<function {}>", f.name()),
            },
        }
    } else {
        "<unknown>".to_string()
    }
}

/// The name reported by the `type` builtin.
pub fn type_name(value: Value, heap: &Heap) -> &'static str {
    if value.is_nil() {
        "null"
    } else if value.is_bool() {
        "boolean"
    } else if value.is_int32() {
        "integer"
    } else if value.is_double() {
        "float"
    } else if value.is_gc_ptr() {
        match heap.get(value.as_object_id()) {
            ManagedObject::Str(_) => "string",
            ManagedObject::Array(_) => "array",
            ManagedObject::Dict(_) => "dict",
            ManagedObject::Function(Function::Builtin(_)) => "builtin_function",
            ManagedObject::Function(_) => "function",
        }
    } else {
        "unknown"
    }
}

/// Length of a string (bytes), array, or dict, as int32.
pub fn value_length(value: Value, heap: &Heap) -> Result<Value, RuntimeError> {
    if value.is_gc_ptr() {
        let len = match heap.get(value.as_object_id()) {
            ManagedObject::Str(s) => s.len(),
            ManagedObject::Array(items) => items.len(),
            ManagedObject::Dict(map) => map.len(),
            ManagedObject::Function(_) => {
                return Err(length_type_error());
            }
        };
        return Ok(Value::from_i32(len as i32));
    }
    Err(length_type_error())
}

fn length_type_error() -> RuntimeError {
    RuntimeError::TypeError(
        "length() can only be called on strings, arrays, or dictionaries".to_string(),
    )
}

/// `a[i]` and `d["k"]`. Arrays take an in-range int32 index; dicts take a
/// string key and yield nil for a missing one.
pub fn index_value(object: Value, index: Value, heap: &Heap) -> Result<Value, RuntimeError> {
    if !object.is_gc_ptr() {
        return Err(not_indexable());
    }
    match heap.get(object.as_object_id()) {
        ManagedObject::Array(items) => {
            if !index.is_int32() {
                return Err(RuntimeError::TypeError(
                    "Array index must be an integer".to_string(),
                ));
            }
            let i = index.as_i32();
            if i < 0 || i as usize >= items.len() {
                return Err(RuntimeError::TypeError("Index out of bounds".to_string()));
            }
            Ok(items[i as usize])
        }
        ManagedObject::Dict(map) => {
            if index.is_gc_ptr() {
                if let ManagedObject::Str(key) = heap.get(index.as_object_id()) {
                    return Ok(map.get(key).copied().unwrap_or(Value::NIL));
                }
            }
            Err(RuntimeError::BadDictKey)
        }
        _ => Err(not_indexable()),
    }
}

fn not_indexable() -> RuntimeError {
    RuntimeError::TypeError("Value is not indexable".to_string())
}

/// Error for a for-in target that cannot be iterated. The message keys off
/// what the target is: nil, a heap object of a non-container kind, or any
/// other value.
pub(crate) fn not_iterable_error(value: Value) -> RuntimeError {
    let msg = if value.is_nil() {
        "Cannot iterate over null value"
    } else if value.is_gc_ptr() {
        "Object is not iterable"
    } else {
        "Value is not iterable"
    };
    RuntimeError::TypeError(msg.to_string())
}

/// Literal integers arrive from the tree with full width and narrow to
/// int32 on use; out-of-range literals are rejected, never truncated.
pub fn narrow_int_literal(i: i64) -> Result<Value, RuntimeError> {
    i32::try_from(i)
        .map(Value::from_i32)
        .map_err(|_| RuntimeError::TypeError("integer literal out of int32 range".to_string()))
}
