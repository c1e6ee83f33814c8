//! The tree-walking evaluator.
//!
//! The reference execution path: expressions evaluate recursively to
//! [`crate::Value`]s, statements execute for effect and thread a [`Flow`]
//! so `return` unwinds through nested blocks. Semantics are identical to
//! the bytecode path, which makes this evaluator the VM's test oracle.

mod call;
mod expr;
mod stmt;

use crate::core::value::Value;

/// Statement outcome: fall through, or unwind to the enclosing call.
pub(crate) enum Flow {
    Normal,
    Return(Value),
}
