//! The PEBBL execution engine.
//!
//! NaN-boxed values, a precise mark-and-sweep heap, lexical environments, a
//! bytecode VM, and a reference tree-walking evaluator with identical
//! observable semantics. The compiler lowering syntax trees to chunks lives
//! in `pebbl_driver`.

pub mod core;

mod ast_exec;
mod builtins;
pub mod builtins_registry;
mod errors;
mod interp;
mod util;
mod vm;

// Re-exports from core/
pub use crate::core::chunk::{Chunk, FunctionProto, Instruction, OpCode, disassemble};
pub use crate::core::env::Env;
pub use crate::core::gc::{Heap, INITIAL_GC_THRESHOLD, ManagedObject, ObjectId};
pub use crate::core::value::{
    BuiltinFn, BuiltinFunction, BytecodeFunction, FastHashMap, Function, UserFunction, Value,
    fast_map_new, fast_map_with_capacity,
};

// Re-exports from vm/
pub use vm::{CallFrame, FRAMES_MAX, STACK_MAX};

pub use builtins_registry::{BuiltinProvider, BuiltinRegistry, StdBuiltinProvider};
pub use errors::RuntimeError;
pub use interp::{ExecResult, Interpreter, InterpreterConfig};
pub use util::{index_value, narrow_int_literal, type_name, value_length, value_to_string};
