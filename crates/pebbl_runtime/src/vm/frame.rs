use std::rc::Rc;

use crate::core::chunk::Chunk;
use crate::core::env::Env;

/// Per-call record: the executing chunk, the instruction pointer, the stack
/// index at the bottom of the callee's region, and the environment the
/// frame executes in.
pub struct CallFrame {
    pub chunk: Rc<Chunk>,
    pub ip: usize,
    pub stack_base: usize,
    pub env: Env,
}
