//! Program-level entry points.
//!
//! A run picks exactly one authoritative execution path: the tree-walking
//! evaluator or compile-then-VM. Both operate on the same interpreter and
//! share its globals, but state is never mirrored between paths.

mod bytecode_compiler;

use std::fmt;
use std::rc::Rc;

use pebbl_ir::{Frontend, ParseError, Program};
use pebbl_runtime::{Chunk, ExecResult, Interpreter, RuntimeError};

pub use bytecode_compiler::compile;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    TreeWalk,
    Bytecode,
}

/// Run a parsed program under the chosen path.
pub fn run_program(
    interp: &mut Interpreter,
    program: &Program,
    mode: ExecMode,
) -> Result<ExecResult, RuntimeError> {
    match mode {
        ExecMode::TreeWalk => interp.execute(program),
        ExecMode::Bytecode => {
            let chunk = compile(program, interp.heap_mut())?;
            run_chunk(interp, chunk)
        }
    }
}

/// Execute an already-compiled chunk, e.g. one produced by [`compile`] and
/// held for re-runs.
pub fn run_chunk(
    interp: &mut Interpreter,
    chunk: Rc<Chunk>,
) -> Result<ExecResult, RuntimeError> {
    interp.execute_chunk(chunk)
}

/// Parse with the given frontend, then run.
pub fn run_source(
    interp: &mut Interpreter,
    frontend: &dyn Frontend,
    source: &str,
    mode: ExecMode,
) -> Result<ExecResult, DriverError> {
    let program = frontend.parse_program(source)?;
    Ok(run_program(interp, &program, mode)?)
}

#[derive(Clone, Debug, PartialEq)]
pub enum DriverError {
    Parse(ParseError),
    Runtime(RuntimeError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Parse(e) => write!(f, "{e}"),
            DriverError::Runtime(e) => write!(f, "Runtime Error: {e}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<ParseError> for DriverError {
    fn from(e: ParseError) -> Self {
        DriverError::Parse(e)
    }
}

impl From<RuntimeError> for DriverError {
    fn from(e: RuntimeError) -> Self {
        DriverError::Runtime(e)
    }
}
