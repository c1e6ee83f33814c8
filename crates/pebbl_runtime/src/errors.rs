//! The runtime error taxonomy.
//!
//! Both execution paths produce the same variants with the same rendered
//! messages, which is what makes the tree-walker usable as a test oracle for
//! the VM. Errors are not resumable; the first one terminates execution.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeError {
    /// Operator/operand mismatch, bad index, non-iterable for-in target,
    /// out-of-range integer literal.
    TypeError(String),
    UndefinedName(String),
    ImmutableAssignment(String),
    DivisionByZero,
    ArityMismatch { expected: usize, got: usize },
    NotCallable,
    StackOverflow,
    StackUnderflow,
    BadDictKey,
    /// Corrupt chunk defenses (bad constant/name indices, unbalanced scope
    /// ops). Unreachable through the compiler; kept so the VM never panics
    /// on hand-built bytecode.
    InvalidBytecode(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::TypeError(msg) => write!(f, "{msg}"),
            RuntimeError::UndefinedName(name) => {
                write!(f, "Undefined variable '{name}'")
            }
            RuntimeError::ImmutableAssignment(name) => {
                write!(f, "Cannot assign to immutable variable '{name}'")
            }
            RuntimeError::DivisionByZero => write!(f, "Division by zero"),
            RuntimeError::ArityMismatch { expected, got } => {
                write!(f, "Wrong number of arguments. Expected {expected}, got {got}")
            }
            RuntimeError::NotCallable => write!(f, "Not a function"),
            RuntimeError::StackOverflow => write!(f, "Stack overflow"),
            RuntimeError::StackUnderflow => write!(f, "Stack underflow"),
            RuntimeError::BadDictKey => write!(f, "Dictionary keys must be strings"),
            RuntimeError::InvalidBytecode(msg) => write!(f, "Invalid bytecode: {msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {}
