//! The bytecode virtual machine.
//!
//! The value stack and call frames live on the interpreter so the collector
//! can reach them as roots without callback registration. Each frame pins
//! its executing chunk and the environment it runs in; popping a frame
//! restores the caller's environment implicitly.

mod dispatch;
mod frame;

pub use frame::CallFrame;

/// Value stack bound. Exceeding it is a `StackOverflow` runtime error.
pub const STACK_MAX: usize = 256;
/// Call depth bound, shared with the tree-walker so deep recursion fails
/// identically on both paths, well before the host stack is at risk.
pub const FRAMES_MAX: usize = 64;
