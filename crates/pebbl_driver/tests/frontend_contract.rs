//! The driver against a frontend stub: parse errors short-circuit, parsed
//! programs run under either mode.

mod common;

use common::*;
use pebbl_driver::{DriverError, ExecMode, run_source};
use pebbl_ir::{Frontend, ParseError, Program};
use pebbl_runtime::Interpreter;

/// Minimal stand-in for the external parser: one recognized source line,
/// everything else is a parse error.
struct StubFrontend;

impl Frontend for StubFrontend {
    fn parse_program(&self, source: &str) -> Result<Program, ParseError> {
        if source == "print(40 + 2);" {
            Ok(program(vec![expr(call_name(
                "print",
                vec![bin(pebbl_ir::BinaryOp::Add, int(40), int(2))],
            ))]))
        } else {
            Err(ParseError {
                message: format!("unexpected input: {source}"),
                line: 1,
            })
        }
    }
}

#[test]
fn parsed_programs_run_under_both_modes() {
    for mode in [ExecMode::TreeWalk, ExecMode::Bytecode] {
        let mut interp = Interpreter::new();
        let r = run_source(&mut interp, &StubFrontend, "print(40 + 2);", mode).unwrap();
        assert_eq!(r.output, "42\n");
    }
}

#[test]
fn parse_errors_short_circuit_execution() {
    let mut interp = Interpreter::new();
    let err = run_source(&mut interp, &StubFrontend, "let = ;", ExecMode::Bytecode).unwrap_err();
    match err {
        DriverError::Parse(e) => {
            assert_eq!(e.line, 1);
            assert!(e.to_string().starts_with("Parse Error at line 1"));
        }
        DriverError::Runtime(_) => panic!("expected a parse error"),
    }
}
