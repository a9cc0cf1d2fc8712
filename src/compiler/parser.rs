//! Parsing phase: converts the lexer's token stream into a `Program` AST,
//! resolving variable scope and free-variable captures inline.

pub mod common;
pub mod env;

use crate::ast::{Program, Token};
use crate::compiler::error::CompileError;

/// Parses a full token stream into a `Program`. Returns `CompileError::Parse`
/// carrying every accumulated diagnostic if at least one is an error;
/// warnings alone (e.g. global redefinition) do not prevent a successful
/// parse.
pub fn parse(tokens: Vec<Token>) -> Result<Program, CompileError> {
    let (program, diagnostics) = common::Parser::new(tokens).parse_program();

    if diagnostics.iter().any(|d| d.is_error) {
        return Err(CompileError::parse(diagnostics));
    }

    for warning in diagnostics.iter().filter(|d| !d.is_error) {
        eprintln!("warning [{}]: {}", warning.location.start, warning.message);
    }

    Ok(program)
}
