//! # lispc
//!
//! An ahead-of-time compiler for a small Lisp-family language, translating
//! s-expressions into x86-64 NASM assembly that links against an external
//! runtime providing the boxed `LispValue` object model.

/// Abstract syntax tree node and token types.
pub mod ast;
/// Code generation: AST to NASM text.
pub mod codegen;
/// Lexing, parsing, and the `Compiler` build/run/test orchestrator.
pub mod compiler;
/// Conditional logging and timing helpers.
pub mod debug;

pub use compiler::Compiler;
pub use compiler::parse;
pub use compiler::tokenize;

/// Lexes and parses `source`, returning `Ok(())` if it is syntactically
/// valid. Does not generate, assemble, or link.
pub fn compile(source: &str) -> Result<(), compiler::error::CompileError> {
    let tokens = tokenize(source)?;
    let _program = parse(tokens)?;
    Ok(())
}
