//! Compiler error taxonomy.
//!
//! Lex errors surface as `TokenKind::Error` tokens and are folded into
//! `CompileError::Parse` once the parser notices them; parse errors and
//! warnings accumulate in a list during parsing and are reported together;
//! codegen errors are fatal and indicate an AST node reached code
//! generation that should have been rejected upstream.

use crate::ast::Location;
use std::process::ExitStatus;
use thiserror::Error;

/// The primary error enumeration for the compiler.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Wrapper for standard I/O errors (source reads, `.asm` writes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No `.lisp` source files found at the requested path.
    #[error("No .lisp source files found at the given path")]
    NoSourceFiles,

    /// One or more parser diagnostics (errors and/or warnings)
    /// accumulated during parsing. Only errors (not warnings alone)
    /// abort the pipeline.
    #[error("{} parse error(s)", .diagnostics.iter().filter(|d| d.is_error).count())]
    Parse { diagnostics: Vec<Diagnostic> },

    /// An AST node reached code generation with no lowering rule —
    /// reserved for `Quote` and string literals, which the parser accepts
    /// but which are not compilable.
    #[error("codegen error: unsupported construct reached code generation: {what}")]
    Codegen { what: String },

    /// The compiled executable is missing after assembly/linking.
    #[error("binary not found after compilation")]
    BinaryNotFound,

    /// A subprocess (nasm/ld/gcc/the compiled binary) could not be spawned.
    #[error("execution error: {0}")]
    ExecutionError(#[source] std::io::Error),

    /// A subprocess (assembler, linker, or the compiled binary) exited
    /// with a non-zero status.
    #[error("execution failed with status: {0}")]
    ExecutionFailed(ExitStatus),

    /// One or more test-suite files failed.
    #[error("one or more tests failed")]
    TestFailed,
}

impl CompileError {
    /// Builds a `Parse` error from the accumulated diagnostic list. Only
    /// called when at least one diagnostic has `is_error == true`.
    pub fn parse(diagnostics: Vec<Diagnostic>) -> Self {
        Self::Parse { diagnostics }
    }

    pub fn codegen(what: impl Into<String>) -> Self {
        Self::Codegen { what: what.into() }
    }
}

/// One parser diagnostic: an error (aborts the pipeline) or a warning
/// (recorded but non-fatal, e.g. redefining a global).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub is_error: bool,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn error(location: Location, message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            location,
            message: message.into(),
        }
    }

    pub fn warning(location: Location, message: impl Into<String>) -> Self {
        Self {
            is_error: false,
            location,
            message: message.into(),
        }
    }

    /// Renders the diagnostic the way the driver prints it to the user:
    /// `<kind> [<line>,<col>]: <message>`, followed by the offending
    /// source line and a caret underline.
    pub fn render(&self, source: &str) -> String {
        let kind = if self.is_error { "error" } else { "warning" };
        let mut out = format!(
            "{} [{}]: {}\n",
            kind, self.location.start, self.message
        );

        if let Some(line) = source.lines().nth(self.location.start.line - 1) {
            out.push_str(line);
            out.push('\n');
            let underline_len = (self.location.end.col as i64 - self.location.start.col as i64)
                .max(1) as usize;
            out.push_str(&" ".repeat(self.location.start.col.saturating_sub(1)));
            out.push_str(&"^".repeat(underline_len));
        }
        out
    }
}
