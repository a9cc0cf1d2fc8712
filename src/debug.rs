//! # Debugging and Logging Utilities
//!
//! Conditional logging and timing helpers used across the compiler
//! pipeline. Gated by environment variables rather than a logging crate,
//! matching how verbosity is controlled elsewhere in this compiler.

use std::time::Instant;

/// Debugging is enabled if `LISPC_DEBUG` is set, or the binary was built
/// with `debug_assertions` (the default for `cargo build`).
pub fn is_debug_enabled() -> bool {
    std::env::var("LISPC_DEBUG").is_ok() || cfg!(debug_assertions)
}

/// Performance tracking is enabled if `LISPC_VERBOSE` is set.
pub fn is_perf_enabled() -> bool {
    std::env::var("LISPC_VERBOSE").is_ok()
}

pub fn log_parser(msg: &str) {
    if is_debug_enabled() {
        println!("🔍 PARSER: {}", msg);
    }
}

pub fn log_lexer(msg: &str) {
    if is_debug_enabled() {
        println!("🔍 LEXER: {}", msg);
    }
}

pub fn log_codegen(msg: &str) {
    if is_debug_enabled() {
        println!("🔍 CODEGEN: {}", msg);
    }
}

pub fn log_compiler(msg: &str) {
    if is_debug_enabled() {
        println!("🔍 COMPILER: {}", msg);
    }
}

/// Times a single operation and, if `LISPC_VERBOSE` is set, prints its
/// duration when dropped via `finish`.
///
/// Usage: `let timer = PerfTimer::new("parse"); ... timer.finish();`
pub struct PerfTimer {
    start: Instant,
    label: String,
}

impl PerfTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn finish(self) {
        if is_perf_enabled() {
            let duration = self.start.elapsed();
            println!("⏱️  {}: {:?}", self.label, duration);
        }
    }
}
