//! # Compiler Module
//!
//! Orchestrates the full pipeline — lex, parse, generate, assemble, link,
//! execute — and defines the [`Compiler`] struct used by the `build`,
//! `run`, and `test` CLI subcommands.

pub mod error;
pub mod lexer;
pub mod parser;

pub use lexer::tokenize;
pub use parser::parse;

use crate::codegen::CodeGenerator;
use crate::debug;
use error::CompileError;
use std::path::PathBuf;
use std::process::Command;

/// Manages the compilation, assembly, and execution of a single source
/// file (or a directory of them, for `test`).
pub struct Compiler {
    /// The source file or directory to compile.
    pub source_path: PathBuf,
    /// Where build artifacts (`.asm`, `.o`, the binary) are placed.
    pub build_path: PathBuf,
    /// The target platform (`current`, `windows`, `mac`).
    pub target: String,
    /// Print the generated assembly to stdout instead of assembling it.
    pub show_asm: bool,
    /// Print step-by-step progress during the build.
    pub verbose: bool,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            source_path: PathBuf::from("."),
            build_path: PathBuf::from("./build"),
            target: "current".to_string(),
            show_asm: false,
            verbose: false,
        }
    }

    pub fn build(&mut self, target: &str) -> Result<(), CompileError> {
        self.target = target.to_string();

        if self.source_path.is_file() && self.is_lisp_file(&self.source_path) {
            return self.build_single_file(target);
        }

        Err(CompileError::NoSourceFiles)
    }

    /// Runs the full pipeline for a single source file: lex, parse,
    /// generate, then assemble and link unless `show_asm` was requested.
    fn build_single_file(&mut self, target: &str) -> Result<(), CompileError> {
        self.target = target.to_string();

        if !self.source_path.exists() || !self.is_lisp_file(&self.source_path) {
            return Err(CompileError::NoSourceFiles);
        }

        self.log_verbose(&format!("Processing: {:?}", self.source_path));
        debug::log_compiler(&format!("building {:?} for target {}", self.source_path, target));

        let content = std::fs::read_to_string(&self.source_path)?;
        let tokens = tokenize(&content)?;
        let program = parse(tokens).map_err(|e| self.report_parse_error(&content, e))?;

        let prefix = self.output_prefix();
        let generator = CodeGenerator::new();
        let asm_code = generator.generate(&program, &prefix)?;

        if self.show_asm {
            println!("{}", asm_code);
            return Ok(());
        }

        std::fs::create_dir_all(&self.build_path)?;
        let asm_file_path = self.build_path.join(format!("{}.asm", prefix));
        std::fs::write(&asm_file_path, &asm_code)?;

        self.log_verbose(&format!("Generated assembly: {} lines", asm_code.lines().count()));

        self.compile_assembly_to_binary(&asm_file_path)?;

        println!("✅ {:?} - compilation successful!", self.source_path);

        Ok(())
    }

    pub fn run_single_file(&mut self) -> Result<(), CompileError> {
        self.build_single_file("current")?;
        self.execute_binary()
    }

    pub fn test(&self, specific_file: Option<PathBuf>) -> Result<(), CompileError> {
        let files_to_test = if let Some(file) = specific_file {
            vec![file]
        } else {
            self.find_lisp_files_in_directory()?
        };

        println!("Testing {} files", files_to_test.len());

        let mut all_passed = true;
        for file in files_to_test {
            print!("Testing {:?}... ", file);
            match self.test_file(&file) {
                Ok(_) => println!("✓ PASSED"),
                Err(e) => {
                    println!("✗ FAILED");
                    eprintln!("  Error: {}", e);
                    all_passed = false;
                }
            }
        }

        if all_passed {
            println!("All tests passed! 🎉");
            Ok(())
        } else {
            Err(CompileError::TestFailed)
        }
    }

    fn compile_assembly_to_binary(&self, asm_file_path: &PathBuf) -> Result<(), CompileError> {
        let output_name = self.get_output_name();
        let output_path = self.build_path.join(&output_name);

        self.log_verbose("Assembling...");

        std::fs::create_dir_all(&self.build_path)?;

        let obj_file_path = self.build_path.join(format!("{}.o", self.output_prefix()));

        let assemble_status = Command::new("nasm")
            .arg("-f")
            .arg(self.get_target_assembly_format())
            .arg(asm_file_path)
            .arg("-o")
            .arg(&obj_file_path)
            .status()
            .map_err(CompileError::ExecutionError)?;

        if !assemble_status.success() {
            return Err(CompileError::ExecutionFailed(assemble_status));
        }

        self.log_verbose("Linking...");

        let link_result = self.link_binary(&obj_file_path, &output_path);

        match link_result {
            Ok(_) => {
                println!("📦 Binary generated: {:?}", output_path);
                self.make_executable(&output_path)?;
                Ok(())
            }
            Err(e) => self
                .try_alternative_linker(&obj_file_path, &output_path)
                .map_err(|_| e),
        }
    }

    fn link_binary(&self, obj_file_path: &PathBuf, output_path: &PathBuf) -> Result<(), CompileError> {
        let linker = self.get_target_linker();
        let mut command = Command::new(linker);

        command.arg(obj_file_path).arg("-o").arg(output_path);

        if linker == "gcc" {
            command.arg("-nostartfiles");
        }

        let status = command.status().map_err(CompileError::ExecutionError)?;

        if status.success() {
            Ok(())
        } else {
            Err(CompileError::ExecutionFailed(status))
        }
    }

    fn try_alternative_linker(
        &self,
        obj_file_path: &PathBuf,
        output_path: &PathBuf,
    ) -> Result<(), CompileError> {
        let alternative_linker = if self.get_target_linker() == "ld" { "gcc" } else { "ld" };

        let status = Command::new(alternative_linker)
            .arg(obj_file_path)
            .arg("-o")
            .arg(output_path)
            .arg("-nostartfiles")
            .status()
            .map_err(CompileError::ExecutionError)?;

        if status.success() {
            println!("✅ Binary linked successfully with {}", alternative_linker);
            Ok(())
        } else {
            Err(CompileError::ExecutionFailed(status))
        }
    }

    fn execute_binary(&self) -> Result<(), CompileError> {
        let binary_path = self.build_path.join(self.get_output_name());

        if !binary_path.exists() {
            return Err(CompileError::BinaryNotFound);
        }

        let status = Command::new(&binary_path)
            .status()
            .map_err(CompileError::ExecutionError)?;

        if status.success() {
            Ok(())
        } else {
            Err(CompileError::ExecutionFailed(status))
        }
    }

    fn find_lisp_files_in_directory(&self) -> Result<Vec<PathBuf>, CompileError> {
        let mut files = Vec::new();

        if self.source_path.is_dir() {
            if let Ok(entries) = std::fs::read_dir(&self.source_path) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() && self.is_lisp_file(&path) {
                        files.push(path);
                    }
                }
            }
        }

        if files.is_empty() {
            Err(CompileError::NoSourceFiles)
        } else {
            Ok(files)
        }
    }

    /// Only parses the file — a full test would also assemble, link, and
    /// execute the binary, checking its exit status against an expected
    /// value.
    fn test_file(&self, file_path: &PathBuf) -> Result<(), CompileError> {
        let content = std::fs::read_to_string(file_path)?;
        let tokens = tokenize(&content)?;
        let _program = parse(tokens).map_err(|e| self.report_parse_error(&content, e))?;
        Ok(())
    }

    /// Prints each accumulated diagnostic's rendered form (message, source
    /// line, caret underline) to stderr before handing the error back to
    /// the caller, so a parse failure is human-readable instead of just
    /// the bare `CompileError::Parse` count.
    fn report_parse_error(&self, source: &str, err: CompileError) -> CompileError {
        if let CompileError::Parse { diagnostics } = &err {
            for diagnostic in diagnostics {
                eprintln!("{}", diagnostic.render(source));
            }
        }
        err
    }

    fn is_lisp_file(&self, path: &PathBuf) -> bool {
        path.extension().map_or(false, |ext| ext == "lisp")
    }

    fn output_prefix(&self) -> String {
        self.source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
            .to_string()
    }

    fn get_output_name(&self) -> String {
        match self.target.as_str() {
            "windows" => format!("{}.exe", self.output_prefix()),
            _ => self.output_prefix(),
        }
    }

    fn get_target_assembly_format(&self) -> &str {
        match self.target.as_str() {
            "windows" => "win64",
            "mac" => "macho64",
            _ => "elf64",
        }
    }

    fn get_target_linker(&self) -> &str {
        match self.target.as_str() {
            "windows" => "gcc",
            _ => "ld",
        }
    }

    fn make_executable(&self, path: &PathBuf) -> Result<(), CompileError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mut perms = metadata.permissions();
                perms.set_mode(0o755);
                std::fs::set_permissions(path, perms)?;
            }
        }
        Ok(())
    }

    fn log_verbose(&self, message: &str) {
        if self.verbose {
            println!("{}", message);
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
