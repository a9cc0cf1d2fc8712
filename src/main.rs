//! # lispc
//!
//! Command-line entry point. Parses arguments with `clap` and dispatches
//! to `compiler::Compiler` for the `build`, `run`, and `test` subcommands.

use clap::{Arg, Command};
use std::path::PathBuf;

mod ast;
mod codegen;
mod compiler;
mod debug;

use compiler::Compiler;
use std::process;

fn main() {
    let matches = Command::new("lispc")
        .version("0.1.0")
        .about("A small Lisp-family compiler targeting x86-64 NASM")
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .help("Plain invocation with a single file path is equivalent to `build FILE`"),
        )
        .subcommand(
            Command::new("build")
                .about("Compile a source file to a binary")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_name("FILE")
                        .help("Source file to build"),
                )
                .arg(
                    Arg::new("target")
                        .long("target")
                        .value_name("OS")
                        .help("Target platform (current, windows, mac)"),
                )
                .arg(
                    Arg::new("show-asm")
                        .long("show-asm")
                        .action(clap::ArgAction::SetTrue)
                        .help("Print the generated assembly instead of assembling it"),
                )
                .arg(
                    Arg::new("verbose")
                        .long("verbose")
                        .action(clap::ArgAction::SetTrue)
                        .help("Show step-by-step compilation progress"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Compile and run a source file")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_name("FILE")
                        .help("Source file to run"),
                ),
        )
        .subcommand(
            Command::new("test")
                .about("Parse (and eventually run) source files as tests")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .help("A specific file to test; otherwise tests the current directory"),
                ),
        )
        .get_matches();

    let mut compiler = Compiler::new();

    match matches.subcommand() {
        Some(("build", sub_matches)) => {
            let file = sub_matches.get_one::<String>("file").unwrap();
            compiler.source_path = PathBuf::from(file);

            let target = sub_matches
                .get_one::<String>("target")
                .map(|s| s.as_str())
                .unwrap_or("current");

            compiler.show_asm = sub_matches.get_flag("show-asm");
            compiler.verbose = sub_matches.get_flag("verbose");

            if let Err(e) = compiler.build(target) {
                eprintln!("❌ Build failed: {}", e);
                process::exit(1);
            }
        }
        Some(("run", sub_matches)) => {
            let file = sub_matches.get_one::<String>("file").unwrap();
            compiler.source_path = PathBuf::from(file);

            if let Err(e) = compiler.run_single_file() {
                eprintln!("❌ Run failed: {}", e);
                process::exit(1);
            }
        }
        Some(("test", sub_matches)) => {
            let file = sub_matches.get_one::<String>("file").map(PathBuf::from);

            if let Err(e) = compiler.test(file) {
                eprintln!("❌ Test failed: {}", e);
                process::exit(1);
            }
        }
        _ => match matches.get_one::<String>("file") {
            Some(file) => {
                compiler.source_path = PathBuf::from(file);
                if let Err(e) = compiler.build("current") {
                    eprintln!("❌ Build failed: {}", e);
                    process::exit(1);
                }
            }
            None => {
                println!("lispc — a small Lisp-family compiler");
                println!("Use 'lispc --help' for usage information");
            }
        },
    }
}
