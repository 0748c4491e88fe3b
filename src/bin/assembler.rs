//! Assembly to bytecode compiler CLI.
//!
//! Reads assembly source files and compiles them to executable bytecode.
//!
//! # Usage
//! ```text
//! assembler <input.asm> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.asm`: Assembly source file to compile
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.bin`)
//! - `-d, --disassemble`: Print a listing of the emitted bytecode
//!
//! # Examples
//! ```text
//! assembler program.asm
//! assembler program.asm -o output.bin
//! assembler program.asm -d
//! ```

use stackvm::virtual_machine::assembler::assemble_file;
use stackvm::virtual_machine::disassembler::disassemble;
use stackvm::{error, info};
use std::env;
use std::path::PathBuf;
use std::process;

/// Parsed command-line options.
#[derive(Debug, PartialEq, Eq)]
struct Options {
    input: PathBuf,
    output: PathBuf,
    show_listing: bool,
}

/// Parses everything after the program name. `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let Some(input) = args.first() else {
        return Err("missing input file".to_string());
    };
    if input == "-h" || input == "--help" {
        return Ok(None);
    }

    let mut output = None;
    let mut show_listing = false;
    let mut rest = args[1..].iter();

    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                let path = rest
                    .next()
                    .ok_or_else(|| format!("{arg} requires an argument"))?;
                output = Some(PathBuf::from(path));
            }
            "-d" | "--disassemble" => show_listing = true,
            "-h" | "--help" => return Ok(None),
            other => return Err(format!("Unexpected argument: {other}")),
        }
    }

    let input = PathBuf::from(input);
    let output = output.unwrap_or_else(|| input.with_extension("bin"));
    Ok(Some(Options {
        input,
        output,
        show_listing,
    }))
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map(String::as_str).unwrap_or("assembler");

    let options = match parse_args(args.get(1..).unwrap_or_default()) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage(program_name);
            return;
        }
        Err(msg) => {
            error!("{msg}\n");
            print_usage(program_name);
            process::exit(1);
        }
    };

    if !options.input.exists() {
        error!("Input file does not exist: {}", options.input.display());
        process::exit(1);
    }

    if let Some(parent) = options.output.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    let program = assemble_file(&options.input).unwrap_or_else(|e| {
        // source errors are already logged as a diagnostic
        if e.location().is_none() {
            error!("{e}");
        }
        process::exit(1)
    });

    if let Err(e) = program.save(&options.output) {
        error!("Failed to write output file: {e}");
        process::exit(1);
    }

    info!(
        "Assembled {} into {} ({} bytes)",
        options.input.display(),
        options.output.display(),
        program.len()
    );

    if options.show_listing {
        match disassemble(&program) {
            Ok(listing) => print!("{listing}"),
            Err(e) => {
                error!("Disassembly failed: {e}");
                process::exit(1);
            }
        }
    }
}

const USAGE: &str = "\
Assembly Compiler

USAGE:
    {program} <input.asm> [OPTIONS]

ARGS:
    <input.asm>    Assembly source file to compile

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.bin)
    -d, --disassemble       Print a listing of the emitted bytecode
    -h, --help              Print this help message

EXAMPLES:
    # Compile to default output name
    {program} program.asm

    # Compile with explicit output
    {program} program.asm -o output.bin

    # Compile and show the listing
    {program} program.asm -d
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
