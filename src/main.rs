//! Stack VM runner.
//!
//! Assembles (or loads) a program, runs it to completion, and reports the result.
//!
//! # Usage
//! ```text
//! stackvm <program> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: Assembly source (`.asm`) or raw bytecode (any other extension)
//!
//! # Options
//! - `--max-steps <n>`: Abort after `n` executed instructions
//! - `--profile`: Print executed instructions per group
//! - `-q, --quiet`: Only log warnings and errors
//! - `-v, --verbose`: Also log debug messages
//!
//! The top of the operand stack is printed to stdout (`<empty>` if the stack
//! is empty). Exit status is 0 on success, 1 for usage, I/O or assembly
//! errors, and 2 when execution fails.

use stackvm::utils::log::{Level, set_min_level};
use stackvm::virtual_machine::assembler::assemble_file;
use stackvm::virtual_machine::isa::InstructionGroup;
use stackvm::virtual_machine::program::Program;
use stackvm::virtual_machine::errors::VMError;
use stackvm::virtual_machine::vm::{ExitStatus, InstructionProfile, VM};
use stackvm::{debug, error, info, warn};
use std::env;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut max_steps: Option<u64> = None;
    let mut show_profile = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ "--max-steps" => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                max_steps = Some(args[i].parse::<u64>().unwrap_or_else(|_| {
                    error!("Invalid step limit: '{}' is not a valid number", args[i]);
                    process::exit(1);
                }));
                i += 1;
            }
            "--profile" => {
                show_profile = true;
                i += 1;
            }
            "--quiet" | "-q" => {
                set_min_level(Level::Warn);
                i += 1;
            }
            "--verbose" | "-v" => {
                set_min_level(Level::Debug);
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let path = Path::new(input_path);
    if !path.exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let is_source = path.extension().is_some_and(|ext| ext == "asm");
    let program = if is_source {
        assemble_file(path).unwrap_or_else(|e| {
            // source errors are already logged as a diagnostic
            if e.location().is_none() {
                error!("{e}");
            }
            process::exit(1)
        })
    } else {
        Program::load(path).unwrap_or_else(|e| {
            error!("{e}");
            process::exit(1)
        })
    };

    info!("Loaded {} ({} bytes)", input_path, program.len());
    debug!(
        "Input treated as {}",
        if is_source { "assembly source" } else { "raw bytecode" }
    );

    let mut vm = match max_steps {
        Some(limit) => {
            debug!("Step limit: {}", format_with_commas(limit));
            VM::with_step_limit(program, limit)
        }
        None => VM::new(program),
    };

    let result = vm.run();

    if show_profile {
        print_profile(vm.profile());
    }

    match result {
        Ok(report) => {
            let how = match report.status {
                ExitStatus::Halted => "halted",
                ExitStatus::EndOfCode => "reached end of code",
            };
            info!(
                "Program {} at pc {} after {} instructions",
                how,
                report.pc,
                format_with_commas(report.steps)
            );
            match report.top {
                Some(top) => println!("{top}"),
                None => println!("<empty>"),
            }
        }
        Err(e) => {
            error!("Execution failed: {e}");
            if let VMError::StepLimitExceeded { limit, .. } = e {
                warn!("Raise --max-steps above {limit} to let the program finish");
            }
            error!(
                "Operand stack depth {}, return stack depth {}, {} instructions executed",
                vm.operand_stack().len(),
                vm.return_stack().len(),
                format_with_commas(vm.steps())
            );
            process::exit(2);
        }
    }
}

fn print_profile(profile: &InstructionProfile) {
    let total_u = profile.total();
    let total = total_u as f64;

    let cat_w = 2 + InstructionGroup::ALL
        .iter()
        .map(|g| g.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max("total".chars().count());

    let amt_w = format_with_commas(total_u).chars().count();
    let dash_w = cat_w + 1 + amt_w + 2 + "( 100.0%)".len();

    println!("Instruction Profile:");
    println!("{}", "-".repeat(dash_w));

    for (group, count) in profile.iter() {
        if count == 0 {
            continue;
        }

        let percent = if total > 0.0 {
            (count as f64 / total) * 100.0
        } else {
            0.0
        };

        println!(
            "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
            group.as_str(),
            format_with_commas(count),
            percent,
        );
    }

    println!("{}", "-".repeat(dash_w));
    println!(
        "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
        "total",
        format_with_commas(total_u),
        100.0,
    );
}

fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

const USAGE: &str = "\
Stack VM

USAGE:
    {program} <program> [OPTIONS]

ARGS:
    <program>    Assembly source (.asm) or raw bytecode file

OPTIONS:
    --max-steps <n>    Abort after n executed instructions
    --profile          Print executed instructions per group
    -q, --quiet        Only log warnings and errors
    -v, --verbose      Also log debug messages
    -h, --help         Print this help message

EXAMPLES:
    # Assemble and run a source file
    {program} factorial.asm

    # Run precompiled bytecode with a step budget
    {program} factorial.bin --max-steps 100000 --profile
";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
