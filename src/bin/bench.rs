//! VM benchmark binary.
//!
//! Measures execution time for representative programs.
//! Run with: `cargo run --release --bin bench`

use std::time::{Duration, Instant};

use stackvm::virtual_machine::assembler::assemble_source;
use stackvm::virtual_machine::program::Program;
use stackvm::virtual_machine::vm::VM;

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: String,
    iterations: u64,
    total: Duration,
    /// Instructions executed by the last run.
    instructions: u64,
}

impl BenchResult {
    fn avg(&self) -> Duration {
        self.total / self.iterations as u32
    }

    fn print(&self) {
        let ns_per_op = self.avg().as_nanos();
        let ns_per_instr = if self.instructions > 0 {
            format!("{:>8.1}", ns_per_op as f64 / self.instructions as f64)
        } else {
            "       -".to_string()
        };
        println!(
            "  {:<30} {:>7} iters {:>10.3} us/iter {:>12} instrs  {} ns/instr",
            self.name,
            self.iterations,
            ns_per_op as f64 / 1000.0,
            self.instructions,
            ns_per_instr,
        );
    }
}

/// Runs `f` for at least `min_duration`, returning aggregated results.
fn bench<F>(name: impl Into<String>, min_duration: Duration, mut f: F) -> BenchResult
where
    F: FnMut() -> u64,
{
    // Warmup
    for _ in 0..5 {
        f();
    }

    let mut iterations = 0u64;
    let mut last_steps = 0u64;
    let start = Instant::now();
    while start.elapsed() < min_duration {
        last_steps = f();
        iterations += 1;
    }
    let total = start.elapsed();

    BenchResult {
        name: name.into(),
        iterations,
        total,
        instructions: last_steps,
    }
}

/// Runs a fresh VM over `program`, returning the number of executed instructions.
fn run_steps(program: &Program) -> u64 {
    let mut vm = VM::new(program.clone());
    vm.run().expect("run failed").steps
}

// ---------------------------------------------------------------------------
// Benchmark definitions
// ---------------------------------------------------------------------------

fn factorial_asm(n: u32) -> String {
    format!(
        r#"
        PUSH {n}
        STORE 0
        PUSH 1
        STORE 1
loop:   LOAD 0
        JZ done
        LOAD 1
        LOAD 0
        MUL
        STORE 1
        LOAD 0
        PUSH 1
        SUB
        STORE 0
        JMP loop
done:   LOAD 1
        HALT
"#
    )
}

const RECURSIVE_FACTORIAL_ASM: &str = r#"
        PUSH 12
        CALL fact
        HALT
fact:   DUP
        PUSH 2
        CMP
        JNZ base
        DUP
        PUSH 1
        SUB
        CALL fact
        MUL
        RET
base:   RET
"#;

const TIGHT_LOOP_ASM: &str = r#"
        PUSH 100000
loop:   PUSH 1
        SUB
        DUP
        JNZ loop
        HALT
"#;

const ARITHMETIC_MIX_ASM: &str = r#"
        PUSH 10000
        STORE 0
loop:   PUSH 7
        PUSH 3
        ADD
        PUSH 6
        MUL
        PUSH 4
        SUB
        PUSH 2
        DIV
        PUSH 9
        CMP
        POP
        LOAD 0
        PUSH 1
        SUB
        DUP
        STORE 0
        JNZ loop
        HALT
"#;

const BRANCH_HEAVY_ASM: &str = r#"
        PUSH 50000
        STORE 0
loop:   LOAD 1
        JZ even
        PUSH 0
        STORE 1
        JMP next
even:   PUSH 1
        STORE 1
next:   LOAD 0
        PUSH 1
        SUB
        DUP
        STORE 0
        JNZ loop
        HALT
"#;

const CALL_OVERHEAD_ASM: &str = r#"
        PUSH 10000
loop:   CALL noop
        PUSH 1
        SUB
        DUP
        JNZ loop
        HALT
noop:   RET
"#;

const MEMORY_ASM: &str = r#"
        PUSH 5000
        STORE 0
loop:   LOAD 0
        STORE 2
        LOAD 2
        STORE 3
        LOAD 3
        PUSH 1
        SUB
        DUP
        STORE 0
        JNZ loop
        HALT
"#;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let min = Duration::from_secs(2);

    println!("VM Benchmarks (each runs for >= 2s)\n");
    println!(
        "  {:<30} {:>7}       {:>14} {:>12}  {:>10}",
        "benchmark", "iters", "avg time", "instrs/run", "ns/instr"
    );
    println!("  {}", "-".repeat(86));

    // Pre-assemble programs (assembly cost excluded from benchmark)
    let mut cases: Vec<(String, Program)> = [10u32, 100, 1000]
        .iter()
        .map(|&n| {
            let prog = assemble_source(&factorial_asm(n)).expect("asm");
            (format!("factorial({n})"), prog)
        })
        .collect();

    for (name, source) in [
        ("factorial_rec(12)", RECURSIVE_FACTORIAL_ASM),
        ("tight_loop(100K)", TIGHT_LOOP_ASM),
        ("arithmetic_mix(10K)", ARITHMETIC_MIX_ASM),
        ("branch_heavy(50K)", BRANCH_HEAVY_ASM),
        ("call_overhead(10K)", CALL_OVERHEAD_ASM),
        ("mem_load_store(5K)", MEMORY_ASM),
    ] {
        cases.push((name.to_string(), assemble_source(source).expect("asm")));
    }

    for (name, prog) in &cases {
        bench(name.as_str(), min, || run_steps(prog)).print();
    }

    println!();
}
