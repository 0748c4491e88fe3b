use super::*;
use crate::utils::test_utils::utils::{FACTORIAL_ASM, SUM_TO_TEN_ASM};
use crate::virtual_machine::assembler::assemble_source;
use crate::virtual_machine::isa::InstructionGroup;

fn vm_for(source: &str) -> VM {
    VM::new(assemble_source(source).expect("assembly failed"))
}

fn run_vm(source: &str) -> VM {
    let mut vm = vm_for(source);
    vm.run().expect("vm run failed");
    vm
}

fn run_and_get_top(source: &str) -> i32 {
    run_vm(source).top().expect("empty operand stack")
}

fn run_expect_err(source: &str) -> (VM, VMError) {
    let mut vm = vm_for(source);
    let err = vm.run().expect_err("expected error");
    (vm, err)
}

fn run_bytes_expect_err(bytes: Vec<u8>) -> (VM, VMError) {
    let mut vm = VM::new(Program::from_bytes(bytes));
    let err = vm.run().expect_err("expected error");
    (vm, err)
}

// ==================== Stack ====================

#[test]
fn push_and_dup() {
    let vm = run_vm("PUSH 3\nDUP\nPUSH -4");
    assert_eq!(vm.operand_stack(), &[3, 3, -4]);
}

#[test]
fn pop_discards_top() {
    let vm = run_vm("PUSH 1\nPUSH 2\nPOP");
    assert_eq!(vm.operand_stack(), &[1]);
}

#[test]
fn pop_on_empty_stack() {
    let (_, err) = run_expect_err("POP");
    assert_eq!(
        err,
        VMError::StackUnderflow {
            pc: 0,
            instruction: "POP",
            needed: 1,
            available: 0,
        }
    );
}

#[test]
fn dup_on_empty_stack() {
    let (_, err) = run_expect_err("NOP\nDUP");
    assert!(matches!(
        err,
        VMError::StackUnderflow {
            pc: 1,
            instruction: "DUP",
            ..
        }
    ));
}

#[test]
fn operand_stack_overflows_past_capacity() {
    let (vm, err) = run_expect_err("loop: PUSH 1\nJMP loop");
    assert_eq!(
        err,
        VMError::StackOverflow {
            pc: 0,
            capacity: OPERAND_STACK_CAPACITY,
        }
    );
    assert_eq!(vm.operand_stack().len(), OPERAND_STACK_CAPACITY);
    assert_eq!(vm.steps(), 2 * OPERAND_STACK_CAPACITY as u64);
}

// ==================== Arithmetic ====================

#[test]
fn sub_pops_b_then_a() {
    assert_eq!(run_and_get_top("PUSH 5\nPUSH 3\nSUB\nHALT"), 2);
}

#[test]
fn add_mul() {
    assert_eq!(run_and_get_top("PUSH 6\nPUSH 7\nMUL\nPUSH -2\nADD"), 40);
}

#[test]
fn add_wrapping() {
    assert_eq!(run_and_get_top("PUSH 2147483647\nPUSH 1\nADD"), i32::MIN);
}

#[test]
fn mul_wrapping() {
    assert_eq!(
        run_and_get_top("PUSH 65536\nPUSH 65536\nMUL"),
        65536i32.wrapping_mul(65536)
    );
}

#[test]
fn div_truncates_toward_zero() {
    assert_eq!(run_and_get_top("PUSH 84\nPUSH 2\nDIV"), 42);
    assert_eq!(run_and_get_top("PUSH -7\nPUSH 2\nDIV"), -3);
    assert_eq!(run_and_get_top("PUSH 7\nPUSH -2\nDIV"), -3);
}

#[test]
fn div_min_by_minus_one_wraps() {
    assert_eq!(
        run_and_get_top("PUSH -2147483648\nPUSH -1\nDIV"),
        i32::MIN
    );
}

#[test]
fn div_by_zero_stops_execution() {
    let (vm, err) = run_expect_err("PUSH 1\nPUSH 0\nDIV\nPUSH 99\nHALT");
    assert_eq!(err, VMError::DivisionByZero { pc: 10 });
    assert_eq!(vm.pc(), 10);
    assert_eq!(vm.steps(), 2);
    assert_eq!(vm.operand_stack(), &[1, 0]);
    assert_eq!(vm.status(), None);
}

#[test]
fn cmp_is_strict_less_than() {
    assert_eq!(run_and_get_top("PUSH 2\nPUSH 3\nCMP"), 1);
    assert_eq!(run_and_get_top("PUSH 3\nPUSH 2\nCMP"), 0);
    assert_eq!(run_and_get_top("PUSH 2\nPUSH 2\nCMP"), 0);
    assert_eq!(run_and_get_top("PUSH -1\nPUSH 0\nCMP"), 1);
}

#[test]
fn add_on_empty_stack() {
    let (vm, err) = run_expect_err("ADD\nHALT");
    assert_eq!(
        err,
        VMError::StackUnderflow {
            pc: 0,
            instruction: "ADD",
            needed: 2,
            available: 0,
        }
    );
    assert_eq!(vm.steps(), 0);
}

#[test]
fn binary_underflow_leaves_stack_untouched() {
    let (vm, err) = run_expect_err("PUSH 1\nADD");
    assert_eq!(
        err,
        VMError::StackUnderflow {
            pc: 5,
            instruction: "ADD",
            needed: 2,
            available: 1,
        }
    );
    assert_eq!(vm.operand_stack(), &[1]);
    assert_eq!(vm.pc(), 5);
}

// ==================== Control flow ====================

#[test]
fn jmp_skips_code() {
    let vm = run_vm("JMP end\nPUSH 1\nend: PUSH 2\nHALT");
    assert_eq!(vm.operand_stack(), &[2]);
}

#[test]
fn jz_and_jnz_pop_condition() {
    let vm = run_vm("PUSH 0\nJZ a\nPUSH 9\na: PUSH 1\nJNZ b\nPUSH 9\nb: HALT");
    assert!(vm.operand_stack().is_empty());

    let vm = run_vm("PUSH 1\nJZ a\nPUSH 7\na: PUSH 0\nJNZ b\nPUSH 8\nb: HALT");
    assert_eq!(vm.operand_stack(), &[7, 8]);
}

#[test]
fn jz_on_empty_stack() {
    let (_, err) = run_expect_err("JZ 0");
    assert!(matches!(
        err,
        VMError::StackUnderflow {
            instruction: "JZ",
            ..
        }
    ));
}

#[test]
fn loop_with_memory() {
    let vm = run_vm(SUM_TO_TEN_ASM);
    assert_eq!(vm.top(), Some(55));
    assert_eq!(vm.memory()[0], 0);
    assert_eq!(vm.memory()[1], 55);
}

#[test]
fn jump_into_operand_bytes_is_rejected() {
    let (vm, err) = run_expect_err("JMP 3\nHALT");
    assert_eq!(err, VMError::InvalidJumpTarget { target: 3, pc: 0 });
    assert_eq!(vm.pc(), 0);
}

#[test]
fn negative_or_distant_jump_is_rejected() {
    let (_, err) = run_expect_err("JMP -1");
    assert_eq!(err, VMError::InvalidJumpTarget { target: -1, pc: 0 });

    let (_, err) = run_expect_err("PUSH 0\nJZ 1000");
    assert_eq!(err, VMError::InvalidJumpTarget { target: 1000, pc: 5 });
}

#[test]
fn taken_branch_to_bad_target_keeps_condition() {
    let (vm, _) = run_expect_err("PUSH 0\nJZ 3");
    assert_eq!(vm.operand_stack(), &[0]);
}

#[test]
fn untaken_branch_ignores_target() {
    let vm = run_vm("PUSH 1\nJZ 3\nHALT");
    assert_eq!(vm.status(), Some(ExitStatus::Halted));
    assert!(vm.operand_stack().is_empty());
}

#[test]
fn jump_to_end_of_code_halts() {
    let mut vm = vm_for("JMP 6\nHALT");
    let report = vm.run().unwrap();
    assert_eq!(report.status, ExitStatus::EndOfCode);
    assert_eq!(report.pc, 6);
    assert_eq!(report.steps, 1);
}

// ==================== Memory ====================

#[test]
fn memory_starts_zeroed() {
    let vm = run_vm("LOAD 0\nLOAD 255");
    assert_eq!(vm.operand_stack(), &[0, 0]);
    assert_eq!(vm.memory().len(), MEMORY_SIZE);
    assert!(vm.memory().iter().all(|&cell| cell == 0));
}

#[test]
fn store_then_load_last_cell() {
    let vm = run_vm("PUSH 42\nSTORE 255\nLOAD 255");
    assert_eq!(vm.operand_stack(), &[42]);
    assert_eq!(vm.memory()[255], 42);
}

#[test]
fn load_out_of_range() {
    let (_, err) = run_expect_err("LOAD 256");
    assert_eq!(
        err,
        VMError::InvalidMemoryAddress {
            address: 256,
            pc: 0,
            size: MEMORY_SIZE,
        }
    );

    let (_, err) = run_expect_err("LOAD -1");
    assert!(matches!(
        err,
        VMError::InvalidMemoryAddress { address: -1, .. }
    ));
}

#[test]
fn store_checks_address_before_popping() {
    let (vm, err) = run_expect_err("PUSH 5\nSTORE 300");
    assert!(matches!(
        err,
        VMError::InvalidMemoryAddress { address: 300, .. }
    ));
    assert_eq!(vm.operand_stack(), &[5]);

    let (_, err) = run_expect_err("STORE 300");
    assert!(matches!(err, VMError::InvalidMemoryAddress { .. }));
}

#[test]
fn store_on_empty_stack() {
    let (_, err) = run_expect_err("STORE 0");
    assert!(matches!(
        err,
        VMError::StackUnderflow {
            instruction: "STORE",
            ..
        }
    ));
}

// ==================== Call / return ====================

#[test]
fn recursive_factorial() {
    let mut vm = vm_for(FACTORIAL_ASM);
    let report = vm.run().unwrap();
    assert_eq!(report.status, ExitStatus::Halted);
    assert_eq!(report.top, Some(120));
    assert_eq!(vm.operand_stack(), &[120]);
    assert!(vm.return_stack().is_empty());
}

#[test]
fn call_pushes_address_after_operand() {
    let mut vm = vm_for("CALL f\nHALT\nf: NOP");
    vm.step().unwrap();
    assert_eq!(vm.return_stack(), &[5]);
    assert_eq!(vm.pc(), 6);
}

#[test]
fn ret_without_call() {
    let (vm, err) = run_expect_err("NOP\nRET");
    assert_eq!(err, VMError::ReturnStackUnderflow { pc: 1 });
    assert_eq!(vm.pc(), 1);
}

#[test]
fn return_stack_overflows_past_capacity() {
    let (vm, err) = run_expect_err("f: CALL f");
    assert_eq!(
        err,
        VMError::ReturnStackOverflow {
            pc: 0,
            capacity: RETURN_STACK_CAPACITY,
        }
    );
    assert_eq!(vm.return_stack().len(), RETURN_STACK_CAPACITY);
    assert!(vm.operand_stack().is_empty());
}

#[test]
fn call_as_last_instruction_returns_to_end() {
    let vm = run_vm("JMP main\nf: RET\nmain: CALL f");
    assert_eq!(vm.status(), Some(ExitStatus::EndOfCode));
    assert_eq!(vm.pc(), vm.program().len());
}

// ==================== Halting ====================

#[test]
fn halt_stops_before_remaining_code() {
    let mut vm = vm_for("PUSH 7\nHALT\nPUSH 8");
    let report = vm.run().unwrap();
    assert_eq!(
        report,
        ExecReport {
            status: ExitStatus::Halted,
            top: Some(7),
            pc: 6,
            steps: 2,
        }
    );
}

#[test]
fn running_off_the_end_is_an_implicit_halt() {
    let mut vm = vm_for("PUSH 1");
    let report = vm.run().unwrap();
    assert_eq!(report.status, ExitStatus::EndOfCode);
    assert_eq!(report.top, Some(1));
    assert_eq!(report.pc, 5);
}

#[test]
fn empty_program() {
    let mut vm = VM::new(Program::default());
    let report = vm.run().unwrap();
    assert_eq!(report.status, ExitStatus::EndOfCode);
    assert_eq!(report.top, None);
    assert_eq!(report.pc, 0);
    assert_eq!(report.steps, 0);
}

#[test]
fn run_after_exit_is_idempotent() {
    let mut vm = vm_for("PUSH 3\nHALT");
    let first = vm.run().unwrap();
    let second = vm.run().unwrap();
    assert_eq!(first, second);
}

// ==================== Malformed bytecode ====================

#[test]
fn illegal_opcode() {
    let (vm, err) = run_bytes_expect_err(vec![0x50, 0xFF]);
    assert_eq!(err, VMError::IllegalOpcode { opcode: 0xFF, pc: 1 });
    assert_eq!(vm.steps(), 1);
    assert_eq!(vm.pc(), 1);
}

#[test]
fn truncated_operand() {
    let (vm, err) = run_bytes_expect_err(vec![0x01, 0x02]);
    assert_eq!(
        err,
        VMError::TruncatedInstruction {
            instruction: "PUSH",
            pc: 0,
            needed: 4,
            available: 1,
        }
    );
    assert_eq!(vm.pc(), 0);
    assert!(vm.operand_stack().is_empty());
}

#[test]
fn jump_past_undecodable_bytes_is_rejected() {
    // JMP 6, then an illegal byte, then HALT at offset 6
    let mut code = Vec::new();
    Instruction::Jmp.encode(6, &mut code);
    code.push(0xEE);
    code.push(0x00);
    let (_, err) = run_bytes_expect_err(code);
    assert_eq!(err, VMError::InvalidJumpTarget { target: 6, pc: 0 });
}

// ==================== Step limit / profile ====================

#[test]
fn step_limit_stops_infinite_loop() {
    let program = assemble_source("loop: JMP loop").unwrap();
    let mut vm = VM::with_step_limit(program, 100);
    let err = vm.run().unwrap_err();
    assert_eq!(err, VMError::StepLimitExceeded { limit: 100, pc: 0 });
    assert_eq!(vm.steps(), 100);
}

#[test]
fn step_limit_not_reached() {
    let program = assemble_source(FACTORIAL_ASM).unwrap();
    let mut vm = VM::with_step_limit(program, 10_000);
    assert_eq!(vm.run().unwrap().top, Some(120));
}

#[test]
fn profile_counts_by_group() {
    let vm = run_vm("PUSH 1\nPUSH 2\nADD\nNOP\nHALT");
    let profile = vm.profile();
    assert_eq!(profile.get(InstructionGroup::Stack), 2);
    assert_eq!(profile.get(InstructionGroup::Arithmetic), 1);
    assert_eq!(profile.get(InstructionGroup::System), 2);
    assert_eq!(profile.get(InstructionGroup::Memory), 0);
    assert_eq!(profile.total(), vm.steps());
}

#[test]
fn failed_instruction_is_not_profiled() {
    let (vm, _) = run_expect_err("PUSH 1\nPUSH 0\nDIV");
    assert_eq!(vm.profile().get(InstructionGroup::Arithmetic), 0);
    assert_eq!(vm.profile().total(), 2);
}

// ==================== Determinism ====================

#[test]
fn runs_are_deterministic() {
    let program = assemble_source(SUM_TO_TEN_ASM).unwrap();
    let mut a = VM::new(program.clone());
    let mut b = VM::new(program);
    assert_eq!(a.run().unwrap(), b.run().unwrap());
    assert_eq!(a.operand_stack(), b.operand_stack());
    assert_eq!(a.memory(), b.memory());
}

#[test]
fn vm_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<VM>();
}

#[test]
fn independent_vms_run_on_threads() {
    let program = assemble_source(FACTORIAL_ASM).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let program = program.clone();
            std::thread::spawn(move || VM::new(program).run().unwrap().top)
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Some(120));
    }
}
