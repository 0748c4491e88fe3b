//! Core virtual machine implementation.
//!
//! The VM executes bytecode against three storage regions, all owned by one
//! VM instance and zeroed at construction:
//!
//! - an operand stack of [`OPERAND_STACK_CAPACITY`] `i32`s,
//! - a return stack of [`RETURN_STACK_CAPACITY`] addresses, kept apart from
//!   the operand stack so arguments and return addresses never interleave,
//! - [`MEMORY_SIZE`] memory cells addressed by `LOAD`/`STORE`.
//!
//! All arithmetic uses wrapping semantics to prevent overflow panics.
//!
//! Running off the end of the bytecode is an implicit halt. Jump, call and
//! return targets must land on an instruction boundary (or exactly at the
//! end of the code); boundaries are found by a linear decode when the VM is
//! built.

mod memory;
mod profile;
mod stack;
#[cfg(test)]
mod tests;

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{
    Instruction, OPERAND_SIZE, UnknownOpcode, decode, decode_operand,
};
use crate::virtual_machine::program::Program;
use memory::Memory;
use stack::BoundedStack;

pub use memory::MEMORY_SIZE;
pub use profile::InstructionProfile;

/// Maximum number of values on the operand stack.
pub const OPERAND_STACK_CAPACITY: usize = 1024;
/// Maximum call depth.
pub const RETURN_STACK_CAPACITY: usize = 256;

/// How a successful run ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    /// A `HALT` instruction was executed.
    Halted,
    /// The program counter reached the end of the bytecode.
    EndOfCode,
}

/// Summary returned by [`VM::run`] on success.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExecReport {
    pub status: ExitStatus,
    /// Top of the operand stack at exit, if the stack is non-empty.
    pub top: Option<i32>,
    /// Final program counter.
    pub pc: usize,
    /// Number of instructions executed.
    pub steps: u64,
}

macro_rules! exec_vm {
    (
        vm = $vm:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident ),* $(,)? ) ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    let instr_name = $instr.mnemonic();
                    $( let $field = $vm.read_operand(instr_name)?; )*
                    $vm.$handler(instr_name, $( $field ),*)
                }
            ),*
        }
    }};
}

/// Bytecode virtual machine.
///
/// One instance runs one program once; to run programs concurrently, build
/// one VM per run. Storage is fixed-size and never reallocated.
pub struct VM {
    /// Bytecode to execute.
    program: Program,
    /// `boundaries[i]` is true when an instruction starts at `i`; the entry
    /// at `program.len()` marks a cleanly decodable end of code.
    boundaries: Vec<bool>,
    /// Instruction pointer (current position in bytecode).
    ip: usize,
    /// Offset of the instruction being executed.
    instr_offset: usize,
    operands: BoundedStack<i32, OPERAND_STACK_CAPACITY>,
    returns: BoundedStack<usize, RETURN_STACK_CAPACITY>,
    memory: Memory,
    steps: u64,
    max_steps: Option<u64>,
    profile: InstructionProfile,
    status: Option<ExitStatus>,
}

impl VM {
    /// Creates a VM for `program` with no step limit.
    ///
    /// A program that never halts runs forever; see [`VM::with_step_limit`].
    pub fn new(program: Program) -> Self {
        Self {
            boundaries: instruction_boundaries(program.as_slice()),
            program,
            ip: 0,
            instr_offset: 0,
            operands: BoundedStack::new(),
            returns: BoundedStack::new(),
            memory: Memory::new(),
            steps: 0,
            max_steps: None,
            profile: InstructionProfile::new(),
            status: None,
        }
    }

    /// Creates a VM that fails with [`VMError::StepLimitExceeded`] once
    /// `max_steps` instructions have run without halting.
    pub fn with_step_limit(program: Program, max_steps: u64) -> Self {
        let mut vm = Self::new(program);
        vm.max_steps = Some(max_steps);
        vm
    }

    /// Executes the bytecode until `HALT`, end of code, or an error.
    ///
    /// On error the VM stops at the failing instruction: [`VM::pc`] points at
    /// it and the stacks and memory are left as they were before it ran.
    /// Calling `run` again after a successful exit returns the same report.
    pub fn run(&mut self) -> Result<ExecReport, VMError> {
        while self.status.is_none() {
            self.step()?;
        }
        Ok(self.report())
    }

    /// Executes a single instruction, or records the implicit halt when the
    /// program counter sits at the end of the code.
    pub fn step(&mut self) -> Result<(), VMError> {
        if self.status.is_some() {
            return Ok(());
        }

        let code = self.program.as_slice();
        let Some(&opcode) = code.get(self.ip) else {
            self.status = Some(ExitStatus::EndOfCode);
            return Ok(());
        };

        if let Some(limit) = self.max_steps
            && self.steps >= limit
        {
            return Err(VMError::StepLimitExceeded { limit, pc: self.ip });
        }

        self.instr_offset = self.ip;
        let instr = Instruction::try_from(opcode).map_err(|UnknownOpcode(opcode)| {
            VMError::IllegalOpcode {
                opcode,
                pc: self.instr_offset,
            }
        })?;
        self.ip += 1;

        if let Err(err) = self.exec(instr) {
            self.ip = self.instr_offset;
            return Err(err);
        }

        self.steps += 1;
        self.profile.record(instr.group());
        Ok(())
    }

    /// Returns the report for the current state.
    fn report(&self) -> ExecReport {
        ExecReport {
            status: self.status.unwrap_or(ExitStatus::EndOfCode),
            top: self.top(),
            pc: self.ip,
            steps: self.steps,
        }
    }

    /// Returns the program being executed.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Returns the current program counter.
    pub fn pc(&self) -> usize {
        self.ip
    }

    /// Returns the number of instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns how the run ended, or `None` while it is still running (or failed).
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Returns the operand stack, bottom first.
    pub fn operand_stack(&self) -> &[i32] {
        self.operands.as_slice()
    }

    /// Returns the top of the operand stack.
    pub fn top(&self) -> Option<i32> {
        self.operands.peek(0)
    }

    /// Returns the pending return addresses, outermost call first.
    pub fn return_stack(&self) -> &[usize] {
        self.returns.as_slice()
    }

    /// Returns the memory array.
    pub fn memory(&self) -> &[i32] {
        self.memory.as_slice()
    }

    /// Returns the executed-instruction profile.
    pub fn profile(&self) -> &InstructionProfile {
        &self.profile
    }

    /// Reads the 4-byte operand at the current IP and advances past it.
    #[inline(always)]
    fn read_operand(&mut self, instr: &'static str) -> Result<i32, VMError> {
        let code = self.program.as_slice();
        let value = decode_operand(code, self.ip).ok_or(VMError::TruncatedInstruction {
            instruction: instr,
            pc: self.instr_offset,
            needed: OPERAND_SIZE,
            available: code.len().saturating_sub(self.ip),
        })?;
        self.ip += OPERAND_SIZE;
        Ok(value)
    }

    /// Executes a single instruction.
    fn exec(&mut self, instruction: Instruction) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            {
                // Stack
                Push => op_push(value),
                Pop => op_pop(),
                Dup => op_dup(),
                // Arithmetic / comparison
                Add => op_add(),
                Sub => op_sub(),
                Mul => op_mul(),
                Div => op_div(),
                Cmp => op_cmp(),
                // Control flow
                Jmp => op_jmp(target),
                Jz => op_jz(target),
                Jnz => op_jnz(target),
                // Memory
                Load => op_load(slot),
                Store => op_store(slot),
                // Call / return
                Call => op_call(target),
                Ret => op_ret(),
                // System
                Halt => op_halt(),
                Nop => op_nop(),
            }
        }
    }

    fn underflow(&self, instr: &'static str, needed: usize) -> VMError {
        VMError::StackUnderflow {
            pc: self.instr_offset,
            instruction: instr,
            needed,
            available: self.operands.len(),
        }
    }

    #[inline(always)]
    fn push(&mut self, value: i32) -> Result<(), VMError> {
        self.operands
            .push(value)
            .map_err(|_| VMError::StackOverflow {
                pc: self.instr_offset,
                capacity: OPERAND_STACK_CAPACITY,
            })
    }

    #[inline(always)]
    fn pop(&mut self, instr: &'static str) -> Result<i32, VMError> {
        match self.operands.pop() {
            Some(value) => Ok(value),
            None => Err(self.underflow(instr, 1)),
        }
    }

    #[inline(always)]
    fn peek(&self, instr: &'static str) -> Result<i32, VMError> {
        self.operands
            .peek(0)
            .ok_or_else(|| self.underflow(instr, 1))
    }

    /// Pops `b` then `a` and pushes `op(a, b)`. The stack is untouched if `op` fails.
    #[inline(always)]
    fn binary_op(
        &mut self,
        instr: &'static str,
        op: impl FnOnce(i32, i32) -> Result<i32, VMError>,
    ) -> Result<(), VMError> {
        let (Some(b), Some(a)) = (self.operands.peek(0), self.operands.peek(1)) else {
            return Err(self.underflow(instr, 2));
        };
        let result = op(a, b)?;
        self.operands.discard(2);
        self.push(result)
    }

    /// Validates a jump, call or return target.
    fn check_target(&self, target: i64) -> Result<usize, VMError> {
        usize::try_from(target)
            .ok()
            .filter(|&t| self.boundaries.get(t).copied().unwrap_or(false))
            .ok_or(VMError::InvalidJumpTarget {
                target,
                pc: self.instr_offset,
            })
    }

    /// Pops the condition and jumps to `target` when `taken` holds.
    fn branch_if(
        &mut self,
        instr: &'static str,
        target: i32,
        taken: impl FnOnce(i32) -> bool,
    ) -> Result<(), VMError> {
        let cond = self.peek(instr)?;
        let dest = if taken(cond) {
            Some(self.check_target(target.into())?)
        } else {
            None
        };
        self.operands.discard(1);
        if let Some(dest) = dest {
            self.ip = dest;
        }
        Ok(())
    }

    fn op_push(&mut self, _instr: &'static str, value: i32) -> Result<(), VMError> {
        self.push(value)
    }

    fn op_pop(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.pop(instr).map(|_| ())
    }

    fn op_dup(&mut self, instr: &'static str) -> Result<(), VMError> {
        let top = self.peek(instr)?;
        self.push(top)
    }

    fn op_add(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary_op(instr, |a, b| Ok(a.wrapping_add(b)))
    }

    fn op_sub(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary_op(instr, |a, b| Ok(a.wrapping_sub(b)))
    }

    fn op_mul(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary_op(instr, |a, b| Ok(a.wrapping_mul(b)))
    }

    fn op_div(&mut self, instr: &'static str) -> Result<(), VMError> {
        let pc = self.instr_offset;
        self.binary_op(instr, |a, b| {
            if b == 0 {
                return Err(VMError::DivisionByZero { pc });
            }
            // i32::MIN / -1 wraps to i32::MIN
            Ok(a.wrapping_div(b))
        })
    }

    fn op_cmp(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary_op(instr, |a, b| Ok(i32::from(a < b)))
    }

    fn op_jmp(&mut self, _instr: &'static str, target: i32) -> Result<(), VMError> {
        self.ip = self.check_target(target.into())?;
        Ok(())
    }

    fn op_jz(&mut self, instr: &'static str, target: i32) -> Result<(), VMError> {
        self.branch_if(instr, target, |v| v == 0)
    }

    fn op_jnz(&mut self, instr: &'static str, target: i32) -> Result<(), VMError> {
        self.branch_if(instr, target, |v| v != 0)
    }

    fn op_load(&mut self, _instr: &'static str, slot: i32) -> Result<(), VMError> {
        let value = self
            .memory
            .load(slot)
            .ok_or(VMError::InvalidMemoryAddress {
                address: slot,
                pc: self.instr_offset,
                size: MEMORY_SIZE,
            })?;
        self.push(value)
    }

    fn op_store(&mut self, instr: &'static str, slot: i32) -> Result<(), VMError> {
        let idx = Memory::index(slot).ok_or(VMError::InvalidMemoryAddress {
            address: slot,
            pc: self.instr_offset,
            size: MEMORY_SIZE,
        })?;
        let value = self.pop(instr)?;
        self.memory.store(idx, value);
        Ok(())
    }

    fn op_call(&mut self, _instr: &'static str, target: i32) -> Result<(), VMError> {
        let dest = self.check_target(target.into())?;
        // ip already points past the operand
        self.returns
            .push(self.ip)
            .map_err(|_| VMError::ReturnStackOverflow {
                pc: self.instr_offset,
                capacity: RETURN_STACK_CAPACITY,
            })?;
        self.ip = dest;
        Ok(())
    }

    fn op_ret(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let addr = self
            .returns
            .peek(0)
            .ok_or(VMError::ReturnStackUnderflow {
                pc: self.instr_offset,
            })?;
        let dest = self.check_target(addr as i64)?;
        self.returns.discard(1);
        self.ip = dest;
        Ok(())
    }

    fn op_halt(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.status = Some(ExitStatus::Halted);
        Ok(())
    }

    fn op_nop(&mut self, _instr: &'static str) -> Result<(), VMError> {
        Ok(())
    }
}

/// Marks every offset where an instruction starts, decoding linearly from 0.
///
/// Decoding stops at the first illegal or truncated instruction: that offset
/// is still marked (executing it reports the real error) but nothing after it
/// is, including the end of code.
fn instruction_boundaries(code: &[u8]) -> Vec<bool> {
    let mut marks = vec![false; code.len() + 1];
    let mut pc = 0;

    while pc < code.len() {
        marks[pc] = true;
        match decode(code, pc) {
            Ok(decoded) => pc += decoded.size(),
            Err(_) => return marks,
        }
    }

    marks[pc] = true;
    marks
}
