//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the VM's instruction set. The [`for_each_instruction!`](crate::for_each_instruction) macro holds
//! the canonical instruction definitions and invokes a callback macro for code
//! generation, so the enum, the opcode decoder, the mnemonic table, the
//! sizing function and the VM dispatch all come from one list.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes (failing with [`UnknownOpcode`])
//! - [`Instruction::size`], the single sizing rule shared by both assembler
//!   passes, the VM and the disassembler
//!
//! # Bytecode Format
//!
//! Instructions use fixed-width encoding:
//! - Opcode: 1 byte
//! - Operand (if any): 4 bytes, signed 32-bit, little-endian
//!
//! There is no header and no boundary marker; offset 0 is the entry point.

use crate::virtual_machine::errors::VMError;
use stackvm_derive::Error;

/// Size of an encoded operand in bytes.
pub const OPERAND_SIZE: usize = 4;

/// Byte that is not an opcode of this ISA.
///
/// Carries no offset; [`decode`] and the VM turn it into
/// [`VMError::IllegalOpcode`] with the offset where the byte was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown opcode 0x{0:02x}")]
pub struct UnknownOpcode(pub u8);

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry is `Name = opcode, "MNEMONIC" => [operand: Kind], Group`.
/// An instruction takes at most one operand.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack
            // =========================
            /// PUSH value ; push value
            Push = 0x01, "PUSH" => [value: Imm], Stack,
            /// POP ; discard the top value
            Pop = 0x02, "POP" => [], Stack,
            /// DUP ; push a copy of the top value
            Dup = 0x03, "DUP" => [], Stack,
            // =========================
            // Arithmetic / comparison
            // =========================
            /// ADD ; pop b, pop a, push a + b
            Add = 0x10, "ADD" => [], Arithmetic,
            /// SUB ; pop b, pop a, push a - b
            Sub = 0x11, "SUB" => [], Arithmetic,
            /// MUL ; pop b, pop a, push a * b
            Mul = 0x12, "MUL" => [], Arithmetic,
            /// DIV ; pop b, pop a, push a / b (trap on division by zero)
            Div = 0x13, "DIV" => [], Arithmetic,
            /// CMP ; pop b, pop a, push 1 if a < b else 0
            Cmp = 0x14, "CMP" => [], Arithmetic,
            // =========================
            // Control flow
            // =========================
            /// JMP addr ; PC = addr
            Jmp = 0x20, "JMP" => [target: Addr], Control,
            /// JZ addr ; pop v; if v == 0 then PC = addr
            Jz = 0x21, "JZ" => [target: Addr], Control,
            /// JNZ addr ; pop v; if v != 0 then PC = addr
            Jnz = 0x22, "JNZ" => [target: Addr], Control,
            // =========================
            // Memory
            // =========================
            /// LOAD slot ; push memory[slot]
            Load = 0x30, "LOAD" => [slot: Slot], Memory,
            /// STORE slot ; pop v; memory[slot] = v
            Store = 0x31, "STORE" => [slot: Slot], Memory,
            // =========================
            // Call / return
            // =========================
            /// CALL addr ; push PC + 5 on the return stack; PC = addr
            Call = 0x40, "CALL" => [target: Addr], Call,
            /// RET ; PC = pop return stack
            Ret = 0x41, "RET" => [], Call,
            // =========================
            // System
            // =========================
            /// HALT ; stop execution
            Halt = 0x00, "HALT" => [], System,
            /// NOP ; do nothing
            Nop = 0x50, "NOP" => [], System,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $group:ident
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        /// Number of instructions in the ISA.
        pub const INSTRUCTION_COUNT: usize = $crate::define_instructions!(@count $( $name ),*);

        impl TryFrom<u8> for Instruction {
            type Error = UnknownOpcode;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(UnknownOpcode(value)),
                }
            }
        }

        impl Instruction {
            /// Every instruction, in table order.
            pub const ALL: [Instruction; INSTRUCTION_COUNT] = [ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Looks up an instruction by its (case-sensitive) mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Instruction> {
                match name {
                    $( $mnemonic => Some(Instruction::$name), )*
                    _ => None,
                }
            }

            /// Returns how the operand is interpreted, or `None` for 1-byte instructions.
            pub const fn operand(&self) -> Option<OperandKind> {
                match self {
                    $( Instruction::$name => $crate::define_instructions!(@operand $( $kind ),*), )*
                }
            }

            /// Returns the profiling group of this instruction.
            pub const fn group(&self) -> InstructionGroup {
                match self {
                    $( Instruction::$name => InstructionGroup::$group, )*
                }
            }
        }
    };

    // ---------- counting ----------
    (@count $( $x:ident ),* ) => {
        <[()]>::len(&[ $( $crate::define_instructions!(@unit $x) ),* ])
    };

    (@unit $x:ident) => { () };

    // ---------- operands ----------
    (@operand) => { None };
    (@operand $kind:ident) => { Some(OperandKind::$kind) };
}

/// How the 32-bit operand of an instruction is interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Literal value.
    Imm,
    /// Bytecode offset of a jump or call target.
    Addr,
    /// Memory cell index.
    Slot,
}

/// Coarse instruction categories used by [`InstructionProfile`](crate::virtual_machine::vm::InstructionProfile).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum InstructionGroup {
    Stack = 0,
    Arithmetic = 1,
    Control = 2,
    Memory = 3,
    Call = 4,
    System = 5,
}

/// Number of [`InstructionGroup`] variants.
pub const GROUP_COUNT: usize = 6;

impl InstructionGroup {
    /// All groups in discriminant order.
    pub const ALL: [InstructionGroup; GROUP_COUNT] = [
        InstructionGroup::Stack,
        InstructionGroup::Arithmetic,
        InstructionGroup::Control,
        InstructionGroup::Memory,
        InstructionGroup::Call,
        InstructionGroup::System,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            InstructionGroup::Stack => "Stack",
            InstructionGroup::Arithmetic => "Arithmetic",
            InstructionGroup::Control => "Control Flow",
            InstructionGroup::Memory => "Memory",
            InstructionGroup::Call => "Call/Return",
            InstructionGroup::System => "System",
        }
    }
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Encoded size in bytes: 1 for bare opcodes, 5 with an operand.
    pub const fn size(&self) -> usize {
        match self.operand() {
            Some(_) => 1 + OPERAND_SIZE,
            None => 1,
        }
    }

    /// Appends the encoded instruction to `out`.
    ///
    /// `operand` is ignored for instructions that take none.
    pub fn encode(&self, operand: i32, out: &mut Vec<u8>) {
        out.push(*self as u8);
        if self.operand().is_some() {
            out.extend_from_slice(&operand.to_le_bytes());
        }
    }
}

/// A single instruction decoded from bytecode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Decoded {
    pub instruction: Instruction,
    pub operand: Option<i32>,
}

impl Decoded {
    /// Encoded size of the decoded instruction.
    pub const fn size(&self) -> usize {
        self.instruction.size()
    }
}

/// Decodes the instruction starting at `pc`.
///
/// Fails with [`VMError::IllegalOpcode`] for unknown opcode bytes and
/// [`VMError::TruncatedInstruction`] when the operand runs past the end of `code`.
pub fn decode(code: &[u8], pc: usize) -> Result<Decoded, VMError> {
    let opcode = *code.get(pc).ok_or(VMError::TruncatedInstruction {
        instruction: "<opcode>",
        pc,
        needed: 1,
        available: 0,
    })?;
    let instruction = Instruction::try_from(opcode)
        .map_err(|UnknownOpcode(opcode)| VMError::IllegalOpcode { opcode, pc })?;

    let operand = match instruction.operand() {
        None => None,
        Some(_) => Some(decode_operand(code, pc + 1).ok_or(
            VMError::TruncatedInstruction {
                instruction: instruction.mnemonic(),
                pc,
                needed: OPERAND_SIZE,
                available: code.len().saturating_sub(pc + 1),
            },
        )?),
    };

    Ok(Decoded {
        instruction,
        operand,
    })
}

/// Reads the little-endian `i32` operand starting at `at`, if fully in bounds.
#[inline(always)]
pub fn decode_operand(code: &[u8], at: usize) -> Option<i32> {
    let bytes = code.get(at..at.checked_add(OPERAND_SIZE)?)?;
    let mut raw = [0u8; OPERAND_SIZE];
    raw.copy_from_slice(bytes);
    Some(i32::from_le_bytes(raw))
}
