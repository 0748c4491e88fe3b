use stackvm_derive::Error;

/// Errors raised while assembling source text.
///
/// Source-level variants carry the 1-based line and column of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    /// Label defined more than once.
    #[error("duplicate label `{label}` (first defined on line {first_line})")]
    DuplicateLabel {
        label: String,
        line: usize,
        column: usize,
        first_line: usize,
    },
    /// Operand names a label that is never defined.
    #[error("undefined label `{label}`")]
    UndefinedLabel {
        label: String,
        line: usize,
        column: usize,
    },
    /// Unrecognized instruction mnemonic.
    #[error("unknown instruction `{mnemonic}`")]
    InvalidMnemonic {
        mnemonic: String,
        line: usize,
        column: usize,
    },
    /// Missing, extra, or unparsable operand.
    #[error("{instruction}: {reason}")]
    MalformedOperand {
        instruction: &'static str,
        reason: String,
        line: usize,
        column: usize,
    },
    /// Label definition whose name is not an identifier.
    #[error("malformed label `{label}`: labels are letters, digits and `_`, not starting with a digit")]
    MalformedLabel {
        label: String,
        line: usize,
        column: usize,
    },
    /// Source file could not be read.
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },
}

impl AsmError {
    /// Returns the `(line, column)` of the offending token, if the error has one.
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            AsmError::DuplicateLabel { line, column, .. }
            | AsmError::UndefinedLabel { line, column, .. }
            | AsmError::InvalidMnemonic { line, column, .. }
            | AsmError::MalformedOperand { line, column, .. }
            | AsmError::MalformedLabel { line, column, .. } => Some((*line, *column)),
            AsmError::Io { .. } => None,
        }
    }
}

/// Errors raised while executing bytecode.
///
/// `pc` is always the offset of the instruction that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    /// Push onto a full operand stack.
    #[error("operand stack overflow at pc {pc} (capacity {capacity})")]
    StackOverflow { pc: usize, capacity: usize },
    /// Instruction needs more operand stack values than present.
    #[error("operand stack underflow at pc {pc}: {instruction} needs {needed} value(s), found {available}")]
    StackUnderflow {
        pc: usize,
        instruction: &'static str,
        needed: usize,
        available: usize,
    },
    /// CALL with a full return stack.
    #[error("return stack overflow at pc {pc} (capacity {capacity})")]
    ReturnStackOverflow { pc: usize, capacity: usize },
    /// RET with an empty return stack.
    #[error("return stack underflow at pc {pc}: RET without matching CALL")]
    ReturnStackUnderflow { pc: usize },
    /// DIV with a zero divisor.
    #[error("division by zero at pc {pc}")]
    DivisionByZero { pc: usize },
    /// Unknown opcode byte.
    #[error("illegal opcode 0x{opcode:02x} at pc {pc}")]
    IllegalOpcode { opcode: u8, pc: usize },
    /// LOAD/STORE index outside the memory array.
    #[error("invalid memory address {address} at pc {pc} (valid range 0..{size})")]
    InvalidMemoryAddress { address: i32, pc: usize, size: usize },
    /// Jump, call or return target that is not an instruction boundary.
    #[error("invalid jump target {target} at pc {pc}")]
    InvalidJumpTarget { target: i64, pc: usize },
    /// Operand bytes run past the end of the bytecode.
    #[error("truncated {instruction} at pc {pc}: needs {needed} operand byte(s), {available} available")]
    TruncatedInstruction {
        instruction: &'static str,
        pc: usize,
        needed: usize,
        available: usize,
    },
    /// Caller-imposed instruction budget exhausted.
    #[error("step limit of {limit} instructions reached at pc {pc}")]
    StepLimitExceeded { limit: u64, pc: usize },
    /// Bytecode file could not be read or written.
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },
}

impl VMError {
    /// Returns the offset of the failing instruction, if the error came from execution.
    pub fn pc(&self) -> Option<usize> {
        match self {
            VMError::StackOverflow { pc, .. }
            | VMError::StackUnderflow { pc, .. }
            | VMError::ReturnStackOverflow { pc, .. }
            | VMError::ReturnStackUnderflow { pc }
            | VMError::DivisionByZero { pc }
            | VMError::IllegalOpcode { pc, .. }
            | VMError::InvalidMemoryAddress { pc, .. }
            | VMError::InvalidJumpTarget { pc, .. }
            | VMError::TruncatedInstruction { pc, .. }
            | VMError::StepLimitExceeded { pc, .. } => Some(*pc),
            VMError::Io { .. } => None,
        }
    }
}
