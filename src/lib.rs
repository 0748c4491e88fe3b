//! Stack-based bytecode virtual machine.
//!
//! Provides a two-pass assembler, a disassembler, and the VM that executes
//! the resulting bytecode.

pub mod utils;
pub mod virtual_machine;
