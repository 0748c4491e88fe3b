//! Stack-based bytecode virtual machine.
//!
//! Source text is assembled into a flat bytecode buffer, which the VM then
//! executes deterministically.
//!
//! # Architecture
//!
//! - **Operand stack**: 1024 signed 32-bit integers
//! - **Return stack**: 256 return addresses, separate from the operand stack
//! - **Memory**: 256 signed 32-bit cells, zeroed at start
//! - **Instruction format**: 1-byte opcode, optionally followed by a 4-byte
//!   little-endian operand
//! - **Termination**: `HALT`, running off the end of the code, or the first error
//!
//! # Modules
//!
//! - [`assembler`]: Two-pass assembly, label resolution, and diagnostics
//! - [`disassembler`]: Bytecode listing
//! - [`errors`]: Assembly and execution error types
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`program`]: Bytecode buffer and file persistence
//! - [`vm`]: Core virtual machine implementation

pub mod assembler;
pub mod disassembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod vm;
