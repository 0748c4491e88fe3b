//! Bytecode listing.
//!
//! Produces one line per instruction:
//!
//! ```text
//! 0000:   PUSH 5
//! 0005:   CALL 11
//! 0010:   HALT
//! 0011: > DUP
//! ```
//!
//! Offsets targeted by a `JMP`, `JZ`, `JNZ` or `CALL` are marked with `>`.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Decoded, OperandKind, decode};
use crate::virtual_machine::program::Program;
use std::collections::BTreeSet;
use std::fmt::Write;

/// Decodes the whole program, failing on the first illegal or truncated instruction.
pub fn decode_all(program: &Program) -> Result<Vec<(usize, Decoded)>, VMError> {
    let code = program.as_slice();
    let mut out = Vec::new();
    let mut pc = 0;

    while pc < code.len() {
        let decoded = decode(code, pc)?;
        out.push((pc, decoded));
        pc += decoded.size();
    }

    Ok(out)
}

fn collect_jump_targets(listing: &[(usize, Decoded)]) -> BTreeSet<i64> {
    listing
        .iter()
        .filter(|(_, d)| d.instruction.operand() == Some(OperandKind::Addr))
        .filter_map(|(_, d)| d.operand.map(i64::from))
        .collect()
}

/// Renders a program as an `offset: MNEMONIC [operand]` listing.
pub fn disassemble(program: &Program) -> Result<String, VMError> {
    let listing = decode_all(program)?;
    let targets = collect_jump_targets(&listing);
    let mut out = String::new();

    for (offset, decoded) in &listing {
        let marker = if targets.contains(&(*offset as i64)) {
            '>'
        } else {
            ' '
        };
        let _ = write!(out, "{offset:04}: {marker} {}", decoded.instruction.mnemonic());
        if let Some(operand) = decoded.operand {
            let _ = write!(out, " {operand}");
        }
        out.push('\n');
    }

    Ok(out)
}
