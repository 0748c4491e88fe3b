//! Test utilities shared by the assembler, disassembler and VM suites.
