//! Assembly language parser and two-pass bytecode assembler.
//!
//! Converts human-readable assembly source into a flat [`Program`].
//!
//! # Syntax
//!
//! ```text
//! [label:] [MNEMONIC [operand]]  ; optional comment
//! ```
//!
//! - Mnemonics are uppercase and case-sensitive (e.g., `PUSH`, `JNZ`)
//! - Operands are signed decimal integers (e.g., `42`, `-1`) or label names
//! - Labels are letters, digits and `_`, not starting with a digit
//! - A label may share its line with an instruction (`loop: DUP`)
//! - Comments start with `;` (or `#`) and run to end of line
//!
//! # Passes
//!
//! 1. [`collect_labels`] walks the lines, sizing each instruction with
//!    [`Instruction::size`], and records every label's byte offset.
//! 2. [`emit_code`] walks the same lines again and encodes each instruction,
//!    resolving label operands through the table from pass 1.
//!
//! Both forward and backward label references are legal. Any error aborts
//! the whole assembly; there is no partial output.

use crate::virtual_machine::errors::AsmError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::Program;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHARS: [char; 2] = [';', '#'];
const LABEL_SUFFIX: char = ':';

/// Formats a compiler-style diagnostic for an assembly failure.
///
/// ```text
/// error: undefined label `nowhere`
///  --> prog.asm:1:5
///      |
///    1 | JMP nowhere
///      |     ^
/// ```
pub fn render_diagnostic(file: &str, source: &str, err: &AsmError) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {err}");

    let Some((line, column)) = err.location() else {
        return diag;
    };
    let _ = writeln!(diag, " --> {file}:{line}:{column}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let number = line.to_string();
        let width = number.len().max(4);
        let gutter = " ".repeat(width);
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "{gutter} |");
        let _ = writeln!(diag, "{number:>width$} | {line_text}");
        let _ = writeln!(diag, "{gutter} | {underline}^");
    }

    diag
}

/// Label definitions collected by pass 1.
///
/// Maps each label to the byte offset of the instruction that follows it.
/// The table only lives for one assembly run.
#[derive(Debug, Default)]
pub struct SymbolTable {
    labels: HashMap<String, Symbol>,
    /// Total encoded size of the program, used to size the pass 2 buffer.
    code_len: usize,
}

#[derive(Debug, Clone, Copy)]
struct Symbol {
    offset: usize,
    /// Line of the definition, for duplicate-label diagnostics.
    line: usize,
}

impl SymbolTable {
    /// Registers a label at the given bytecode offset.
    fn define_label(&mut self, label: Token, line: usize, offset: usize) -> Result<(), AsmError> {
        if let Some(first) = self.labels.get(label.text) {
            return Err(AsmError::DuplicateLabel {
                label: label.text.to_string(),
                line,
                column: label.column,
                first_line: first.line,
            });
        }
        self.labels
            .insert(label.text.to_string(), Symbol { offset, line });
        Ok(())
    }

    /// Resolves a label operand to its bytecode offset.
    fn resolve_label(&self, label: &Token, line: usize) -> Result<usize, AsmError> {
        self.get(label.text).ok_or_else(|| AsmError::UndefinedLabel {
            label: label.text.to_string(),
            line,
            column: label.column,
        })
    }

    /// Returns the offset of `name`, if defined.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.labels.get(name).map(|symbol| symbol.offset)
    }

    /// Number of labels defined.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if no labels were defined.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Total bytecode length computed by pass 1.
    pub fn code_len(&self) -> usize {
        self.code_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column of the first character, counted in chars.
    column: usize,
}

/// One source line split into its optional label, mnemonic and operands.
#[derive(Debug)]
struct SourceLine<'a> {
    /// 1-based line number.
    number: usize,
    label: Option<Token<'a>>,
    mnemonic: Option<Token<'a>>,
    operands: Vec<Token<'a>>,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `;` or `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let code = match line.find(COMMENT_CHARS) {
        Some(end) => &line[..end],
        None => line,
    };

    let mut out = Vec::with_capacity(3);
    // (byte offset, 1-based char column) of the token being scanned
    let mut start: Option<(usize, usize)> = None;

    for (col, (i, c)) in code.char_indices().enumerate() {
        if c.is_whitespace() || c == ',' {
            if let Some((s, column)) = start.take() {
                out.push(Token {
                    text: &code[s..i],
                    column,
                });
            }
        } else if start.is_none() {
            start = Some((i, col + 1));
        }
    }

    if let Some((s, column)) = start {
        out.push(Token {
            text: &code[s..],
            column,
        });
    }

    out
}

/// Checks that `name` is a valid label identifier.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Splits a line into label, mnemonic and operands.
fn parse_line(number: usize, raw: &str) -> Result<SourceLine<'_>, AsmError> {
    let mut tokens = tokenize(raw).into_iter();
    let mut label = None;
    let mut mnemonic = None;

    if let Some(first) = tokens.next() {
        match first.text.split_once(LABEL_SUFFIX) {
            Some((name, rest)) => {
                if !is_identifier(name) {
                    return Err(AsmError::MalformedLabel {
                        label: name.to_string(),
                        line: number,
                        column: first.column,
                    });
                }
                label = Some(Token {
                    text: name,
                    column: first.column,
                });
                // `loop:DUP` written without a space
                if !rest.is_empty() {
                    mnemonic = Some(Token {
                        text: rest,
                        column: first.column + name.chars().count() + 1,
                    });
                }
            }
            None => mnemonic = Some(first),
        }
    }

    if mnemonic.is_none() {
        mnemonic = tokens.next();
    }

    Ok(SourceLine {
        number,
        label,
        mnemonic,
        operands: tokens.collect(),
    })
}

fn instruction_from_token(token: &Token, line: usize) -> Result<Instruction, AsmError> {
    Instruction::from_mnemonic(token.text).ok_or_else(|| AsmError::InvalidMnemonic {
        mnemonic: token.text.to_string(),
        line,
        column: token.column,
    })
}

/// Resolves one operand token to its encoded value.
///
/// Integer literals are emitted as-is; identifiers are looked up in `symbols`.
fn resolve_operand(
    instr: Instruction,
    token: &Token,
    symbols: &SymbolTable,
    line: usize,
) -> Result<i32, AsmError> {
    let malformed = |reason: String| AsmError::MalformedOperand {
        instruction: instr.mnemonic(),
        reason,
        line,
        column: token.column,
    };
    let text = token.text;

    if text.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return text
            .parse::<i32>()
            .map_err(|e| malformed(format!("invalid integer literal `{text}`: {e}")));
    }

    if !is_identifier(text) {
        return Err(malformed(format!(
            "expected an integer literal or label, found `{text}`"
        )));
    }

    let offset = symbols.resolve_label(token, line)?;
    i32::try_from(offset)
        .map_err(|_| malformed(format!("label `{text}` offset {offset} does not fit in 32 bits")))
}

/// Checks operand arity and resolves the operand, if the instruction takes one.
fn parse_operand(
    instr: Instruction,
    line: &SourceLine,
    mnemonic: &Token,
    symbols: &SymbolTable,
) -> Result<Option<i32>, AsmError> {
    let malformed = |column: usize, reason: String| AsmError::MalformedOperand {
        instruction: instr.mnemonic(),
        reason,
        line: line.number,
        column,
    };

    match (instr.operand(), line.operands.as_slice()) {
        (None, []) => Ok(None),
        (None, [extra, ..]) => Err(malformed(
            extra.column,
            format!("takes no operand, found `{}`", extra.text),
        )),
        (Some(_), []) => Err(malformed(
            mnemonic.column + mnemonic.text.chars().count(),
            "missing operand".to_string(),
        )),
        (Some(_), [token]) => resolve_operand(instr, token, symbols, line.number).map(Some),
        (Some(_), [_, extra, ..]) => Err(malformed(
            extra.column,
            format!("expects one operand, found extra `{}`", extra.text),
        )),
    }
}

/// Pass 1: records every label's byte offset and the total program size.
///
/// Instructions are sized, not encoded. Fails on duplicate or malformed
/// labels and on unknown mnemonics.
pub fn collect_labels<S: AsRef<str>>(lines: &[S]) -> Result<SymbolTable, AsmError> {
    let mut symbols = SymbolTable::default();
    let mut offset = 0usize;

    for (idx, raw) in lines.iter().enumerate() {
        let line = parse_line(idx + 1, raw.as_ref())?;

        if let Some(label) = line.label {
            symbols.define_label(label, line.number, offset)?;
        }

        if let Some(mnemonic) = &line.mnemonic {
            offset += instruction_from_token(mnemonic, line.number)?.size();
        }
    }

    symbols.code_len = offset;
    Ok(symbols)
}

/// Pass 2: encodes every instruction, resolving label operands via `symbols`.
pub fn emit_code<S: AsRef<str>>(lines: &[S], symbols: &SymbolTable) -> Result<Program, AsmError> {
    let mut code = Vec::with_capacity(symbols.code_len());

    for (idx, raw) in lines.iter().enumerate() {
        let line = parse_line(idx + 1, raw.as_ref())?;
        let Some(mnemonic) = &line.mnemonic else {
            continue;
        };

        let instr = instruction_from_token(mnemonic, line.number)?;
        let operand = parse_operand(instr, &line, mnemonic, symbols)?;
        instr.encode(operand.unwrap_or_default(), &mut code);
    }

    debug_assert_eq!(code.len(), symbols.code_len());
    Ok(Program::from_bytes(code))
}

/// Assembles a sequence of source lines.
pub fn assemble_lines<S: AsRef<str>>(lines: &[S]) -> Result<Program, AsmError> {
    let symbols = collect_labels(lines)?;
    emit_code(lines, &symbols)
}

/// Assembles a full source string into bytecode.
pub fn assemble_source(source: &str) -> Result<Program, AsmError> {
    let lines: Vec<&str> = source.lines().collect();
    assemble_lines(&lines)
}

/// Writes the diagnostic to stderr as is, so every line keeps its gutter.
fn log_assembly_error(file: &str, source: &str, err: &AsmError) {
    if cfg!(not(test)) {
        eprint!("{}", render_diagnostic(file, source, err));
    }
}

/// Convenience: assemble directly from file path.
///
/// Logs a compiler-style diagnostic on failure.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, AsmError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| AsmError::Io {
        path: path_ref.display().to_string(),
        reason: e.to_string(),
    })?;

    let result = assemble_source(&source);
    if let Err(err) = &result {
        log_assembly_error(&path_ref.display().to_string(), &source, err);
    }
    result
}
