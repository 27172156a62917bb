//! Two-pass assembler.
//!
//! Line-oriented source: `;` starts a comment, `:NAME` defines a label
//! alone on its line, everything else is `MNEMONIC [arg [arg]]`. Argument
//! forms: `$HHHH` hex address (two bytes, big-endian), decimal byte,
//! quoted character literal, label or symbol reference, or an integer
//! expression (spaces only inside parentheses). The extended dialect adds
//! `CONST`/`VAR` symbol definitions and `MACRO`/`ENDMACRO` textual macros.
//!
//! Pass 1 assigns a byte offset to every label; pass 2 emits code with all
//! references resolved. Labels resolve to offsets within the compiled
//! stream, so programs are position-dependent unless loaded at offset 0.

mod errors;
mod expr;
mod preprocess;

pub use errors::{AssembleError, AssembleErrorKind};

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use self::preprocess::{is_identifier, preprocess, Line};
use super::math::split_addr;
use super::opcodes::OpCode;
use super::types::{convert_hex_addr, CpuAddr, CpuByte};
use crate::errors::CResult;

/// Compiled output: the byte stream plus the label table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    /// Byte stream.
    pub data: Vec<CpuByte>,
    /// Label table, name to byte offset within the stream.
    pub labels: HashMap<String, CpuAddr>,
}

/// Assembler.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Assembler {
    contents: String,
}

impl Assembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create an assembler from source text.
    pub fn from_string(contents: &str) -> Self {
        Assembler {
            contents: contents.to_owned(),
        }
    }

    /// Create an assembler from a source file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path.
    ///
    /// # Returns
    ///
    /// * Assembler result.
    ///
    pub fn from_path<P: AsRef<Path>>(path: P) -> CResult<Self> {
        let mut file = File::open(path.as_ref())?;

        debug!("reading assembly source from {:?}", path.as_ref());
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Ok(Self::from_string(&contents))
    }

    /// Assemble the source into a byte stream and a label table.
    ///
    /// Never emits partial output: any failure aborts the whole compile.
    ///
    /// # Returns
    ///
    /// * Assembly result.
    ///
    pub fn assemble(&self) -> Result<Assembly, AssembleError> {
        let unit = preprocess(&self.contents)?;
        let labels = first_pass(&unit.lines)?;
        let data = second_pass(&unit.lines, &labels, &unit.symbols)?;

        debug!("assembled {} bytes, {} labels", data.len(), labels.len());
        Ok(Assembly { data, labels })
    }
}

/// An argument token with its 0-based column.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    col: usize,
    text: String,
}

/// Split an instruction line into whitespace-separated tokens, keeping
/// character literals and parenthesized groups intact.
fn split_tokens(line: &str) -> Vec<Arg> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut in_char = false;
    let mut escaped = false;

    for (idx, ch) in line.char_indices() {
        if in_char {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '\'' {
                in_char = false;
            }
            continue;
        }

        match ch {
            '\'' => {
                if current.is_empty() {
                    start = idx;
                }
                current.push(ch);
                in_char = true;
            }
            '(' => {
                if current.is_empty() {
                    start = idx;
                }
                current.push(ch);
                depth += 1;
            }
            ')' => {
                current.push(ch);
                depth = depth.saturating_sub(1);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(Arg {
                        col: start,
                        text: std::mem::take(&mut current),
                    });
                }
            }
            _ => {
                if current.is_empty() {
                    start = idx;
                }
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        tokens.push(Arg {
            col: start,
            text: current,
        });
    }

    tokens
}

fn first_pass(lines: &[Line]) -> Result<HashMap<String, CpuAddr>, AssembleError> {
    let mut labels = HashMap::new();
    let mut cursor: usize = 0;

    for line in lines {
        let tokens = split_tokens(&line.text);
        let first = &tokens[0];

        if let Some(name) = first.text.strip_prefix(':') {
            if tokens.len() > 1 {
                return Err(AssembleError::new(
                    AssembleErrorKind::BadLabel(format!(
                        "`:{}` must be alone on its line",
                        name
                    )),
                    line.number,
                    tokens[1].col + 1,
                ));
            }
            if !is_identifier(name) {
                return Err(AssembleError::new(
                    AssembleErrorKind::BadLabel(format!("invalid label name `{}`", name)),
                    line.number,
                    first.col + 1,
                ));
            }
            if labels.contains_key(name) {
                return Err(AssembleError::new(
                    AssembleErrorKind::DuplicateLabel(name.to_owned()),
                    line.number,
                    first.col + 1,
                ));
            }
            if cursor > CpuAddr::MAX as usize {
                return Err(AssembleError::new(
                    AssembleErrorKind::AddressOutOfRange(cursor as i64),
                    line.number,
                    first.col + 1,
                ));
            }

            labels.insert(name.to_owned(), cursor as CpuAddr);
        } else {
            let opcode = OpCode::from_name(&first.text).ok_or_else(|| {
                AssembleError::new(
                    AssembleErrorKind::UnknownOpcode(first.text.clone()),
                    line.number,
                    first.col + 1,
                )
            })?;
            cursor += 1 + opcode.operand_bytes();
        }
    }

    Ok(labels)
}

fn second_pass(
    lines: &[Line],
    labels: &HashMap<String, CpuAddr>,
    symbols: &HashMap<String, i64>,
) -> Result<Vec<CpuByte>, AssembleError> {
    let mut output = Vec::new();

    for line in lines {
        let tokens = split_tokens(&line.text);
        if tokens[0].text.starts_with(':') {
            continue;
        }

        let opcode = OpCode::from_name(&tokens[0].text).ok_or_else(|| {
            AssembleError::new(
                AssembleErrorKind::UnknownOpcode(tokens[0].text.clone()),
                line.number,
                tokens[0].col + 1,
            )
        })?;

        output.push(opcode.as_byte());

        let expected = opcode.operand_bytes();
        let mut emitted = 0;
        let args = &tokens[1..];

        for (idx, arg) in args.iter().enumerate() {
            let is_last = idx == args.len() - 1;
            let remaining = expected.saturating_sub(emitted);
            emitted += emit_arg(arg, line.number, remaining, is_last, labels, symbols, &mut output)?;
        }

        if emitted != expected {
            return Err(AssembleError::new(
                AssembleErrorKind::WrongOperandCount {
                    mnemonic: opcode.name().to_owned(),
                    expected,
                    found: emitted,
                },
                line.number,
                tokens[0].col + 1,
            ));
        }
    }

    Ok(output)
}

/// Emit one argument, returning the number of bytes it produced.
fn emit_arg(
    arg: &Arg,
    line: usize,
    remaining: usize,
    is_last: bool,
    labels: &HashMap<String, CpuAddr>,
    symbols: &HashMap<String, i64>,
    output: &mut Vec<CpuByte>,
) -> Result<usize, AssembleError> {
    let text = arg.text.as_str();
    let col = arg.col + 1;

    // Hex address: always the full two-byte slot.
    if text.starts_with('$') {
        let addr = convert_hex_addr(text).ok_or_else(|| {
            AssembleError::new(AssembleErrorKind::BadAddress(text.to_owned()), line, col)
        })?;
        let (hi, lo) = split_addr(addr);
        output.push(hi);
        output.push(lo);
        return Ok(2);
    }

    // Character literal: one byte.
    if text.starts_with('\'') {
        let value = expr::parse_char_literal(text)
            .map_err(|kind| AssembleError::new(kind, line, col))?;
        output.push(value);
        return Ok(1);
    }

    // Decimal byte, with an optional leading sign. The sign is accepted by
    // the grammar but any value outside 0..=255 fails the range check.
    let digits = text.strip_prefix('-').unwrap_or(text);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        let value: i64 = text.parse().map_err(|_| {
            AssembleError::new(AssembleErrorKind::BadNumber(text.to_owned()), line, col)
        })?;
        if !(0..=255).contains(&value) {
            return Err(AssembleError::new(
                AssembleErrorKind::ByteOutOfRange(value),
                line,
                col,
            ));
        }
        output.push(value as CpuByte);
        return Ok(1);
    }

    // Label or symbol reference.
    if is_identifier(text) {
        if let Some(&offset) = labels.get(text) {
            let (hi, lo) = split_addr(offset);
            output.push(hi);
            output.push(lo);
            return Ok(2);
        }
        if let Some(&value) = symbols.get(text) {
            return emit_value(value, remaining, is_last, line, col, output);
        }

        return Err(AssembleError::new(
            AssembleErrorKind::UnresolvedSymbol(text.to_owned()),
            line,
            col,
        ));
    }

    // Anything else is an expression.
    let value = expr::evaluate(text, symbols).map_err(|kind| AssembleError::new(kind, line, col))?;
    emit_value(value, remaining, is_last, line, col, output)
}

/// Emit an integer value into the remaining operand slot. A symbol or
/// expression fills the whole two-byte slot when it is the last argument
/// of a two-byte opcode; otherwise it is a single byte.
fn emit_value(
    value: i64,
    remaining: usize,
    is_last: bool,
    line: usize,
    col: usize,
    output: &mut Vec<CpuByte>,
) -> Result<usize, AssembleError> {
    if remaining >= 2 && is_last {
        if !(0..=0xFFFF).contains(&value) {
            return Err(AssembleError::new(
                AssembleErrorKind::AddressOutOfRange(value),
                line,
                col,
            ));
        }
        let (hi, lo) = split_addr(value as CpuAddr);
        output.push(hi);
        output.push(lo);
        Ok(2)
    } else {
        if !(0..=255).contains(&value) {
            return Err(AssembleError::new(
                AssembleErrorKind::ByteOutOfRange(value),
                line,
                col,
            ));
        }
        output.push(value as CpuByte);
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(source: &str) -> Result<Assembly, AssembleError> {
        Assembler::from_string(source).assemble()
    }

    #[test]
    fn test_assemble_simple_program() {
        let assembly = assemble("LDA 100\nLDX 150\nAAX\nHLT").unwrap();
        assert_eq!(
            assembly.data,
            vec![
                OpCode::LDA.as_byte(),
                100,
                OpCode::LDX.as_byte(),
                150,
                OpCode::AAX.as_byte(),
                OpCode::HLT.as_byte(),
            ]
        );
        assert!(assembly.labels.is_empty());
    }

    #[test]
    fn test_mnemonics_are_case_insensitive() {
        let assembly = assemble("lda 1\nHlt").unwrap();
        assert_eq!(
            assembly.data,
            vec![OpCode::LDA.as_byte(), 1, OpCode::HLT.as_byte()]
        );
    }

    #[test]
    fn test_label_resolution() {
        let assembly = assemble(":L\nLDA 1\nJMP L").unwrap();
        assert_eq!(
            assembly.data,
            vec![OpCode::LDA.as_byte(), 1, OpCode::JMP.as_byte(), 0x00, 0x00]
        );
        assert_eq!(assembly.labels["L"], 0);
    }

    #[test]
    fn test_forward_label_reference() {
        let assembly = assemble("JMP END\nNOP\n:END\nHLT").unwrap();
        assert_eq!(
            assembly.data,
            vec![
                OpCode::JMP.as_byte(),
                0x00,
                0x04,
                OpCode::NOP.as_byte(),
                OpCode::HLT.as_byte(),
            ]
        );
        assert_eq!(assembly.labels["END"], 4);
    }

    #[test]
    fn test_hex_and_char_arguments() {
        let assembly = assemble("WMA $01FF\nLDA 'A'\nLDX '\\n'").unwrap();
        assert_eq!(
            assembly.data,
            vec![
                OpCode::WMA.as_byte(),
                0x01,
                0xFF,
                OpCode::LDA.as_byte(),
                65,
                OpCode::LDX.as_byte(),
                10,
            ]
        );
    }

    #[test]
    fn test_two_decimal_bytes_fill_an_address_slot() {
        let assembly = assemble("JMP 1 0").unwrap();
        assert_eq!(assembly.data, vec![OpCode::JMP.as_byte(), 1, 0]);
    }

    #[test]
    fn test_unknown_opcode() {
        let err = assemble("FOO 1").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::UnknownOpcode("FOO".into()));
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_duplicate_label() {
        let err = assemble(":L\nNOP\n:L\nHLT").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::DuplicateLabel("L".into()));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_label_not_alone() {
        let err = assemble(":L HLT").unwrap_err();
        assert!(matches!(err.kind, AssembleErrorKind::BadLabel(_)));
    }

    #[test]
    fn test_bad_address() {
        let err = assemble("JMP $12345").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::BadAddress("$12345".into()));

        let err = assemble("JMP $XY").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::BadAddress("$XY".into()));
    }

    #[test]
    fn test_byte_out_of_range() {
        let err = assemble("LDA 300").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::ByteOutOfRange(300));

        let err = assemble("LDA -1").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::ByteOutOfRange(-1));
    }

    #[test]
    fn test_bad_char() {
        let err = assemble("LDA 'ab'").unwrap_err();
        assert!(matches!(err.kind, AssembleErrorKind::BadChar(_)));
    }

    #[test]
    fn test_wrong_operand_count() {
        let err = assemble("LDA").unwrap_err();
        assert_eq!(
            err.kind,
            AssembleErrorKind::WrongOperandCount {
                mnemonic: "LDA".into(),
                expected: 1,
                found: 0,
            }
        );

        let err = assemble("HLT 1").unwrap_err();
        assert_eq!(
            err.kind,
            AssembleErrorKind::WrongOperandCount {
                mnemonic: "HLT".into(),
                expected: 0,
                found: 1,
            }
        );

        let err = assemble("JMP 1").unwrap_err();
        assert!(matches!(
            err.kind,
            AssembleErrorKind::WrongOperandCount { .. }
        ));
    }

    #[test]
    fn test_bad_expression() {
        let err = assemble("LDA (1+)").unwrap_err();
        assert!(matches!(err.kind, AssembleErrorKind::BadNumber(_)));
    }

    #[test]
    fn test_address_out_of_range() {
        let err = assemble("CONST BIG 70000\nJMP BIG").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::AddressOutOfRange(70000));
    }

    #[test]
    fn test_unresolved_symbol() {
        let err = assemble("JMP NOWHERE").unwrap_err();
        assert_eq!(
            err.kind,
            AssembleErrorKind::UnresolvedSymbol("NOWHERE".into())
        );
    }

    #[test]
    fn test_const_symbols() {
        let assembly = assemble("CONST VALUE 42\nCONST TARGET $0100\nLDA VALUE\nWMA TARGET").unwrap();
        assert_eq!(
            assembly.data,
            vec![
                OpCode::LDA.as_byte(),
                42,
                OpCode::WMA.as_byte(),
                0x01,
                0x00,
            ]
        );
    }

    #[test]
    fn test_expression_arguments() {
        let assembly = assemble("CONST BASE $0100\nLDA 2*3+1\nWMA BASE+2").unwrap();
        assert_eq!(
            assembly.data,
            vec![
                OpCode::LDA.as_byte(),
                7,
                OpCode::WMA.as_byte(),
                0x01,
                0x02,
            ]
        );
    }

    #[test]
    fn test_symbol_out_of_range_for_byte_slot() {
        let err = assemble("CONST BIG 300\nLDA BIG").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::ByteOutOfRange(300));
    }

    #[test]
    fn test_macro_end_to_end() {
        let source = "MACRO STORE VALUE ADDR\nLDA VALUE\nWMA ADDR\nENDMACRO\nSTORE 7 $0200\nHLT";
        let assembly = assemble(source).unwrap();
        assert_eq!(
            assembly.data,
            vec![
                OpCode::LDA.as_byte(),
                7,
                OpCode::WMA.as_byte(),
                0x02,
                0x00,
                OpCode::HLT.as_byte(),
            ]
        );
    }

    #[test]
    fn test_no_partial_output_on_failure() {
        let err = assemble("LDA 1\nFOO").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::UnknownOpcode("FOO".into()));
    }
}
