//! Disassembler.
//!
//! Turns a byte stream back into assembly text. The plain form uses only
//! absolute argument syntax (`$HHHH` addresses, decimal bytes), so
//! recompiling it reproduces the original byte stream exactly. The listing
//! form adds addresses and opcode descriptions for human consumption.

use super::math::to_addr;
use super::opcodes::OpCode;
use super::types::CpuByte;

/// Disassemble a byte stream into one source line per instruction.
///
/// A stream that ends in the middle of an instruction's operands is read
/// as if the missing bytes were zero, which is what the engine would fetch
/// from zeroed memory.
///
/// # Arguments
///
/// * `data` - Byte stream.
///
/// # Returns
///
/// * Source lines.
///
pub fn disassemble(data: &[CpuByte]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut ptr = 0;

    while ptr < data.len() {
        let (line, size) = disassemble_at(data, ptr);
        lines.push(line);
        ptr += size;
    }

    lines
}

/// Disassemble a byte stream into an addressed listing with descriptions.
///
/// Trailing zero bytes are trimmed: a zeroed tail would otherwise render
/// as an endless column of HLT lines.
///
/// # Arguments
///
/// * `data` - Byte stream.
///
/// # Returns
///
/// * Listing lines.
///
pub fn disassemble_listing(data: &[CpuByte]) -> Vec<String> {
    let end = data
        .iter()
        .rposition(|&byte| byte != 0)
        .map(|pos| pos + 1)
        .unwrap_or(0);

    let mut lines = Vec::new();
    let mut ptr = 0;

    while ptr < end {
        let opcode = OpCode::from_byte(data[ptr]);
        let (line, size) = disassemble_at(data, ptr);
        lines.push(format!(
            "{:04X}| {:<12} ; {}",
            ptr,
            line,
            opcode.description()
        ));
        ptr += size;
    }

    lines
}

/// Disassemble one instruction, returning its text and byte size.
pub fn disassemble_at(data: &[CpuByte], ptr: usize) -> (String, usize) {
    let opcode = OpCode::from_byte(data[ptr]);
    let operand = |offset: usize| data.get(ptr + offset).copied().unwrap_or(0);

    let line = match opcode.operand_bytes() {
        2 => format!(
            "{} ${:04X}",
            opcode.name(),
            to_addr(operand(1), operand(2))
        ),
        1 => format!("{} {}", opcode.name(), operand(1)),
        _ => opcode.name().to_owned(),
    };

    (line, 1 + opcode.operand_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble() {
        let data = vec![
            OpCode::LDA.as_byte(),
            100,
            OpCode::JMP.as_byte(),
            0x01,
            0x00,
            OpCode::HLT.as_byte(),
        ];
        assert_eq!(disassemble(&data), vec!["LDA 100", "JMP $0100", "HLT"]);
    }

    #[test]
    fn test_unknown_bytes_render_as_hlt() {
        assert_eq!(disassemble(&[200]), vec!["HLT"]);
    }

    #[test]
    fn test_truncated_operand_reads_as_zero() {
        assert_eq!(disassemble(&[OpCode::LDA.as_byte()]), vec!["LDA 0"]);
    }

    #[test]
    fn test_listing_trims_trailing_zeros() {
        let data = vec![OpCode::NOP.as_byte(), OpCode::HLT.as_byte(), 0, 0, 0];
        let listing = disassemble_listing(&data);
        assert_eq!(listing.len(), 1);
        assert!(listing[0].starts_with("0000| NOP"));
    }
}
