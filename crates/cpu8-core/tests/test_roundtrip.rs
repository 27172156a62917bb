//! Compile/disassemble round-trips.

use cpu8_core::core::assembler::Assembler;
use cpu8_core::core::disassembler::disassemble;

/// Absolute-form programs survive compile -> disassemble -> recompile
/// byte-for-byte.
#[test]
fn test_absolute_program_round_trip() {
    let source = "\
LDA 10
WMA $0100
LDX 20
RMO $0100
AAX
JNO $000F
CLR
HLT";
    let first = Assembler::from_string(source).assemble().unwrap();

    let text = disassemble(&first.data).join("\n");
    let second = Assembler::from_string(&text).assemble().unwrap();

    assert_eq!(first.data, second.data);
}

/// Disassembly of every operand form recompiles to the same bytes.
#[test]
fn test_every_operand_arity_round_trips() {
    let source = "NOP\nLDY 255\nCAZ 0\nCMP $FFFF\nFIL 1\nJMP $0000";
    let first = Assembler::from_string(source).assemble().unwrap();

    let text = disassemble(&first.data).join("\n");
    let second = Assembler::from_string(&text).assemble().unwrap();

    assert_eq!(first.data, second.data);
    assert_eq!(text, "NOP\nLDY 255\nCAZ 0\nCMP $FFFF\nFIL 1\nJMP $0000");
}

/// A label-based program recompiles from its absolute disassembly into the
/// same stream, since labels resolve to absolute offsets.
#[test]
fn test_label_program_round_trips_via_absolute_form() {
    let source = ":TOP\nINA\nLDX 5\nEAX\nJMZ OUT\nJMP TOP\n:OUT\nHLT";
    let first = Assembler::from_string(source).assemble().unwrap();

    let text = disassemble(&first.data).join("\n");
    let second = Assembler::from_string(&text).assemble().unwrap();

    assert_eq!(first.data, second.data);
}
