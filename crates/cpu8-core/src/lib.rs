//! CPU-8 core.
//!
//! An educational 8-bit processor: a fetch-decode-execute engine over a
//! power-of-two memory, an 89-opcode instruction set, a memory-mapped
//! character screen, a two-pass assembler with labels, constants,
//! expressions and macros, a disassembler, and an interactive monitor.

#![warn(missing_docs)]

pub mod core;
pub mod errors;
pub mod monitor;
pub mod peripherals;
