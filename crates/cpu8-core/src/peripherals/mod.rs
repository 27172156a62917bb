//! Peripherals.

pub mod memory;
pub mod program;
pub mod screen;
