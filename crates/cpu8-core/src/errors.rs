//! Error module.

use std::error::Error;
use std::fmt;

/// Common result.
pub type CResult<T = ()> = Result<T, Box<dyn Error>>;

/// Program too large for memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramTooLarge {
    /// End offset of the program.
    pub end: usize,
    /// Memory size.
    pub size: usize,
}

impl Error for ProgramTooLarge {}

impl fmt::Display for ProgramTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program exceeds memory size: {} > {}", self.end, self.size)
    }
}

/// Invalid memory size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidMemorySize(pub usize);

impl Error for InvalidMemorySize {}

impl fmt::Display for InvalidMemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid memory size: {} bytes (expected a power of two between 4096 and 65536)",
            self.0
        )
    }
}
