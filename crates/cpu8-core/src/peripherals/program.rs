//! Compiled program container.
//!
//! A program is a flat opcode byte stream; this wrapper only adds file
//! round-trips and the hex text form used by the CLI.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

use crate::core::types::CpuByte;
use crate::errors::CResult;

/// Compiled program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program(Vec<CpuByte>);

impl Program {
    /// Wrap a byte stream.
    pub fn new(data: Vec<CpuByte>) -> Self {
        Program(data)
    }

    /// Load a program from a binary file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path.
    ///
    /// # Returns
    ///
    /// * Program result.
    ///
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> CResult<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        debug!("read {} program bytes from {:?}", contents.len(), path.as_ref());
        Ok(Program(contents))
    }

    /// Save the program to a binary file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path.
    ///
    /// # Returns
    ///
    /// * Save result.
    ///
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> CResult {
        let mut file = File::create(path.as_ref())?;
        file.write_all(&self.0)?;

        debug!("wrote {} program bytes to {:?}", self.0.len(), path.as_ref());
        Ok(())
    }

    /// Save the program as hex text.
    pub fn save_hex_to_path<P: AsRef<Path>>(&self, path: P) -> CResult {
        let mut file = File::create(path.as_ref())?;
        writeln!(file, "{}", self.to_hex())?;
        Ok(())
    }

    /// Hex text form, 16 bytes per line.
    pub fn to_hex(&self) -> String {
        self.0
            .chunks(16)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|byte| format!("{:02X}", byte))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Program bytes.
    pub fn data(&self) -> &[CpuByte] {
        &self.0
    }

    /// Program length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the program holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
