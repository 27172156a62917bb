//! Math helpers.

use super::registers::Flags;
use super::types::{CpuAddr, CpuByte};

/// Combine two operand bytes into a big-endian 16-bit address.
///
/// # Arguments
///
/// * `hi` - High byte.
/// * `lo` - Low byte.
///
/// # Returns
///
/// * Address.
///
pub fn to_addr(hi: CpuByte, lo: CpuByte) -> CpuAddr {
    (CpuAddr::from(hi) << 8) | CpuAddr::from(lo)
}

/// Split a 16-bit address into big-endian bytes.
pub fn split_addr(addr: CpuAddr) -> (CpuByte, CpuByte) {
    ((addr >> 8) as CpuByte, (addr & 0x00FF) as CpuByte)
}

/// Truncate an intermediate result to 8 bits and compute its flags.
///
/// The flags are computed on the untruncated value, so an addition
/// overflowing 255 reports O while storing the wrapped byte.
///
/// # Arguments
///
/// * `value` - Untruncated result.
///
/// # Returns
///
/// * Truncated byte and flags.
///
pub fn validate(value: i32) -> (CpuByte, Flags) {
    ((value & 0xFF) as CpuByte, Flags::from_result(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_addr() {
        assert_eq!(to_addr(0x01, 0x00), 0x0100);
        assert_eq!(to_addr(0xFF, 0xFF), 0xFFFF);
        assert_eq!(to_addr(0x00, 0x2A), 0x002A);
    }

    #[test]
    fn test_split_addr() {
        assert_eq!(split_addr(0x0100), (0x01, 0x00));
        assert_eq!(split_addr(0xABCD), (0xAB, 0xCD));
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate(250), (250, Flags::BLANK));
        assert_eq!(validate(300), (44, Flags::OVERFLOW));
        assert_eq!(validate(256), (0, Flags::OVERFLOW_ZERO));
        assert_eq!(validate(0), (0, Flags::ZERO));
        assert_eq!(validate(-1), (255, Flags::NEGATIVE));
        assert_eq!(validate(-10), (246, Flags::NEGATIVE));
    }
}
