//! Monitor breakpoints.

use crate::core::types::CpuAddr;

/// Breakpoint set.
#[derive(Debug, Default, Clone)]
pub struct Breakpoints(Vec<CpuAddr>);

impl Breakpoints {
    /// Create an empty breakpoint set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a breakpoint address.
    pub fn register(&mut self, addr: CpuAddr) {
        if !self.0.contains(&addr) {
            self.0.push(addr);
        }
    }

    /// Unregister a breakpoint address.
    pub fn unregister(&mut self, addr: CpuAddr) {
        self.0.retain(|&a| a != addr);
    }

    /// Check whether an address has a breakpoint.
    pub fn check(&self, addr: CpuAddr) -> bool {
        self.0.contains(&addr)
    }

    /// Registered addresses.
    pub fn addresses(&self) -> &[CpuAddr] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_check() {
        let mut breakpoints = Breakpoints::new();
        breakpoints.register(0x0100);
        breakpoints.register(0x0100);
        assert!(breakpoints.check(0x0100));
        assert!(!breakpoints.check(0x0101));
        assert_eq!(breakpoints.addresses().len(), 1);

        breakpoints.unregister(0x0100);
        assert!(!breakpoints.check(0x0100));
    }
}
