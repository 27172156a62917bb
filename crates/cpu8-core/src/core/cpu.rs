//! CPU execution engine.
//!
//! The engine owns its memory, registers and flags; a tick is one full
//! fetch-decode-execute cycle. The ISA defines runtime faults away: every
//! address wraps around memory, every arithmetic result truncates to 8
//! bits, and unknown opcode bytes decode as HLT.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::math::{self, validate};
use super::opcodes::OpCode;
use super::registers::{Flags, Registers};
use super::types::{CpuAddr, CpuByte};
use crate::errors::{CResult, ProgramTooLarge};
use crate::peripherals::memory::Memory;
use crate::peripherals::screen::Screen;
use crate::trace_exec;

/// Default tick count between progress reports.
pub const DEFAULT_REPORT_INTERVAL: u64 = 1_000_000;

/// Tracefile handle.
#[derive(Debug)]
pub enum TraceHandle {
    /// File.
    File(File),
    /// Stdout.
    Stdout,
}

/// CPU-8 processor.
pub struct Cpu {
    /// Memory.
    pub memory: Memory,
    /// Registers.
    pub registers: Registers,
    /// Flags.
    pub flags: Flags,
    /// Executed instruction count.
    pub ticks: u64,
    /// Optional memory-mapped screen.
    pub screen: Option<Screen>,

    stop: Arc<AtomicBool>,
    trace: Option<TraceHandle>,
}

impl Cpu {
    /// Create a new CPU.
    ///
    /// The memory size is clamped to [4, 64] KB and rounded up to the next
    /// power of two. Registers, flags and the tick counter start at zero.
    ///
    /// # Arguments
    ///
    /// * `ram_kb` - Memory size in KB.
    /// * `screen` - Optional screen fed from the tail of memory.
    ///
    /// # Returns
    ///
    /// * CPU instance.
    ///
    pub fn new(ram_kb: usize, screen: Option<Screen>) -> Self {
        Cpu {
            memory: Memory::new(ram_kb),
            registers: Registers::new(),
            flags: Flags::BLANK,
            ticks: 0,
            screen,
            stop: Arc::new(AtomicBool::new(false)),
            trace: None,
        }
    }

    /// Enable per-instruction tracing.
    ///
    /// # Arguments
    ///
    /// * `tracefile` - Output path, `-` for stdout.
    ///
    /// # Returns
    ///
    /// * Result.
    ///
    pub fn set_tracefile(&mut self, tracefile: &str) -> CResult {
        self.trace = if tracefile == "-" {
            Some(TraceHandle::Stdout)
        } else {
            Some(TraceHandle::File(
                OpenOptions::new().write(true).create(true).open(tracefile)?,
            ))
        };

        Ok(())
    }

    /// Stop handle, settable from another thread or a signal handler.
    ///
    /// `run` observes it between ticks, emits a final state report and
    /// returns normally.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// True when the halt flag is set.
    pub fn halted(&self) -> bool {
        self.flags.halt
    }

    /// Copy a byte stream into memory starting at an offset.
    ///
    /// # Arguments
    ///
    /// * `data` - Data (bytes).
    /// * `offset` - Start offset.
    ///
    /// # Returns
    ///
    /// * Load result.
    ///
    pub fn load_data(&mut self, data: &[CpuByte], offset: usize) -> Result<(), ProgramTooLarge> {
        debug!("loading {} bytes at offset {}", data.len(), offset);
        self.memory.load(data, offset)
    }

    /// Execute one instruction.
    ///
    /// No-op when halted. Otherwise: fetch the opcode byte, fetch its
    /// declared operand bytes, apply the transition, bump the tick counter,
    /// then hand the framebuffer to the screen. The screen call is
    /// unconditional so a program's render cadence does not depend on its
    /// tick count; the screen throttles itself.
    pub fn tick(&mut self) {
        if self.halted() {
            return;
        }

        // Fetch and decode.
        let pc = self.registers.pc;
        let opcode = OpCode::from_byte(self.fetch());

        // Fetch operands.
        let count = opcode.operand_bytes();
        let mut data = [0; 2];
        for slot in data.iter_mut().take(count) {
            *slot = self.fetch();
        }

        trace_exec!(
            self.trace,
            "[{:08}] {:04X} - {}",
            self.ticks,
            pc,
            opcode.name()
        );

        // Execute.
        self.execute(opcode, &data[..count]);
        self.ticks += 1;

        // Refresh the memory-mapped screen.
        if let Some(screen) = self.screen.as_mut() {
            screen.draw(self.memory.framebuffer(screen.len()));
        }
    }

    /// Run until halted.
    ///
    /// Logs a state line every `report_interval` ticks and a final state
    /// line on exit. The stop handle is checked between ticks.
    ///
    /// # Arguments
    ///
    /// * `report_interval` - Ticks between progress reports, 0 to disable.
    ///
    pub fn run(&mut self, report_interval: u64) {
        while !self.halted() {
            if self.stop.swap(false, Ordering::Relaxed) {
                info!("execution interrupted");
                break;
            }

            self.tick();

            if report_interval > 0 && self.ticks % report_interval == 0 {
                info!("{}", self);
            }
        }

        info!("final state: {}", self);
    }

    /// Reset memory, registers and flags.
    ///
    /// Keeps the memory size, the screen binding and the tick counter.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.registers.reset();
        self.flags.reset();
    }

    fn fetch(&mut self) -> CpuByte {
        let byte = self.memory.read(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1) & self.memory.addr_mask();
        byte
    }

    fn execute(&mut self, opcode: OpCode, data: &[CpuByte]) {
        use OpCode::*;

        let mask = self.memory.addr_mask();
        let regs = &mut self.registers;
        // Absolute address operand, when declared.
        let addr = if data.len() == 2 {
            math::to_addr(data[0], data[1])
        } else {
            0
        };

        match opcode {
            // Control.
            HLT => self.flags = Flags::HALTED,
            CLR => {
                regs.a = 0;
                regs.x = 0;
                regs.y = 0;
                self.flags = Flags::BLANK;
            }
            NOP => self.flags = Flags::BLANK,

            // Arithmetic: flags are computed before truncation.
            AAX => {
                let (value, flags) = validate(i32::from(regs.a) + i32::from(regs.x));
                regs.a = value;
                self.flags = flags;
            }
            AAY => {
                let (value, flags) = validate(i32::from(regs.a) + i32::from(regs.y));
                regs.a = value;
                self.flags = flags;
            }
            AXY => {
                let (value, flags) = validate(i32::from(regs.x) + i32::from(regs.y));
                regs.x = value;
                self.flags = flags;
            }
            SAX => {
                let (value, flags) = validate(i32::from(regs.a) - i32::from(regs.x));
                regs.a = value;
                self.flags = flags;
            }
            SAY => {
                let (value, flags) = validate(i32::from(regs.a) - i32::from(regs.y));
                regs.a = value;
                self.flags = flags;
            }
            SXY => {
                let (value, flags) = validate(i32::from(regs.x) - i32::from(regs.y));
                regs.x = value;
                self.flags = flags;
            }
            INA => {
                let (value, flags) = validate(i32::from(regs.a) + 1);
                regs.a = value;
                self.flags = flags;
            }
            INX => {
                let (value, flags) = validate(i32::from(regs.x) + 1);
                regs.x = value;
                self.flags = flags;
            }
            INY => {
                let (value, flags) = validate(i32::from(regs.y) + 1);
                regs.y = value;
                self.flags = flags;
            }
            DEA => {
                let (value, flags) = validate(i32::from(regs.a) - 1);
                regs.a = value;
                self.flags = flags;
            }
            DEX => {
                let (value, flags) = validate(i32::from(regs.x) - 1);
                regs.x = value;
                self.flags = flags;
            }
            DEY => {
                let (value, flags) = validate(i32::from(regs.y) - 1);
                regs.y = value;
                self.flags = flags;
            }

            // Bitwise.
            NAX => {
                regs.a &= regs.x;
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            NAY => {
                regs.a &= regs.y;
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            NXY => {
                regs.x &= regs.y;
                self.flags = Flags::from_result(i32::from(regs.x));
            }
            OAX => {
                regs.a |= regs.x;
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            OAY => {
                regs.a |= regs.y;
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            OXY => {
                regs.x |= regs.y;
                self.flags = Flags::from_result(i32::from(regs.x));
            }
            XAX => {
                regs.a ^= regs.x;
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            XAY => {
                regs.a ^= regs.y;
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            XXY => {
                regs.x ^= regs.y;
                self.flags = Flags::from_result(i32::from(regs.x));
            }
            BLA => {
                let (value, flags) = validate(i32::from(regs.a) << 1);
                regs.a = value;
                self.flags = flags;
            }
            BLX => {
                let (value, flags) = validate(i32::from(regs.x) << 1);
                regs.x = value;
                self.flags = flags;
            }
            BLY => {
                let (value, flags) = validate(i32::from(regs.y) << 1);
                regs.y = value;
                self.flags = flags;
            }
            BRA => {
                regs.a >>= 1;
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            BRX => {
                regs.x >>= 1;
                self.flags = Flags::from_result(i32::from(regs.x));
            }
            BRY => {
                regs.y >>= 1;
                self.flags = Flags::from_result(i32::from(regs.y));
            }

            // Equality.
            EAX => {
                self.flags = if regs.a == regs.x { Flags::ZERO } else { Flags::BLANK };
            }
            EAY => {
                self.flags = if regs.a == regs.y { Flags::ZERO } else { Flags::BLANK };
            }
            EXY => {
                self.flags = if regs.x == regs.y { Flags::ZERO } else { Flags::BLANK };
            }

            // Absolute jumps. Every branch clears all flags, taken or not;
            // the address operand is consumed from the stream either way.
            JMP => {
                regs.pc = addr & mask;
                self.flags = Flags::BLANK;
            }
            JNZ => {
                if !self.flags.zero {
                    regs.pc = addr & mask;
                }
                self.flags = Flags::BLANK;
            }
            JMZ => {
                if self.flags.zero {
                    regs.pc = addr & mask;
                }
                self.flags = Flags::BLANK;
            }
            JNN => {
                if !self.flags.negative {
                    regs.pc = addr & mask;
                }
                self.flags = Flags::BLANK;
            }
            JMN => {
                if self.flags.negative {
                    regs.pc = addr & mask;
                }
                self.flags = Flags::BLANK;
            }
            JNO => {
                if !self.flags.overflow {
                    regs.pc = addr & mask;
                }
                self.flags = Flags::BLANK;
            }
            JMO => {
                if self.flags.overflow {
                    regs.pc = addr & mask;
                }
                self.flags = Flags::BLANK;
            }

            // Relative jumps.
            JFA => {
                regs.pc = regs.pc.wrapping_add(CpuAddr::from(regs.a)) & mask;
                self.flags = Flags::BLANK;
            }
            JFX => {
                regs.pc = regs.pc.wrapping_add(CpuAddr::from(regs.x)) & mask;
                self.flags = Flags::BLANK;
            }
            JFY => {
                regs.pc = regs.pc.wrapping_add(CpuAddr::from(regs.y)) & mask;
                self.flags = Flags::BLANK;
            }
            JBA => {
                regs.pc = regs.pc.wrapping_sub(CpuAddr::from(regs.a)) & mask;
                self.flags = Flags::BLANK;
            }
            JBX => {
                regs.pc = regs.pc.wrapping_sub(CpuAddr::from(regs.x)) & mask;
                self.flags = Flags::BLANK;
            }
            JBY => {
                regs.pc = regs.pc.wrapping_sub(CpuAddr::from(regs.y)) & mask;
                self.flags = Flags::BLANK;
            }

            // PC manipulation. WPC stores the address of the next
            // instruction, so WPC followed later by RPC acts as a
            // call/return pair.
            JAD => {
                regs.pc = self.memory.read_word(addr) & mask;
                self.flags = Flags::BLANK;
            }
            WPC => {
                self.memory.write_word(addr, regs.pc);
                self.flags = Flags::BLANK;
            }
            RPC => {
                regs.pc = self.memory.read_word(addr) & mask;
                self.flags = Flags::BLANK;
            }

            // Immediate loads.
            LDA => {
                regs.a = data[0];
                self.flags = Flags::BLANK;
            }
            LDX => {
                regs.x = data[0];
                self.flags = Flags::BLANK;
            }
            LDY => {
                regs.y = data[0];
                self.flags = Flags::BLANK;
            }

            // Register copies: flags follow the destination value.
            CAX => {
                regs.x = regs.a;
                self.flags = Flags::from_result(i32::from(regs.x));
            }
            CAY => {
                regs.y = regs.a;
                self.flags = Flags::from_result(i32::from(regs.y));
            }
            CXY => {
                regs.y = regs.x;
                self.flags = Flags::from_result(i32::from(regs.y));
            }
            CYX => {
                regs.x = regs.y;
                self.flags = Flags::from_result(i32::from(regs.x));
            }
            CXA => {
                regs.a = regs.x;
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            CYA => {
                regs.a = regs.y;
                self.flags = Flags::from_result(i32::from(regs.a));
            }

            // Conditional immediate loads: both paths clear the flags.
            CAZ => {
                if self.flags.zero {
                    regs.a = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NAZ => {
                if !self.flags.zero {
                    regs.a = data[0];
                }
                self.flags = Flags::BLANK;
            }
            CAO => {
                if self.flags.overflow {
                    regs.a = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NAO => {
                if !self.flags.overflow {
                    regs.a = data[0];
                }
                self.flags = Flags::BLANK;
            }
            CAN => {
                if self.flags.negative {
                    regs.a = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NAN => {
                if !self.flags.negative {
                    regs.a = data[0];
                }
                self.flags = Flags::BLANK;
            }
            CXZ => {
                if self.flags.zero {
                    regs.x = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NXZ => {
                if !self.flags.zero {
                    regs.x = data[0];
                }
                self.flags = Flags::BLANK;
            }
            CXO => {
                if self.flags.overflow {
                    regs.x = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NXO => {
                if !self.flags.overflow {
                    regs.x = data[0];
                }
                self.flags = Flags::BLANK;
            }
            CXN => {
                if self.flags.negative {
                    regs.x = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NXN => {
                if !self.flags.negative {
                    regs.x = data[0];
                }
                self.flags = Flags::BLANK;
            }
            CYZ => {
                if self.flags.zero {
                    regs.y = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NYZ => {
                if !self.flags.zero {
                    regs.y = data[0];
                }
                self.flags = Flags::BLANK;
            }
            CYO => {
                if self.flags.overflow {
                    regs.y = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NYO => {
                if !self.flags.overflow {
                    regs.y = data[0];
                }
                self.flags = Flags::BLANK;
            }
            CYN => {
                if self.flags.negative {
                    regs.y = data[0];
                }
                self.flags = Flags::BLANK;
            }
            NYN => {
                if !self.flags.negative {
                    regs.y = data[0];
                }
                self.flags = Flags::BLANK;
            }

            // Absolute memory access.
            WMA => {
                self.memory.write(addr, regs.a);
                self.flags = Flags::BLANK;
            }
            WMX => {
                self.memory.write(addr, regs.x);
                self.flags = Flags::BLANK;
            }
            WMY => {
                self.memory.write(addr, regs.y);
                self.flags = Flags::BLANK;
            }
            RMA => {
                regs.a = self.memory.read(addr);
                self.flags = Flags::BLANK;
            }
            RMX => {
                regs.x = self.memory.read(addr);
                self.flags = Flags::BLANK;
            }
            RMY => {
                regs.y = self.memory.read(addr);
                self.flags = Flags::BLANK;
            }

            // Indexed and offset memory access.
            RMI => {
                let location = math::to_addr(regs.y, regs.x);
                regs.a = self.memory.read(location);
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            WMI => {
                let location = math::to_addr(regs.y, regs.x);
                self.memory.write(location, regs.a);
                self.flags = Flags::BLANK;
            }
            RMO => {
                let location = addr.wrapping_add(CpuAddr::from(regs.x));
                regs.a = self.memory.read(location);
                self.flags = Flags::from_result(i32::from(regs.a));
            }
            WMO => {
                let location = addr.wrapping_add(CpuAddr::from(regs.x));
                self.memory.write(location, regs.a);
                self.flags = Flags::BLANK;
            }

            // Block operations: addresses wrap per byte.
            FIL => {
                let base = math::to_addr(regs.y, regs.x);
                for i in 0..CpuAddr::from(regs.a) {
                    self.memory.write(base.wrapping_add(i), data[0]);
                }
                self.flags = Flags::BLANK;
            }
            CMP => {
                let src = math::to_addr(regs.y, regs.x);
                let mut equal = true;
                for i in 0..CpuAddr::from(regs.a) {
                    if self.memory.read(src.wrapping_add(i))
                        != self.memory.read(addr.wrapping_add(i))
                    {
                        equal = false;
                        break;
                    }
                }
                self.flags = if equal { Flags::ZERO } else { Flags::BLANK };
            }
            CPY => {
                let src = math::to_addr(regs.y, regs.x);
                for i in 0..CpuAddr::from(regs.a) {
                    let byte = self.memory.read(src.wrapping_add(i));
                    self.memory.write(addr.wrapping_add(i), byte);
                }
                self.flags = Flags::BLANK;
            }
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(crate::peripherals::memory::MAX_MEMORY_KB, None)
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ticks: {} Registers: {} Flags: {}",
            self.ticks, self.registers, self.flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_memory_halts() {
        let mut cpu = Cpu::new(4, None);
        cpu.tick();
        assert!(cpu.halted());
        assert_eq!(cpu.ticks, 1);
    }

    #[test]
    fn test_tick_is_noop_when_halted() {
        let mut cpu = Cpu::new(4, None);
        cpu.tick();
        cpu.tick();
        assert_eq!(cpu.ticks, 1);
        assert_eq!(cpu.registers.pc, 1);
    }

    #[test]
    fn test_unknown_opcode_decodes_as_hlt() {
        let mut cpu = Cpu::new(4, None);
        cpu.load_data(&[200], 0).unwrap();
        cpu.tick();
        assert!(cpu.halted());
    }

    #[test]
    fn test_fetch_wraps_around_memory() {
        let mut cpu = Cpu::new(4, None);
        cpu.load_data(&[OpCode::NOP.as_byte()], 4095).unwrap();
        cpu.registers.pc = 4095;
        cpu.tick();
        assert_eq!(cpu.registers.pc, 0);
    }

    #[test]
    fn test_reset_keeps_ticks() {
        let mut cpu = Cpu::new(4, None);
        cpu.load_data(&[OpCode::NOP.as_byte(), OpCode::HLT.as_byte()], 0)
            .unwrap();
        cpu.run(0);
        assert_eq!(cpu.ticks, 2);
        assert!(cpu.halted());

        cpu.reset();
        assert!(!cpu.halted());
        assert_eq!(cpu.ticks, 2);
        assert_eq!(cpu.registers.pc, 0);
        assert_eq!(cpu.memory.read(0), 0);
    }

    #[test]
    fn test_stop_handle_interrupts_run() {
        let mut cpu = Cpu::new(4, None);
        // JMP 0: loops forever.
        cpu.load_data(&[OpCode::JMP.as_byte(), 0, 0], 0).unwrap();
        cpu.stop_handle().store(true, std::sync::atomic::Ordering::Relaxed);
        cpu.run(0);
        assert!(!cpu.halted());
        assert_eq!(cpu.ticks, 0);
    }
}
