//! Interactive machine monitor.
//!
//! A readline REPL over a CPU, stepping it one instruction at a time with
//! breakpoints, register inspection, memory dumps and inline disassembly.

mod breakpoints;

pub use breakpoints::Breakpoints;

use rustyline::error::ReadlineError;
use rustyline::Editor;

use crate::core::cpu::Cpu;
use crate::core::disassembler;
use crate::core::types::{convert_hex_addr, CpuAddr};
use crate::errors::CResult;
use crate::peripherals::program::Program;

const HELP: &str = "\
commands:
  step [n], s [n]      execute n instructions (default 1)
  continue, c          run to halt or breakpoint
  regs, r              show registers and flags
  mem ADDR [n], m      dump n bytes of memory (default 64)
  dis ADDR [n], d      disassemble n instructions (default 8)
  break ADDR, b        add a breakpoint
  unbreak ADDR         remove a breakpoint
  breakpoints          list breakpoints
  load FILE [OFFSET]   copy a program file into memory
  reset                reset memory, registers and flags
  help, ?              show this help
  quit, q              leave the monitor";

/// Monitor command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Execute n instructions.
    Step(u64),
    /// Run to halt or breakpoint.
    Continue,
    /// Show registers and flags.
    Regs,
    /// Dump memory at an address.
    Mem(CpuAddr, usize),
    /// Disassemble at an address.
    Dis(CpuAddr, usize),
    /// Add a breakpoint.
    AddBreakpoint(CpuAddr),
    /// Remove a breakpoint.
    RemoveBreakpoint(CpuAddr),
    /// List breakpoints.
    ListBreakpoints,
    /// Load a program file into memory at an offset.
    Load(String, usize),
    /// Reset the CPU.
    Reset,
    /// Show help.
    Help,
    /// Leave the monitor.
    Quit,
    /// Empty input.
    Empty,
}

/// Interactive monitor.
#[derive(Debug, Default)]
pub struct Monitor {
    breakpoints: Breakpoints,
}

impl Monitor {
    /// Create a new monitor.
    pub fn new() -> Self {
        Default::default()
    }

    /// Run the monitor REPL over a CPU.
    ///
    /// Returns on `quit`, Ctrl-C or Ctrl-D.
    ///
    /// # Arguments
    ///
    /// * `cpu` - CPU to drive.
    ///
    /// # Returns
    ///
    /// * Result.
    ///
    pub fn run(&mut self, cpu: &mut Cpu) -> CResult {
        let mut rl = Editor::<()>::new();
        println!("CPU-8 monitor, `help` for commands.");
        println!("{}", cpu);

        loop {
            match rl.readline("cpu8> ") {
                Ok(line) => {
                    rl.add_history_entry(line.as_str());
                    match parse_command(&line) {
                        Ok(Command::Quit) => break,
                        Ok(command) => self.execute(command, cpu),
                        Err(message) => println!("{}", message),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(error) => return Err(Box::new(error)),
            }
        }

        Ok(())
    }

    fn execute(&mut self, command: Command, cpu: &mut Cpu) {
        match command {
            Command::Step(count) => {
                for _ in 0..count {
                    cpu.tick();
                    if cpu.halted() {
                        println!("halted");
                        break;
                    }
                    if self.breakpoints.check(cpu.registers.pc) {
                        println!("breakpoint at {:04X}", cpu.registers.pc);
                        break;
                    }
                }
                println!("{}", cpu);
            }
            Command::Continue => {
                while !cpu.halted() {
                    cpu.tick();
                    if self.breakpoints.check(cpu.registers.pc) {
                        println!("breakpoint at {:04X}", cpu.registers.pc);
                        break;
                    }
                }
                println!("{}", cpu);
            }
            Command::Regs => println!("{}", cpu),
            Command::Mem(addr, count) => {
                for row_start in (0..count).step_by(16) {
                    let row: Vec<String> = (row_start..count.min(row_start + 16))
                        .map(|i| format!("{:02X}", cpu.memory.read(addr.wrapping_add(i as CpuAddr))))
                        .collect();
                    println!("{:04X}| {}", addr.wrapping_add(row_start as CpuAddr), row.join(" "));
                }
            }
            Command::Dis(addr, count) => {
                let data = cpu.memory.as_slice();
                let mut ptr = (addr & cpu.memory.addr_mask()) as usize;
                for _ in 0..count {
                    if ptr >= data.len() {
                        break;
                    }
                    let (line, size) = disassembler::disassemble_at(data, ptr);
                    println!("{:04X}| {}", ptr, line);
                    ptr += size;
                }
            }
            Command::AddBreakpoint(addr) => self.breakpoints.register(addr),
            Command::RemoveBreakpoint(addr) => self.breakpoints.unregister(addr),
            Command::ListBreakpoints => {
                if self.breakpoints.addresses().is_empty() {
                    println!("no breakpoints");
                } else {
                    for addr in self.breakpoints.addresses() {
                        println!("{:04X}", addr);
                    }
                }
            }
            Command::Load(path, offset) => match Program::load_from_path(&path) {
                Ok(program) => {
                    if let Err(error) = cpu.load_data(program.data(), offset) {
                        println!("{}", error);
                    } else {
                        println!("loaded {} bytes at offset {}", program.len(), offset);
                    }
                }
                Err(error) => println!("{}", error),
            },
            Command::Reset => {
                cpu.reset();
                println!("{}", cpu);
            }
            Command::Help => println!("{}", HELP),
            Command::Quit | Command::Empty => {}
        }
    }
}

/// Parse a monitor command line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (first, args) = match parts.split_first() {
        Some((first, args)) => (*first, args),
        None => return Ok(Command::Empty),
    };

    match first {
        "step" | "s" => Ok(Command::Step(parse_count(args.first(), 1)?)),
        "continue" | "c" => Ok(Command::Continue),
        "regs" | "r" => Ok(Command::Regs),
        "mem" | "m" => Ok(Command::Mem(
            parse_addr(args.first())?,
            parse_count(args.get(1), 64)? as usize,
        )),
        "dis" | "d" => Ok(Command::Dis(
            parse_addr(args.first())?,
            parse_count(args.get(1), 8)? as usize,
        )),
        "break" | "b" => Ok(Command::AddBreakpoint(parse_addr(args.first())?)),
        "unbreak" => Ok(Command::RemoveBreakpoint(parse_addr(args.first())?)),
        "breakpoints" => Ok(Command::ListBreakpoints),
        "load" => {
            let path = args
                .first()
                .ok_or_else(|| "missing file path".to_owned())?;
            Ok(Command::Load(
                (*path).to_owned(),
                parse_count(args.get(1), 0)? as usize,
            ))
        }
        "reset" => Ok(Command::Reset),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command `{}`, try `help`", other)),
    }
}

fn parse_addr(arg: Option<&&str>) -> Result<CpuAddr, String> {
    let arg = arg.ok_or_else(|| "missing address".to_owned())?;
    convert_hex_addr(arg).ok_or_else(|| format!("bad address `{}`", arg))
}

fn parse_count(arg: Option<&&str>, default: u64) -> Result<u64, String> {
    match arg {
        None => Ok(default),
        Some(arg) => arg.parse().map_err(|_| format!("bad count `{}`", arg)),
    }
}
