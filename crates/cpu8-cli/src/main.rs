//! CPU-8 shell.

use std::path::{Path, PathBuf};
use std::process;

use argh::FromArgs;
use cpu8_core::{
    core::{
        assembler::Assembler,
        cpu::{Cpu, DEFAULT_REPORT_INTERVAL},
        disassembler,
    },
    errors::CResult,
    monitor::Monitor,
    peripherals::{program::Program, screen::Screen},
};
use tracing::Level;

/// CPU-8 emulator
#[derive(FromArgs)]
pub struct Args {
    /// verbose mode
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    /// subcommand
    #[argh(subcommand)]
    pub nested: SubCommands,
}

/// Subcommands
#[derive(FromArgs)]
#[argh(subcommand)]
pub enum SubCommands {
    /// Assemble command
    Assemble(AssembleCommand),
    /// Run command
    Run(RunCommand),
    /// Disassemble command
    Disassemble(DisassembleCommand),
    /// Monitor command
    Monitor(MonitorCommand),
    /// Version command
    Version(VersionCommand),
}

/// assemble a source file
#[derive(FromArgs)]
#[argh(subcommand, name = "assemble")]
pub struct AssembleCommand {
    /// source assembly path
    #[argh(positional)]
    pub source: PathBuf,

    /// output file (omit for hex on stdout)
    #[argh(positional)]
    pub output: Option<PathBuf>,

    /// write hex text instead of binary
    #[argh(switch)]
    pub hex: bool,
}

/// run a program
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
pub struct RunCommand {
    /// program path (.asm sources are assembled on the fly)
    #[argh(positional)]
    pub file: PathBuf,

    /// memory size in KB (4-64)
    #[argh(option, default = "64")]
    pub ram_kb: usize,

    /// load offset
    #[argh(option, default = "0")]
    pub offset: usize,

    /// attach the character screen
    #[argh(switch)]
    pub screen: bool,

    /// ticks between progress reports
    #[argh(option, default = "DEFAULT_REPORT_INTERVAL")]
    pub report_interval: u64,

    /// trace output file, `-` for stdout
    #[argh(option, short = 't')]
    pub trace: Option<PathBuf>,
}

/// disassemble a program
#[derive(FromArgs)]
#[argh(subcommand, name = "disassemble")]
pub struct DisassembleCommand {
    /// program path
    #[argh(positional)]
    pub file: PathBuf,

    /// output file (omit argument for stdout)
    #[argh(option, short = 'o')]
    pub output: Option<PathBuf>,
}

/// inspect a program in the interactive monitor
#[derive(FromArgs)]
#[argh(subcommand, name = "monitor")]
pub struct MonitorCommand {
    /// program path (.asm sources are assembled on the fly)
    #[argh(positional)]
    pub file: PathBuf,

    /// memory size in KB (4-64)
    #[argh(option, default = "64")]
    pub ram_kb: usize,

    /// load offset
    #[argh(option, default = "0")]
    pub offset: usize,
}

/// show version
#[derive(FromArgs)]
#[argh(subcommand, name = "version")]
pub struct VersionCommand {}

fn main() -> CResult {
    let args: Args = argh::from_env();
    parse_args(args)
}

fn parse_args(args: Args) -> CResult {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).compact().init();

    match args.nested {
        SubCommands::Version(_) => {
            println!("cpu8 {}", env!("CARGO_PKG_VERSION"));
        }
        SubCommands::Assemble(cmd) => {
            let assembler = Assembler::from_path(&cmd.source)?;
            let assembly = match assembler.assemble() {
                Ok(assembly) => assembly,
                Err(error) => {
                    eprintln!("{}", error);
                    process::exit(1);
                }
            };

            let program = Program::new(assembly.data);
            match cmd.output {
                Some(path) if cmd.hex => program.save_hex_to_path(&path)?,
                Some(path) => program.save_to_path(&path)?,
                None => println!("{}", program.to_hex()),
            }
        }
        SubCommands::Run(cmd) => {
            let program = load_program(&cmd.file)?;
            let screen = if cmd.screen { Some(Screen::new()) } else { None };

            let mut cpu = Cpu::new(cmd.ram_kb, screen);
            if let Some(trace) = &cmd.trace {
                cpu.set_tracefile(&trace.to_string_lossy())?;
            }
            if let Err(error) = cpu.load_data(program.data(), cmd.offset) {
                eprintln!("{}", error);
                process::exit(1);
            }

            cpu.run(cmd.report_interval);
        }
        SubCommands::Disassemble(cmd) => {
            let program = Program::load_from_path(&cmd.file)?;
            let listing = disassembler::disassemble_listing(program.data());
            match cmd.output {
                Some(path) => std::fs::write(path, listing.join("\n") + "\n")?,
                None => {
                    for line in listing {
                        println!("{}", line);
                    }
                }
            }
        }
        SubCommands::Monitor(cmd) => {
            let program = load_program(&cmd.file)?;
            let mut cpu = Cpu::new(cmd.ram_kb, None);
            if let Err(error) = cpu.load_data(program.data(), cmd.offset) {
                eprintln!("{}", error);
                process::exit(1);
            }

            Monitor::new().run(&mut cpu)?;
        }
    }

    Ok(())
}

/// Load a program file, assembling `.asm` sources on the fly.
fn load_program(path: &Path) -> CResult<Program> {
    let is_source = path
        .extension()
        .map(|ext| ext == "asm" || ext == "s")
        .unwrap_or(false);

    if !is_source {
        return Program::load_from_path(path);
    }

    let assembler = Assembler::from_path(path)?;
    match assembler.assemble() {
        Ok(assembly) => Ok(Program::new(assembly.data)),
        Err(error) => {
            eprintln!("{}", error);
            process::exit(1);
        }
    }
}
