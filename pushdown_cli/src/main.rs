// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command-line front-end for the `pushdown` toolchain.
//!
//! Three thin subcommands over the library entry points. Toolchain errors
//! exit with their sentinel byte so scripts can tell a stack underflow
//! from a bad file; everything else (usage, trace-file problems) exits
//! with 1.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use pushdown::MachineError;
use pushdown::trace::{TraceEvent, TraceMask, TraceSink};
use pushdown::vm::{StackMachine, load_image};

#[derive(Parser)]
#[command(
    name = "pushdown",
    version,
    about = "Assemble, disassemble and run stack-machine programs",
    arg_required_else_help(true)
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a source file into a binary program
    Asm {
        /// Source file
        file: PathBuf,
        /// Output file (default: source with a `.bin` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Reconstruct source text from a binary program
    Disasm {
        /// Binary file
        file: PathBuf,
        /// Output file (default: input with a `.disasm.txt` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Execute a binary program
    Run {
        /// Binary file
        file: PathBuf,
        /// Write an instruction trace to this file
        #[arg(long)]
        trace: Option<PathBuf>,
    },
}

enum CliError {
    Machine(MachineError),
    Other(anyhow::Error),
}

impl From<MachineError> for CliError {
    fn from(e: MachineError) -> Self {
        Self::Machine(e)
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e)
    }
}

fn main() -> ExitCode {
    match dispatch(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Machine(e)) => {
            eprintln!("error: {e}");
            ExitCode::from(e.sentinel())
        }
        Err(CliError::Other(e)) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Asm { file, output } => {
            let output = output.unwrap_or_else(|| file.with_extension("bin"));
            pushdown::assemble(&file, &output)?;
            Ok(())
        }
        Command::Disasm { file, output } => {
            let output = output.unwrap_or_else(|| file.with_extension("disasm.txt"));
            pushdown::disassemble(&file, &output)?;
            Ok(())
        }
        Command::Run { file, trace } => run_program(&file, trace.as_deref()),
    }
}

fn run_program(file: &Path, trace: Option<&Path>) -> Result<(), CliError> {
    let image = load_image(file)?;
    let mut machine = StackMachine::new(image, pushdown::console::StdConsole);
    match trace {
        None => machine.run_to_halt()?,
        Some(path) => {
            let out = File::create(path)
                .with_context(|| format!("cannot create trace file {}", path.display()))?;
            let mut sink = FileTrace {
                out: BufWriter::new(out),
            };
            let mask = sink.mask();
            machine.run_traced(mask, Some(&mut sink))?;
        }
    }
    Ok(())
}

/// A trace sink writing one line per event.
struct FileTrace<W> {
    out: W,
}

impl<W: Write> TraceSink for FileTrace<W> {
    fn mask(&self) -> TraceMask {
        TraceMask::INSTR | TraceMask::RUN
    }

    fn event(&mut self, event: TraceEvent) {
        let _ = match event {
            TraceEvent::Instr { pc, opcode } => {
                writeln!(self.out, "pc={pc} opcode={opcode:#04X}")
            }
            TraceEvent::RunEnd { outcome: Ok(()) } => writeln!(self.out, "halted"),
            TraceEvent::RunEnd { outcome: Err(e) } => writeln!(self.out, "faulted: {e}"),
        };
    }
}
