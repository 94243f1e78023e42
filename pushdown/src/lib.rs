// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `pushdown`: a toolchain for a small stack-oriented virtual machine.
//!
//! Three subsystems share one binary format:
//! - a two-pass assembler ([`asm`]) translating mnemonic source text into
//!   a compact binary image, with label resolution;
//! - a disassembler ([`disasm`]) reconstructing equivalent source text,
//!   synthesising labels for jump targets;
//! - an interpreter ([`vm`]) executing the image against a guarded data
//!   stack, a call stack, four registers and a slow linear RAM.
//!
//! The opcode table ([`opcode`]) and the encode/decode primitives
//! ([`format`]) are the single source of truth for all three.
//!
//! ## Example
//!
//! ```no_run
//! use pushdown::asm::assemble_source;
//! use pushdown::vm::StackMachine;
//! use pushdown::console::StdConsole;
//!
//! let image = assemble_source("PUSH 2\nPUSH 3\nADD\nOUT\nHLT\n")?;
//! let mut machine = StackMachine::new(image, StdConsole);
//! machine.run_to_halt()?; // prints "5"
//! # Ok::<(), pushdown::MachineError>(())
//! ```

pub mod asm;
pub mod console;
pub mod disasm;
pub mod error;
pub mod format;
pub mod label;
pub mod lex;
pub mod opcode;
pub mod ram;
pub mod reg;
pub mod stack;
pub mod trace;
pub mod vm;

pub use asm::assemble;
pub use disasm::disassemble;
pub use error::MachineError;
pub use vm::run;
