// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interpreter: fetch, decode, dispatch.
//!
//! [`StackMachine`] owns the data stack, the call stack, the register
//! file, RAM, the program counter and the loaded image. One call to
//! [`StackMachine::process_next_operation`] advances exactly one
//! instruction; [`StackMachine::run_to_halt`] loops until `HLT` or the
//! first fault.
//!
//! Every instruction funnels through one of the three [`Processor`]
//! capabilities, keyed by the operand encoding of its opcode byte.

use std::fs;
use std::path::Path;

use crate::console::{Console, StdConsole};
use crate::error::MachineError;
use crate::format::{Reader, read_branch_offset};
use crate::opcode::{AddrMode, Op, OpByte, OperandKind};
use crate::ram::Ram;
use crate::reg::{Register, RegisterFile};
use crate::stack::GuardedStack;
use crate::trace::{TraceEvent, TraceMask, TraceSink};

/// Comparison tolerance for the conditional jumps.
pub const EPSILON: f64 = 1e-9;

/// Machine lifecycle state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Instructions can still be processed.
    Running,
    /// `HLT` was executed.
    Halted,
    /// An instruction faulted; the machine is done.
    Faulted(MachineError),
}

/// A resolved unary operand.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Target {
    /// A machine register.
    Register(Register),
    /// A RAM slot addressed by a byte offset (rounded by the RAM).
    Ram(f64),
    /// An immediate value.
    Immediate(f64),
}

/// The three instruction capabilities of the machine.
///
/// The fetch/decode driver routes every instruction through exactly one
/// of these, chosen by the operand encoding of the opcode byte;
/// [`StackMachine`] is the one concrete implementation.
pub trait Processor {
    /// Executes a nullary operation.
    fn process_operation(&mut self, op: Op) -> Result<(), MachineError>;

    /// Executes a unary operation against a resolved operand target.
    fn process_operand_operation(&mut self, op: Op, target: Target) -> Result<(), MachineError>;

    /// Executes a branch with a normalised relative offset.
    fn process_jump_operation(&mut self, op: Op, offset: i32) -> Result<(), MachineError>;
}

/// Executes the binary at `input` to completion on the standard console.
pub fn run(input: &Path) -> Result<(), MachineError> {
    let image = load_image(input)?;
    StackMachine::new(image, StdConsole).run_to_halt()
}

/// Reads a program image; unreadable or empty files are `INVALID_FILE`.
pub fn load_image(input: &Path) -> Result<Vec<u8>, MachineError> {
    let image = fs::read(input).map_err(|_| MachineError::InvalidFile)?;
    if image.is_empty() {
        return Err(MachineError::InvalidFile);
    }
    Ok(image)
}

enum Fetched {
    None,
    Reg(Register),
    Imm(f64),
    Off(i32),
}

/// The stack machine.
#[derive(Debug)]
pub struct StackMachine<C> {
    image: Vec<u8>,
    pc: i32,
    state: State,
    stack: GuardedStack<f64>,
    call_stack: GuardedStack<i32>,
    registers: RegisterFile,
    ram: Ram,
    console: C,
}

impl<C: Console> StackMachine<C> {
    /// Creates a machine over `image` with zeroed registers and RAM at
    /// the nominal access latency.
    #[must_use]
    pub fn new(image: Vec<u8>, console: C) -> Self {
        Self::with_ram(image, console, Ram::new())
    }

    /// Creates a machine with caller-configured RAM (tests pass zero
    /// latency).
    #[must_use]
    pub fn with_ram(image: Vec<u8>, console: C, ram: Ram) -> Self {
        Self {
            image,
            pc: 0,
            state: State::Running,
            stack: GuardedStack::new(),
            call_stack: GuardedStack::new(),
            registers: RegisterFile::new(),
            ram,
            console,
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns the program counter.
    #[must_use]
    pub fn pc(&self) -> i32 {
        self.pc
    }

    /// Returns the data-stack depth.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns the call-stack depth.
    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Returns the value of register `r`.
    #[must_use]
    pub fn register(&self, r: Register) -> f64 {
        self.registers.get(r)
    }

    /// Returns the console.
    #[must_use]
    pub fn console(&self) -> &C {
        &self.console
    }

    /// Consumes the machine and returns the console.
    #[must_use]
    pub fn into_console(self) -> C {
        self.console
    }

    /// Runs until `HLT` or the first fault.
    pub fn run_to_halt(&mut self) -> Result<(), MachineError> {
        self.run_traced(TraceMask::NONE, None)
    }

    /// Runs until `HLT` or the first fault, emitting the events `mask`
    /// requests into `trace`.
    pub fn run_traced(
        &mut self,
        mask: TraceMask,
        mut trace: Option<&mut dyn TraceSink>,
    ) -> Result<(), MachineError> {
        loop {
            let pc = self.pc;
            let raw = self.image.get(pc as usize).copied();
            match self.process_next_operation() {
                Ok(op) => {
                    if mask.contains(TraceMask::INSTR)
                        && let Some(sink) = trace.as_mut()
                        && let Some(opcode) = raw
                    {
                        sink.event(TraceEvent::Instr { pc, opcode });
                    }
                    if op == Op::Hlt {
                        if mask.contains(TraceMask::RUN)
                            && let Some(sink) = trace.as_mut()
                        {
                            sink.event(TraceEvent::RunEnd { outcome: Ok(()) });
                        }
                        return Ok(());
                    }
                }
                Err(e) => {
                    if mask.contains(TraceMask::RUN)
                        && let Some(sink) = trace.as_mut()
                    {
                        sink.event(TraceEvent::RunEnd { outcome: Err(e) });
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Advances the machine by exactly one instruction.
    ///
    /// Returns the executed base operation; `Op::Hlt` leaves the machine
    /// halted. The first error faults the machine, and any further call
    /// reports `INVALID_OPERATION`.
    pub fn process_next_operation(&mut self) -> Result<Op, MachineError> {
        if self.state != State::Running {
            return Err(MachineError::InvalidOperation);
        }
        match self.step() {
            Ok(op) => {
                if op == Op::Hlt {
                    self.state = State::Halted;
                }
                Ok(op)
            }
            Err(e) => {
                self.state = State::Faulted(e);
                Err(e)
            }
        }
    }

    fn step(&mut self) -> Result<Op, MachineError> {
        // Fetch the opcode and its operand bytes before touching any
        // machine state; running past the end of the image fails here.
        let mut r = Reader::at(&self.image, self.pc as usize);
        let split = OpByte::decode(r.read_u8()?).ok_or(MachineError::InvalidOperation)?;
        let kind = split
            .operand_kind()
            .ok_or(MachineError::InvalidOperation)?;
        let operand = match kind {
            OperandKind::None => Fetched::None,
            OperandKind::Register => {
                let reg =
                    Register::from_index(r.read_u8()?).ok_or(MachineError::InvalidRegister)?;
                Fetched::Reg(reg)
            }
            OperandKind::Immediate => {
                let value = r.read_f64_le()?;
                if !value.is_finite() {
                    return Err(MachineError::InvalidOperation);
                }
                Fetched::Imm(value)
            }
            OperandKind::Offset => Fetched::Off(read_branch_offset(&mut r)?),
        };
        self.pc = r.offset() as i32;

        let op = split.op;
        match operand {
            Fetched::None => self.process_operation(op)?,
            Fetched::Reg(reg) => {
                let target = if split.mode == AddrMode::RamRegister {
                    Target::Ram(self.registers.get(reg))
                } else {
                    Target::Register(reg)
                };
                self.process_operand_operation(op, target)?;
            }
            Fetched::Imm(value) => {
                let target = if split.mode == AddrMode::RamImmediate {
                    Target::Ram(value)
                } else {
                    Target::Immediate(value)
                };
                self.process_operand_operation(op, target)?;
            }
            Fetched::Off(offset) => self.process_jump_operation(op, offset)?,
        }
        Ok(op)
    }

    fn load(&mut self, target: Target) -> Result<f64, MachineError> {
        match target {
            Target::Immediate(value) => Ok(value),
            Target::Register(reg) => Ok(self.registers.get(reg)),
            Target::Ram(address) => self.ram.load(address),
        }
    }

    fn store(&mut self, target: Target, value: f64) -> Result<(), MachineError> {
        match target {
            Target::Register(reg) => {
                self.registers.set(reg, value);
                Ok(())
            }
            Target::Ram(address) => self.ram.store(address, value),
            Target::Immediate(_) => Err(MachineError::InvalidOperation),
        }
    }

    fn binary(&mut self, apply: impl FnOnce(f64, f64) -> f64) -> Result<(), MachineError> {
        let rhs = self.stack.pop()?;
        let lhs = self.stack.pop()?;
        self.stack.push(apply(lhs, rhs));
        Ok(())
    }

    fn branch_to(&mut self, target: i32) -> Result<(), MachineError> {
        if target < 0 || target >= self.image.len() as i32 {
            return Err(MachineError::InvalidOperation);
        }
        self.pc = target;
        Ok(())
    }
}

impl<C: Console> Processor for StackMachine<C> {
    fn process_operation(&mut self, op: Op) -> Result<(), MachineError> {
        match op {
            Op::Hlt => {}
            Op::In => {
                let value = self
                    .console
                    .input()
                    .ok_or(MachineError::InvalidOperation)?;
                self.stack.push(value);
            }
            Op::Out => {
                let value = self.stack.pop()?;
                self.console.output(value);
            }
            Op::Pop => {
                self.stack.pop()?;
            }
            Op::Add => self.binary(|lhs, rhs| lhs + rhs)?,
            Op::Sub => self.binary(|lhs, rhs| lhs - rhs)?,
            Op::Mul => self.binary(|lhs, rhs| lhs * rhs)?,
            Op::Div => self.binary(|lhs, rhs| lhs / rhs)?,
            Op::Sqrt => {
                let value = self.stack.pop()?;
                self.stack.push(value.sqrt());
            }
            Op::Dup => {
                let top = self.stack.top()?;
                self.stack.push(top);
            }
            Op::Ret => {
                let target = self.call_stack.pop()?;
                self.branch_to(target)?;
            }
            _ => return Err(MachineError::InvalidOperation),
        }
        Ok(())
    }

    fn process_operand_operation(&mut self, op: Op, target: Target) -> Result<(), MachineError> {
        match op {
            Op::Push => {
                let value = self.load(target)?;
                self.stack.push(value);
                Ok(())
            }
            Op::Pop => {
                let value = self.stack.pop()?;
                self.store(target, value)
            }
            _ => Err(MachineError::InvalidOperation),
        }
    }

    fn process_jump_operation(&mut self, op: Op, offset: i32) -> Result<(), MachineError> {
        let taken = match op {
            Op::Jmp => true,
            Op::Call => {
                self.call_stack.push(self.pc);
                true
            }
            _ => {
                let rhs = self.stack.pop()?;
                let lhs = self.stack.pop()?;
                compare(op, lhs, rhs)?
            }
        };
        if taken {
            let target = self
                .pc
                .checked_add(offset)
                .ok_or(MachineError::InvalidOperation)?;
            self.branch_to(target)?;
        }
        Ok(())
    }
}

/// Evaluates a comparison jump's predicate.
///
/// Equality means "within [`EPSILON`]"; the strict and non-strict forms
/// differ only inside the epsilon band.
fn compare(op: Op, lhs: f64, rhs: f64) -> Result<bool, MachineError> {
    let taken = match op {
        Op::Jmpe => (lhs - rhs).abs() < EPSILON,
        Op::Jmpne => (lhs - rhs).abs() >= EPSILON,
        Op::Jmpl => lhs < rhs - EPSILON,
        Op::Jmple => lhs < rhs + EPSILON,
        Op::Jmpg => lhs > rhs + EPSILON,
        Op::Jmpge => lhs > rhs - EPSILON,
        _ => return Err(MachineError::InvalidOperation),
    };
    Ok(taken)
}
