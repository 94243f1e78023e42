// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-pass assembler: mnemonic source text to a binary program image.
//!
//! Pass 1 walks the source without emitting a byte, recording each label
//! definition at the running byte offset. Pass 2 re-walks the same lines
//! and emits opcode and operand bytes, resolving jump targets through the
//! label table as relative offsets. Both passes size instructions through
//! the same [`OpByte`] arity table, so the offsets they compute cannot
//! disagree.

use std::fs;
use std::path::Path;

use crate::error::MachineError;
use crate::format::{Writer, branch_operand};
use crate::label::LabelTable;
use crate::lex::{self, Line, RawOperand};
use crate::opcode::{AddrMode, Op, OpByte, OperandKind};
use crate::reg::Register;

/// Assembles the source file at `input` and writes the binary image to
/// `output`.
///
/// On error the output file's contents are unspecified; callers discard
/// it.
pub fn assemble(input: &Path, output: &Path) -> Result<(), MachineError> {
    let source = fs::read_to_string(input).map_err(|_| MachineError::InvalidFile)?;
    let image = assemble_source(&source)?;
    fs::write(output, image).map_err(|_| MachineError::InvalidFile)
}

/// Assembles source text into a binary image.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, MachineError> {
    let labels = collect_labels(source)?;
    emit(source, &labels)
}

/// Pass 1: label resolution.
///
/// Operand values are not needed yet; tokens are classified just far
/// enough to size each instruction. A label with no instruction after it
/// by end of input is dangling.
fn collect_labels(source: &str) -> Result<LabelTable, MachineError> {
    let mut labels = LabelTable::new();
    let mut offset: i32 = 0;
    let mut dangling = false;
    for line in source.lines() {
        match lex::classify(line)? {
            Line::Blank => {}
            Line::Label(name) => {
                labels.define(name, offset)?;
                dangling = true;
            }
            Line::Instr { mnemonic, operand } => {
                let (_, kind) = resolve(mnemonic, operand.as_ref())?;
                offset = offset
                    .checked_add(1 + kind.size() as i32)
                    .ok_or(MachineError::InvalidOperation)?;
                dangling = false;
            }
        }
    }
    if dangling {
        return Err(MachineError::InvalidLabel);
    }
    Ok(labels)
}

/// Pass 2: byte emission against the completed label table.
fn emit(source: &str, labels: &LabelTable) -> Result<Vec<u8>, MachineError> {
    let mut w = Writer::new();
    for line in source.lines() {
        let Line::Instr { mnemonic, operand } = lex::classify(line)? else {
            continue;
        };
        let (split, kind) = resolve(mnemonic, operand.as_ref())?;
        let opcode_offset = w.len() as i32;
        w.write_u8(split.encode());
        match (kind, operand) {
            (OperandKind::None, None) => {}
            (OperandKind::Register, Some(raw)) => {
                let reg = Register::from_name(raw.text).ok_or(MachineError::InvalidRegister)?;
                w.write_u8(reg.index());
            }
            (OperandKind::Immediate, Some(raw)) => {
                let value: f64 = raw
                    .text
                    .parse()
                    .map_err(|_| MachineError::InvalidOperation)?;
                if !value.is_finite() {
                    return Err(MachineError::InvalidOperation);
                }
                w.write_f64_le(value);
            }
            (OperandKind::Offset, Some(raw)) => {
                let target = labels.offset(raw.text).ok_or(MachineError::InvalidLabel)?;
                w.write_i32_le(branch_operand(target, opcode_offset));
            }
            _ => return Err(MachineError::InvalidOperation),
        }
    }
    Ok(w.into_vec())
}

/// Classifies an instruction line into its opcode byte and operand
/// encoding, rejecting illegal mnemonic/addressing combinations and
/// operand counts.
fn resolve(
    mnemonic: &str,
    operand: Option<&RawOperand<'_>>,
) -> Result<(OpByte, OperandKind), MachineError> {
    let op = Op::from_mnemonic(mnemonic).ok_or(MachineError::InvalidOperation)?;
    let mode = match operand {
        None => AddrMode::Plain,
        Some(raw) => {
            AddrMode::from_flags(Register::from_name(raw.text).is_some(), raw.indirect)
        }
    };
    let split = OpByte { op, mode };
    let kind = split.operand_kind().ok_or(MachineError::InvalidOperation)?;
    let expected = kind != OperandKind::None;
    if expected != operand.is_some() {
        return Err(MachineError::InvalidOperation);
    }
    Ok((split, kind))
}
