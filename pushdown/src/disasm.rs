// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler: a binary program image back to mnemonic source text.
//!
//! The scan is linear, but a jump can point backwards at a line that has
//! already been rendered, so lines are buffered together with their
//! encoded sizes and the `name:` lines are spliced in on flush. Label
//! names are synthesised as `L0`, `L1`, ... in first-reference order,
//! which makes the output deterministic for a given image.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use hashbrown::HashMap;

use crate::error::MachineError;
use crate::format::{Reader, read_branch_offset};
use crate::opcode::{OpByte, OperandKind};
use crate::reg::Register;

/// Disassembles the binary at `input` into source text at `output`.
pub fn disassemble(input: &Path, output: &Path) -> Result<(), MachineError> {
    let image = fs::read(input).map_err(|_| MachineError::InvalidFile)?;
    if image.is_empty() {
        return Err(MachineError::InvalidFile);
    }
    let text = disassemble_bytes(&image)?;
    fs::write(output, text).map_err(|_| MachineError::InvalidFile)
}

/// Disassembles a binary image into source text.
pub fn disassemble_bytes(image: &[u8]) -> Result<String, MachineError> {
    let mut r = Reader::new(image);
    let mut buf = DisasmBuffer::new();
    while !r.is_at_end() {
        let start = r.offset();
        let split = OpByte::decode(r.read_u8()?).ok_or(MachineError::InvalidOperation)?;
        let kind = split
            .operand_kind()
            .ok_or(MachineError::InvalidOperation)?;
        let mut text = String::from(split.op.mnemonic());
        match kind {
            OperandKind::None => {}
            OperandKind::Register => {
                let reg =
                    Register::from_index(r.read_u8()?).ok_or(MachineError::InvalidRegister)?;
                if split.mode.is_ram() {
                    let _ = write!(text, " [{reg}]");
                } else {
                    let _ = write!(text, " {reg}");
                }
            }
            OperandKind::Immediate => {
                let value = r.read_f64_le()?;
                if !value.is_finite() {
                    return Err(MachineError::InvalidOperation);
                }
                if split.mode.is_ram() {
                    let _ = write!(text, " [{value}]");
                } else {
                    let _ = write!(text, " {value}");
                }
            }
            OperandKind::Offset => {
                let offset = read_branch_offset(&mut r)?;
                let target = (r.offset() as i32)
                    .checked_add(offset)
                    .ok_or(MachineError::InvalidLabel)?;
                if target < 0 {
                    return Err(MachineError::InvalidLabel);
                }
                let name = buf.label_for_offset(target);
                let _ = write!(text, " {name}");
            }
        }
        buf.push_line(text, r.offset() - start);
    }
    buf.flush(image.len())
}

/// Accumulates disassembled lines until every jump target is known.
#[derive(Clone, Debug, Default)]
struct DisasmBuffer {
    lines: Vec<(String, usize)>,
    labels: HashMap<i32, String>,
}

impl DisasmBuffer {
    fn new() -> Self {
        Self::default()
    }

    /// Returns the label name for `offset`, synthesising `L<n>` on first
    /// reference.
    fn label_for_offset(&mut self, offset: i32) -> String {
        if let Some(name) = self.labels.get(&offset) {
            return name.clone();
        }
        let name = format!("L{}", self.labels.len());
        self.labels.insert(offset, name.clone());
        name
    }

    fn push_line(&mut self, text: String, size: usize) {
        self.lines.push((text, size));
    }

    /// Renders the buffered program, splicing each `name:` line in front
    /// of the instruction at its cumulative offset.
    ///
    /// A label is allowed to sit exactly at the end of the program; any
    /// other unconsumed label points past the image.
    fn flush(mut self, total: usize) -> Result<String, MachineError> {
        let mut out = String::new();
        let mut offset: i32 = 0;
        for (text, size) in &self.lines {
            if let Some(name) = self.labels.remove(&offset) {
                out.push_str(&name);
                out.push_str(":\n");
            }
            out.push_str(text);
            out.push('\n');
            offset += *size as i32;
        }
        if let Some(name) = self.labels.remove(&(total as i32)) {
            out.push_str(&name);
            out.push_str(":\n");
        }
        if !self.labels.is_empty() {
            return Err(MachineError::InvalidLabel);
        }
        Ok(out)
    }
}
