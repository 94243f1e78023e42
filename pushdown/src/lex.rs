// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Source-line tokenization for the assembler.
//!
//! The language is line-oriented and whitespace-insensitive: a line is
//! blank, a `name:` label definition, or a mnemonic followed by at most
//! one operand. Square brackets around the operand mark RAM indirection
//! and are stripped here; what the bare token means (register, number,
//! label) is decided by the assembler.

use crate::error::MachineError;

/// An operand token with its RAM-indirection marker stripped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawOperand<'a> {
    /// The token text, brackets removed.
    pub text: &'a str,
    /// `true` if the token was written `[...]`.
    pub indirect: bool,
}

/// One classified source line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Line<'a> {
    /// Nothing to assemble.
    Blank,
    /// `name:` on a line of its own.
    Label(&'a str),
    /// A mnemonic with at most one operand.
    Instr {
        /// The mnemonic token.
        mnemonic: &'a str,
        /// The operand token, if present.
        operand: Option<RawOperand<'a>>,
    },
}

/// Splits and classifies one source line.
pub fn classify(line: &str) -> Result<Line<'_>, MachineError> {
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return Ok(Line::Blank);
    };
    let second = tokens.next();
    if tokens.next().is_some() {
        return Err(MachineError::InvalidOperation);
    }
    if second.is_none()
        && let Some(name) = first.strip_suffix(':')
    {
        if name.is_empty() || name.ends_with(':') {
            return Err(MachineError::InvalidLabel);
        }
        return Ok(Line::Label(name));
    }
    let operand = second.map(parse_operand).transpose()?;
    Ok(Line::Instr {
        mnemonic: first,
        operand,
    })
}

fn parse_operand(token: &str) -> Result<RawOperand<'_>, MachineError> {
    if let Some(inner) = token.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or(MachineError::InvalidOperation)?;
        if inner.is_empty() {
            return Err(MachineError::InvalidOperation);
        }
        return Ok(RawOperand {
            text: inner,
            indirect: true,
        });
    }
    if token.ends_with(']') {
        return Err(MachineError::InvalidOperation);
    }
    Ok(RawOperand {
        text: token,
        indirect: false,
    })
}

#[cfg(test)]
mod tests {
    use super::{Line, RawOperand, classify};
    use crate::error::MachineError;

    #[test]
    fn blank_lines_are_skippable() {
        assert_eq!(classify(""), Ok(Line::Blank));
        assert_eq!(classify("   \t  "), Ok(Line::Blank));
    }

    #[test]
    fn labels_need_a_line_of_their_own() {
        assert_eq!(classify("loop:"), Ok(Line::Label("loop")));
        assert_eq!(classify("  end:  "), Ok(Line::Label("end")));
        // A trailing token turns the line into an (invalid) instruction.
        assert_eq!(
            classify("loop: PUSH"),
            Ok(Line::Instr {
                mnemonic: "loop:",
                operand: Some(RawOperand {
                    text: "PUSH",
                    indirect: false
                }),
            })
        );
        assert_eq!(classify(":"), Err(MachineError::InvalidLabel));
        assert_eq!(classify("a::"), Err(MachineError::InvalidLabel));
    }

    #[test]
    fn operands_lose_their_brackets() {
        assert_eq!(
            classify("PUSH [10]"),
            Ok(Line::Instr {
                mnemonic: "PUSH",
                operand: Some(RawOperand {
                    text: "10",
                    indirect: true
                }),
            })
        );
        assert_eq!(
            classify("POP AX"),
            Ok(Line::Instr {
                mnemonic: "POP",
                operand: Some(RawOperand {
                    text: "AX",
                    indirect: false
                }),
            })
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(classify("PUSH [10"), Err(MachineError::InvalidOperation));
        assert_eq!(classify("PUSH 10]"), Err(MachineError::InvalidOperation));
        assert_eq!(classify("PUSH []"), Err(MachineError::InvalidOperation));
        assert_eq!(classify("PUSH 1 2"), Err(MachineError::InvalidOperation));
    }
}
