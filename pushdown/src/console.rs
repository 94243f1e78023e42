// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interpreter's input/output seam.
//!
//! `IN` and `OUT` reach the outside world only through [`Console`], so
//! embedders and tests inject their own transport instead of talking to
//! process stdio.

use std::io::{self, BufRead as _, Write as _};

/// Machine-facing input/output.
pub trait Console {
    /// Produces the next input value for `IN`.
    ///
    /// `None` means no well-formed value was available; the instruction
    /// faults with `INVALID_OPERATION`.
    fn input(&mut self) -> Option<f64>;

    /// Consumes one `OUT` value.
    fn output(&mut self, value: f64);
}

/// A console over process stdin/stdout, prompting with `> ` before each
/// read.
#[derive(Clone, Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn input(&mut self) -> Option<f64> {
        print!("> ");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line).ok()?;
        if read == 0 {
            return None;
        }
        line.trim().parse().ok()
    }

    fn output(&mut self, value: f64) {
        println!("{value}");
    }
}
