// Copyright 2026 the Pushdown Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linear byte-addressed memory with a deliberate access latency.
//!
//! Doubles are stored as 8 raw little-endian bytes starting at the
//! addressed byte offset. Every read and write pays the configured
//! latency, modelling a slow memory tier behind the register file; tests
//! construct the memory with `Duration::ZERO`.

use std::thread;
use std::time::Duration;

use crate::error::MachineError;

/// Bytes of addressable memory.
pub const RAM_SIZE: usize = 1024;

/// Nominal per-access latency.
pub const ACCESS_LATENCY: Duration = Duration::from_millis(10);

/// Byte-addressed memory storing doubles as raw little-endian bytes.
#[derive(Clone, Debug)]
pub struct Ram {
    bytes: [u8; RAM_SIZE],
    latency: Duration,
}

impl Ram {
    /// Creates zeroed memory with the nominal access latency.
    #[must_use]
    pub fn new() -> Self {
        Self::with_latency(ACCESS_LATENCY)
    }

    /// Creates zeroed memory with a caller-chosen access latency.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            bytes: [0; RAM_SIZE],
            latency,
        }
    }

    /// Reads the double stored at `address`.
    pub fn load(&self, address: f64) -> Result<f64, MachineError> {
        let at = Self::slot(address)?;
        self.pause();
        let mut raw = [0_u8; 8];
        raw.copy_from_slice(&self.bytes[at..at + 8]);
        Ok(f64::from_le_bytes(raw))
    }

    /// Stores `value` at `address`.
    pub fn store(&mut self, address: f64, value: f64) -> Result<(), MachineError> {
        let at = Self::slot(address)?;
        self.pause();
        self.bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Converts an operand double into a byte offset whose 8-byte slot
    /// fits inside memory.
    fn slot(address: f64) -> Result<usize, MachineError> {
        if !address.is_finite() {
            return Err(MachineError::InvalidRamAddress);
        }
        let rounded = address.round();
        if rounded < 0.0 || rounded >= RAM_SIZE as f64 {
            return Err(MachineError::InvalidRamAddress);
        }
        let at = rounded as usize;
        if at + 8 > RAM_SIZE {
            return Err(MachineError::InvalidRamAddress);
        }
        Ok(at)
    }

    fn pause(&self) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}
