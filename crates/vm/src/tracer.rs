//! Execution tracer.

use serde::Serialize;
use std::fmt;
use zzvm_core::{RawInstruction, Register, NUM_REGISTERS};

/// A single trace entry. `registers` holds the state after the instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub ip: u16,
    pub instruction: RawInstruction,
    pub text: String,
    pub registers: [u16; NUM_REGISTERS],
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {:<20}", self.ip, self.text)?;
        for r in [Register::RA, Register::R1, Register::R2, Register::SP] {
            write!(f, " {}={:04x}", r, self.registers[r.index()])?;
        }
        Ok(())
    }
}

/// Steps kept by a tracer before the oldest are discarded.
pub const DEFAULT_TRACE_CAPACITY: usize = 1 << 16;

/// Records execution for debugging.
///
/// Holds at most `capacity` steps. When full, the oldest half is dropped.
#[derive(Debug)]
pub struct Tracer {
    steps: Vec<TraceStep>,
    enabled: bool,
    capacity: usize,
}

impl Tracer {
    pub fn new(enabled: bool) -> Self {
        Self::with_capacity(enabled, DEFAULT_TRACE_CAPACITY)
    }

    pub fn with_capacity(enabled: bool, capacity: usize) -> Self {
        Self {
            steps: Vec::new(),
            enabled,
            capacity: capacity.max(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&mut self, step: TraceStep) {
        if !self.enabled {
            return;
        }
        if self.steps.len() >= self.capacity {
            let excess = self.steps.len() + 1 - self.capacity / 2;
            self.steps.drain(..excess.min(self.steps.len()));
        }
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn last(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    pub fn take(&mut self) -> Vec<TraceStep> {
        std::mem::take(&mut self.steps)
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(false)
    }
}
