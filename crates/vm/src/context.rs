//! Execution context and context dumps.

use crate::memory::{Memory, Registers};
use crate::rng::XorShift64Star;
use serde::Serialize;
use std::fmt;
use zzvm_core::Register;

/// Number of stack words shown in a context dump.
pub const STACK_DUMP_WORDS: usize = 8;

/// Registers, memory and random state of one VM. Syscall handlers receive
/// this directly.
pub struct Context {
    pub registers: Registers,
    pub memory: Memory,
    pub rng: XorShift64Star,
}

impl Context {
    pub fn new(seed: u64) -> Self {
        Self {
            registers: Registers::new(),
            memory: Memory::new(),
            rng: XorShift64Star::new(seed),
        }
    }

    pub fn reg(&self, r: Register) -> u16 {
        self.registers.get(r)
    }

    pub fn set_reg(&mut self, r: Register, value: u16) {
        self.registers.set(r, value);
    }

    pub fn next_random(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Push a word: `SP -= 2; mem16[SP] = value`.
    pub fn push(&mut self, value: u16) {
        let sp = self.registers.sp().wrapping_sub(2);
        self.registers.set(Register::SP, sp);
        self.memory.store16(sp, value);
    }

    /// Pop a word: `value = mem16[SP]; SP += 2`.
    pub fn pop(&mut self) -> u16 {
        let sp = self.registers.sp();
        let value = self.memory.load16(sp);
        self.registers.set(Register::SP, sp.wrapping_add(2));
        value
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let sp = self.registers.sp();
        let stack = (0..STACK_DUMP_WORDS)
            .map(|i| {
                let address = sp.wrapping_add((i * 2) as u16);
                StackWord {
                    address,
                    value: self.memory.load16(address),
                }
            })
            .collect();

        ContextSnapshot {
            registers: Register::ALL
                .iter()
                .map(|&r| RegisterValue {
                    name: r.name(),
                    value: self.registers.get(r),
                })
                .collect(),
            stack,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterValue {
    pub name: &'static str,
    pub value: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackWord {
    pub address: u16,
    pub value: u16,
}

/// Registers plus a window of stack memory starting at SP.
///
/// `Display` renders the textual dump:
///
/// ```text
/// --- Registers ---
/// RA: 0x0000
/// ...
/// --- Stack ---
/// 0xfff0: 0x0000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub registers: Vec<RegisterValue>,
    pub stack: Vec<StackWord>,
}

impl ContextSnapshot {
    pub fn register(&self, r: Register) -> u16 {
        self.registers[r.index()].value
    }
}

impl fmt::Display for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Registers ---")?;
        for reg in &self.registers {
            writeln!(f, "{}: 0x{:04x}", reg.name, reg.value)?;
        }
        writeln!(f, "--- Stack ---")?;
        for word in &self.stack {
            writeln!(f, "0x{:04x}: 0x{:04x}", word.address, word.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_stride() {
        let mut ctx = Context::new(1);
        ctx.set_reg(Register::SP, 0xFFF0);
        ctx.push(0xAAAA);
        ctx.push(0xBBBB);
        assert_eq!(ctx.reg(Register::SP), 0xFFEC);
        assert_eq!(ctx.pop(), 0xBBBB);
        assert_eq!(ctx.pop(), 0xAAAA);
        assert_eq!(ctx.reg(Register::SP), 0xFFF0);
    }

    #[test]
    fn test_dump_format() {
        let mut ctx = Context::new(1);
        ctx.set_reg(Register::SP, 0xFFF0);
        ctx.set_reg(Register::R1, 0x1234);
        ctx.memory.store16(0xFFF2, 0xCAFE);

        let dump = ctx.snapshot().to_string();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 1 + 8 + 1 + STACK_DUMP_WORDS);
        assert_eq!(lines[0], "--- Registers ---");
        assert_eq!(lines[2], "R1: 0x1234");
        assert_eq!(lines[7], "SP: 0xfff0");
        assert_eq!(lines[9], "--- Stack ---");
        assert_eq!(lines[10], "0xfff0: 0x0000");
        assert_eq!(lines[11], "0xfff2: 0xcafe");
        assert_eq!(lines[17], "0xfffe: 0x0000");
    }

    #[test]
    fn test_stack_window_wraps() {
        let mut ctx = Context::new(1);
        ctx.set_reg(Register::SP, 0xFFFC);
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.stack[2].address, 0x0000);
        assert_eq!(snapshot.stack[7].address, 0x000A);
    }

    #[test]
    fn test_snapshot_json() {
        let mut ctx = Context::new(1);
        ctx.set_reg(Register::IP, 0x4000);
        let json = serde_json::to_value(ctx.snapshot()).unwrap();
        assert_eq!(json["registers"][7]["name"], "IP");
        assert_eq!(json["registers"][7]["value"], 0x4000);
        assert_eq!(json["stack"].as_array().unwrap().len(), STACK_DUMP_WORDS);
    }
}
