//! Register names and indices.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of registers in the register file.
pub const NUM_REGISTERS: usize = 8;

/// One of the eight 16-bit registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Register {
    /// Accumulator, syscall number and result.
    RA = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    /// Stack pointer. The stack grows toward lower addresses.
    SP = 6,
    /// Instruction pointer.
    IP = 7,
}

impl Register {
    pub const ALL: [Register; NUM_REGISTERS] = [
        Register::RA,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::SP,
        Register::IP,
    ];

    /// Map a 4-bit register field to a register. Indices 8..=15 are invalid.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Register::RA => "RA",
            Register::R1 => "R1",
            Register::R2 => "R2",
            Register::R3 => "R3",
            Register::R4 => "R4",
            Register::R5 => "R5",
            Register::SP => "SP",
            Register::IP => "IP",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_index() {
        assert_eq!(Register::from_index(0), Some(Register::RA));
        assert_eq!(Register::from_index(7), Some(Register::IP));
        assert_eq!(Register::from_index(8), None);
        assert_eq!(Register::from_index(15), None);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Register::from_name("sp"), Some(Register::SP));
        assert_eq!(Register::from_name("R5"), Some(Register::R5));
        assert_eq!(Register::from_name("R6"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Register::IP.to_string(), "IP");
        assert_eq!(format!("{}", Register::RA), "RA");
    }
}
