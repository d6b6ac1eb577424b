//! Fixed-width instruction encoding.
//!
//! Every instruction is exactly four bytes on the wire:
//!
//! ```text
//! +--------+-----------+-----------------+
//! | opcode | dst | src |  imm (u16, LE)  |
//! +--------+-----------+-----------------+
//!    u8      4b    4b        2 bytes
//! ```
//!
//! [`RawInstruction`] is the wire form and round-trips any four bytes.
//! [`Instruction`] is the validated form the engine dispatches on.

use crate::opcode::{Opcode, OperandShape};
use crate::register::Register;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of one encoded instruction in bytes.
pub const INSTRUCTION_SIZE: usize = 4;

/// Errors produced while validating a raw instruction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionError {
    #[error("invalid register index: {0}")]
    InvalidRegister(u8),

    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
}

/// An undecoded instruction exactly as stored in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RawInstruction {
    pub opcode: u8,
    /// Packed register byte: `dst << 4 | src`.
    pub reg: u8,
    pub imm: u16,
}

impl RawInstruction {
    /// Pack an instruction from its parts. Register fields are truncated to 4 bits.
    pub fn new(opcode: Opcode, dst: Register, src: Register, imm: u16) -> Self {
        Self {
            opcode: opcode.to_byte(),
            reg: ((dst as u8) << 4) | (src as u8),
            imm,
        }
    }

    pub fn from_bytes(bytes: [u8; INSTRUCTION_SIZE]) -> Self {
        Self {
            opcode: bytes[0],
            reg: bytes[1],
            imm: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; INSTRUCTION_SIZE] {
        let imm = self.imm.to_le_bytes();
        [self.opcode, self.reg, imm[0], imm[1]]
    }

    /// High nibble of the register byte.
    pub fn dst(&self) -> u8 {
        self.reg >> 4
    }

    /// Low nibble of the register byte.
    pub fn src(&self) -> u8 {
        self.reg & 0x0F
    }

    /// Third register selected by the low 3 bits of the immediate.
    pub fn third(&self) -> u8 {
        (self.imm & 0x07) as u8
    }

    pub fn imm_signed(&self) -> i16 {
        self.imm as i16
    }

    /// Resolve a relative immediate against the address of this instruction.
    ///
    /// Offsets are relative to the next instruction.
    pub fn relative_target(&self, address: u16) -> u16 {
        address
            .wrapping_add(self.imm)
            .wrapping_add(INSTRUCTION_SIZE as u16)
    }
}

/// Encode a slice of instructions into contiguous bytes.
pub fn encode_program(program: &[RawInstruction]) -> Vec<u8> {
    program.iter().flat_map(|ins| ins.to_bytes()).collect()
}

/// A validated instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dst: Register,
    pub src: Register,
    pub imm: u16,
}

impl Instruction {
    /// Validate a raw instruction.
    ///
    /// Register fields are checked before the opcode, so an instruction with
    /// both a bad register and a bad opcode reports the register.
    pub fn decode(raw: RawInstruction) -> Result<Self, InstructionError> {
        let dst = Register::from_index(raw.dst())
            .ok_or(InstructionError::InvalidRegister(raw.dst()))?;
        let src = Register::from_index(raw.src())
            .ok_or(InstructionError::InvalidRegister(raw.src()))?;
        let opcode =
            Opcode::from_byte(raw.opcode).ok_or(InstructionError::UnknownOpcode(raw.opcode))?;

        Ok(Self {
            opcode,
            dst,
            src,
            imm: raw.imm,
        })
    }

    pub fn new(opcode: Opcode, dst: Register, src: Register, imm: u16) -> Self {
        Self {
            opcode,
            dst,
            src,
            imm,
        }
    }

    /// Third register operand of `RegRegReg` opcodes.
    pub fn third(&self) -> Register {
        Register::ALL[(self.imm & 0x07) as usize]
    }

    pub fn imm_signed(&self) -> i16 {
        self.imm as i16
    }

    pub fn shape(&self) -> OperandShape {
        self.opcode.shape()
    }

    pub fn encode(&self) -> RawInstruction {
        RawInstruction::new(self.opcode, self.dst, self.src, self.imm)
    }
}

impl From<Instruction> for RawInstruction {
    fn from(ins: Instruction) -> Self {
        ins.encode()
    }
}

impl TryFrom<RawInstruction> for Instruction {
    type Error = InstructionError;

    fn try_from(raw: RawInstruction) -> Result<Self, Self::Error> {
        Instruction::decode(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        let raw = RawInstruction::new(Opcode::MOVI, Register::R1, Register::RA, 0x1234);
        assert_eq!(raw.to_bytes(), [0x13, 0x10, 0x34, 0x12]);
        assert_eq!(RawInstruction::from_bytes([0x13, 0x10, 0x34, 0x12]), raw);
    }

    #[test]
    fn test_register_fields() {
        let raw = RawInstruction {
            opcode: Opcode::ADDR as u8,
            reg: 0x31,
            imm: 0xFFFA,
        };
        assert_eq!(raw.dst(), 3);
        assert_eq!(raw.src(), 1);
        assert_eq!(raw.third(), 2);
        assert_eq!(raw.imm_signed(), -6);
    }

    #[test]
    fn test_decode_rejects_high_registers() {
        let raw = RawInstruction {
            opcode: Opcode::NOP as u8,
            reg: 0x80,
            imm: 0,
        };
        assert_eq!(
            Instruction::decode(raw),
            Err(InstructionError::InvalidRegister(8))
        );

        let raw = RawInstruction {
            opcode: Opcode::NOP as u8,
            reg: 0x0F,
            imm: 0,
        };
        assert_eq!(
            Instruction::decode(raw),
            Err(InstructionError::InvalidRegister(15))
        );
    }

    #[test]
    fn test_decode_checks_registers_before_opcode() {
        let raw = RawInstruction {
            opcode: 0xEE,
            reg: 0x90,
            imm: 0,
        };
        assert_eq!(
            Instruction::decode(raw),
            Err(InstructionError::InvalidRegister(9))
        );

        let raw = RawInstruction {
            opcode: 0xEE,
            reg: 0x00,
            imm: 0,
        };
        assert_eq!(
            Instruction::decode(raw),
            Err(InstructionError::UnknownOpcode(0xEE))
        );
    }

    #[test]
    fn test_relative_target() {
        let raw = RawInstruction::new(Opcode::JNI, Register::R2, Register::RA, (-16i16) as u16);
        assert_eq!(raw.relative_target(0x4040), 0x4034);

        let jmp = RawInstruction::new(Opcode::ADDI, Register::IP, Register::IP, 4);
        assert_eq!(jmp.relative_target(0x4020), 0x4028);
    }

    #[test]
    fn test_encode_program() {
        let program = [
            RawInstruction::new(Opcode::MOVI, Register::R1, Register::RA, 0x1234),
            RawInstruction::new(Opcode::HLT, Register::RA, Register::RA, 0),
        ];
        assert_eq!(
            encode_program(&program),
            vec![0x13, 0x10, 0x34, 0x12, 0x11, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_third_register() {
        let ins = Instruction::new(Opcode::SHRR, Register::RA, Register::RA, 0xFFF3);
        assert_eq!(ins.third(), Register::R3);
    }
}
