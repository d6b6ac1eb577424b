//! Disassembler.
//!
//! A pure function of `(address, instruction)`. Operand layout comes from
//! [`Opcode::shape`], the same table the engine dispatches on, and relative
//! operands are printed as the absolute target `address + imm + 4`.

use thiserror::Error;
use zzvm_core::{
    Instruction, InstructionError, Opcode, OperandShape, RawInstruction, Register,
    INSTRUCTION_SIZE,
};

/// Text emitted in place of an instruction that cannot be decoded.
pub const PLACEHOLDER: &str = "(bad)";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisasmError {
    #[error("invalid register index {0}")]
    InvalidRegister(u8),

    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),
}

impl From<InstructionError> for DisasmError {
    fn from(err: InstructionError) -> Self {
        match err {
            InstructionError::InvalidRegister(index) => DisasmError::InvalidRegister(index),
            InstructionError::UnknownOpcode(byte) => DisasmError::UnknownOpcode(byte),
        }
    }
}

/// Render one instruction located at `address`.
pub fn disassemble(address: u16, raw: RawInstruction) -> Result<String, DisasmError> {
    let ins = Instruction::decode(raw)?;
    let Instruction { opcode, dst, src, imm } = ins;
    let target = raw.relative_target(address);
    let name = opcode.mnemonic();

    let line = match opcode.shape() {
        OperandShape::None => name.to_string(),
        OperandShape::Reg => format!("{:<5} {}", name, dst),
        OperandShape::RegReg => format!("{:<5} {}, {}", name, dst, src),
        OperandShape::RegRegReg => format!("{:<5} {}, {}, {}", name, dst, src, ins.third()),
        OperandShape::Imm => format!("{:<5} 0x{:04x}", name, imm),
        OperandShape::Rel => format!("{:<5} 0x{:04x}", name, target),
        OperandShape::RegImm => format!("{:<5} {}, 0x{:04x}", name, dst, imm),
        OperandShape::RegRegImm if is_jump(&ins) => format!("{:<5} 0x{:04x}", "JMP", target),
        OperandShape::RegRegImm => format!("{:<5} {}, {}, 0x{:04x}", name, dst, src, imm),
        OperandShape::RegRel => format!("{:<5} {}, 0x{:04x}", name, dst, target),
        OperandShape::RegRegRel => format!("{:<5} {}, {}, 0x{:04x}", name, dst, src, target),
    };
    Ok(line)
}

/// `ADDI IP, IP, rel` is the unconditional jump.
fn is_jump(ins: &Instruction) -> bool {
    ins.opcode == Opcode::ADDI && ins.dst == Register::IP && ins.src == Register::IP
}

/// Disassemble consecutive instructions starting at `base`. Undecodable
/// slots render as [`PLACEHOLDER`]; a trailing partial instruction is skipped.
pub fn disassemble_range(base: u16, bytes: &[u8]) -> Vec<(u16, String)> {
    bytes
        .chunks_exact(INSTRUCTION_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            let address = base.wrapping_add((i * INSTRUCTION_SIZE) as u16);
            let raw = RawInstruction::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let text = disassemble(address, raw).unwrap_or_else(|_| PLACEHOLDER.to_string());
            (address, text)
        })
        .collect()
}
