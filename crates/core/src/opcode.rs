//! Opcode definitions shared by the engine, the disassembler and the assembler.

use serde::{Deserialize, Serialize};

/// All VM opcodes.
///
/// The numbering is part of the wire format and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    NOP = 0x00,
    NEG = 0x01,

    // ALU (register / immediate pairs)
    ADDR = 0x02,
    ADDI = 0x03,
    MULR = 0x04,
    MULI = 0x05,
    ANDR = 0x06,
    ANDI = 0x07,
    ORR = 0x08,
    ORI = 0x09,
    XORR = 0x0A,
    XORI = 0x0B,
    SHRR = 0x0C,
    SHRI = 0x0D,
    NOT = 0x0E,

    // Memory
    LD = 0x0F,
    ST = 0x10,

    HLT = 0x11,

    // Data
    MOVR = 0x12,
    MOVI = 0x13,

    // Relative branches
    JEI = 0x14,
    JNI = 0x15,
    JGI = 0x16,
    JZI = 0x17,

    // Functions and stack
    CALL = 0x18,
    RET = 0x19,
    POP = 0x1A,
    PUSH = 0x1B,
    PUSI = 0x1C,

    // Special
    SYS = 0x1D,
    RAND = 0x1E,
}

/// Operand layout of an opcode.
///
/// `Rel` shapes carry an immediate that is relative to the next instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandShape {
    /// No operands.
    None,
    /// `dst`
    Reg,
    /// `dst, src`
    RegReg,
    /// `dst, src, third` where the third register lives in the low 3 bits of imm.
    RegRegReg,
    /// `imm`
    Imm,
    /// `target`
    Rel,
    /// `dst, imm`
    RegImm,
    /// `dst, src, imm`
    RegRegImm,
    /// `dst, target`
    RegRel,
    /// `dst, src, target`
    RegRegRel,
}

impl OperandShape {
    /// Whether the immediate is a branch offset rather than a value.
    pub fn is_relative(&self) -> bool {
        matches!(
            self,
            OperandShape::Rel | OperandShape::RegRel | OperandShape::RegRegRel
        )
    }

    /// Number of register operands written in source form.
    pub fn register_count(&self) -> usize {
        match self {
            OperandShape::None | OperandShape::Imm | OperandShape::Rel => 0,
            OperandShape::Reg | OperandShape::RegImm | OperandShape::RegRel => 1,
            OperandShape::RegReg | OperandShape::RegRegImm | OperandShape::RegRegRel => 2,
            OperandShape::RegRegReg => 3,
        }
    }

    /// Whether the shape ends with an immediate (value or target).
    pub fn has_immediate(&self) -> bool {
        matches!(
            self,
            OperandShape::Imm
                | OperandShape::Rel
                | OperandShape::RegImm
                | OperandShape::RegRegImm
                | OperandShape::RegRel
                | OperandShape::RegRegRel
        )
    }
}

impl Opcode {
    /// Every opcode in numeric order.
    pub const ALL: [Opcode; 31] = [
        Opcode::NOP,
        Opcode::NEG,
        Opcode::ADDR,
        Opcode::ADDI,
        Opcode::MULR,
        Opcode::MULI,
        Opcode::ANDR,
        Opcode::ANDI,
        Opcode::ORR,
        Opcode::ORI,
        Opcode::XORR,
        Opcode::XORI,
        Opcode::SHRR,
        Opcode::SHRI,
        Opcode::NOT,
        Opcode::LD,
        Opcode::ST,
        Opcode::HLT,
        Opcode::MOVR,
        Opcode::MOVI,
        Opcode::JEI,
        Opcode::JNI,
        Opcode::JGI,
        Opcode::JZI,
        Opcode::CALL,
        Opcode::RET,
        Opcode::POP,
        Opcode::PUSH,
        Opcode::PUSI,
        Opcode::SYS,
        Opcode::RAND,
    ];

    /// Parse a byte as an opcode.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Look up an opcode by its enum name (`ADDI`, `JEI`, ...), ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// The unique enum name.
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::NOP => "NOP",
            Opcode::NEG => "NEG",
            Opcode::ADDR => "ADDR",
            Opcode::ADDI => "ADDI",
            Opcode::MULR => "MULR",
            Opcode::MULI => "MULI",
            Opcode::ANDR => "ANDR",
            Opcode::ANDI => "ANDI",
            Opcode::ORR => "ORR",
            Opcode::ORI => "ORI",
            Opcode::XORR => "XORR",
            Opcode::XORI => "XORI",
            Opcode::SHRR => "SHRR",
            Opcode::SHRI => "SHRI",
            Opcode::NOT => "NOT",
            Opcode::LD => "LD",
            Opcode::ST => "ST",
            Opcode::HLT => "HLT",
            Opcode::MOVR => "MOVR",
            Opcode::MOVI => "MOVI",
            Opcode::JEI => "JEI",
            Opcode::JNI => "JNI",
            Opcode::JGI => "JGI",
            Opcode::JZI => "JZI",
            Opcode::CALL => "CALL",
            Opcode::RET => "RET",
            Opcode::POP => "POP",
            Opcode::PUSH => "PUSH",
            Opcode::PUSI => "PUSI",
            Opcode::SYS => "SYS",
            Opcode::RAND => "RAND",
        }
    }

    /// The mnemonic shown in disassembly. Register and immediate forms share one.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::ADDR | Opcode::ADDI => "ADD",
            Opcode::MULR | Opcode::MULI => "MUL",
            Opcode::ANDR | Opcode::ANDI => "AND",
            Opcode::ORR | Opcode::ORI => "OR",
            Opcode::XORR | Opcode::XORI => "XOR",
            Opcode::SHRR | Opcode::SHRI => "SHR",
            Opcode::MOVR | Opcode::MOVI => "MOV",
            Opcode::JEI => "JE",
            Opcode::JNI => "JN",
            Opcode::JGI => "JG",
            Opcode::JZI => "JZ",
            Opcode::PUSH | Opcode::PUSI => "PUSH",
            other => other.name(),
        }
    }

    /// Operand layout used by both execution and disassembly.
    pub fn shape(&self) -> OperandShape {
        match self {
            Opcode::NOP | Opcode::HLT | Opcode::RET | Opcode::SYS | Opcode::RAND => {
                OperandShape::None
            }

            Opcode::POP | Opcode::PUSH => OperandShape::Reg,

            Opcode::NEG | Opcode::NOT | Opcode::MOVR => OperandShape::RegReg,

            Opcode::ADDR
            | Opcode::MULR
            | Opcode::ANDR
            | Opcode::ORR
            | Opcode::XORR
            | Opcode::SHRR => OperandShape::RegRegReg,

            Opcode::PUSI => OperandShape::Imm,
            Opcode::CALL => OperandShape::Rel,
            Opcode::MOVI => OperandShape::RegImm,

            Opcode::ADDI
            | Opcode::MULI
            | Opcode::ANDI
            | Opcode::ORI
            | Opcode::XORI
            | Opcode::SHRI
            | Opcode::LD
            | Opcode::ST => OperandShape::RegRegImm,

            Opcode::JZI => OperandShape::RegRel,

            Opcode::JEI | Opcode::JNI | Opcode::JGI => OperandShape::RegRegRel,
        }
    }
}
