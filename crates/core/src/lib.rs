//! Shared definitions for zzvm.
//!
//! This crate holds the definitions shared by the engine, the disassembler
//! and the toolchain:
//! - Fixed-width instruction encoding and the closed opcode table
//! - Register names
//! - The bit-letter codec
//! - The executable image format

pub mod image;
pub mod instruction;
pub mod opcode;
pub mod register;
pub mod zzcode;

// Re-export commonly used types at the crate root
pub use image::{
    Image, ImageError, ImageHeader, Section, SectionHeader, IMAGE_MAGIC, IMAGE_VERSION, MEM_LIMIT,
};
pub use instruction::{
    encode_program, Instruction, InstructionError, RawInstruction, INSTRUCTION_SIZE,
};
pub use opcode::{Opcode, OperandShape};
pub use register::{Register, NUM_REGISTERS};
pub use zzcode::CodecError;
