//! Emit an image from the AST.
//!
//! Two-pass compilation:
//! 1. First pass: lay out sections and collect label addresses
//! 2. Second pass: emit bytes with resolved labels

use crate::parser::{Directive, Instruction, Mnemonic, Operand, Program, Statement};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use zzvm_core::image::check_bounds;
use zzvm_core::{Image, Opcode, RawInstruction, Register, Section, INSTRUCTION_SIZE};

/// Default address of the `TEXT` section.
pub const TEXT_BASE: u16 = 0x4000;
/// Default address of every other section.
pub const DATA_BASE: u16 = 0x6000;
/// Entry point when neither `.entry` nor a `start` label is present.
pub const DEFAULT_ENTRY: u16 = 0x4000;

/// Compiler errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("undefined label at line {line}: {label}")]
    UndefinedLabel { label: String, line: usize },

    #[error("duplicate label '{label}' at line {line} (first defined at line {first_line})")]
    DuplicateLabel {
        label: String,
        line: usize,
        first_line: usize,
    },

    #[error("duplicate section '{name}' at line {line}")]
    DuplicateSection { name: String, line: usize },

    #[error("line {line}: {instruction} expects {expected}")]
    OperandMismatch {
        instruction: String,
        expected: String,
        line: usize,
    },

    #[error("line {line}: no section is open")]
    NoSection { line: usize },

    #[error("line {line}: value {value} does not fit in 16 bits")]
    ImmediateOutOfRange { value: i64, line: usize },

    #[error("line {line}: invalid size {value}")]
    InvalidSize { value: i64, line: usize },

    #[error("section '{name}' at 0x{address:04x} with length {length} exceeds memory")]
    SectionOverflow {
        name: String,
        address: u16,
        length: usize,
    },
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Layout,
    Emit,
}

/// A section being filled.
#[derive(Debug)]
struct SectionBuf {
    name: String,
    address: u16,
    data: Vec<u8>,
    alignment: usize,
}

impl SectionBuf {
    fn new(name: String, address: u16) -> Self {
        Self {
            name,
            address,
            data: Vec::new(),
            alignment: 1,
        }
    }

    fn position(&self) -> u16 {
        self.address.wrapping_add(self.data.len() as u16)
    }

    /// Append bytes, then pad to the current alignment.
    fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.pad();
    }

    fn pad(&mut self) {
        let rem = self.data.len() % self.alignment;
        if rem > 0 {
            let len = self.data.len() + self.alignment - rem;
            self.data.resize(len, 0);
        }
    }
}

/// Compiler state
pub struct Compiler {
    /// Symbol table: label name → (address, line)
    symbol_table: HashMap<String, (u16, usize)>,
}

impl Compiler {
    /// Create a new compiler
    pub fn new() -> Self {
        Self {
            symbol_table: HashMap::new(),
        }
    }

    /// Compile a program to an image
    pub fn compile(program: &Program) -> Result<Image> {
        let mut compiler = Self::new();

        compiler.first_pass(program)?;
        compiler.second_pass(program)
    }

    /// Address of a label, once the first pass has run.
    pub fn label(&self, name: &str) -> Option<u16> {
        self.symbol_table.get(name).map(|&(address, _)| address)
    }

    /// First pass: build symbol table
    fn first_pass(&mut self, program: &Program) -> Result<()> {
        self.walk(program, Pass::Layout)?;
        debug!("collected {} labels", self.symbol_table.len());
        Ok(())
    }

    /// Second pass: emit sections and pick the entry point
    fn second_pass(&mut self, program: &Program) -> Result<Image> {
        let sections = self.walk(program, Pass::Emit)?;

        let entry = match &program.entry_point {
            Some(target) => self.absolute(target, 0)?,
            None => self.label("start").unwrap_or(DEFAULT_ENTRY),
        };

        let mut image = Image::new(entry);
        for section in sections {
            if !check_bounds(section.address, section.data.len()) {
                return Err(CompileError::SectionOverflow {
                    name: section.name,
                    address: section.address,
                    length: section.data.len(),
                });
            }
            debug!(
                "section {} at 0x{:04x}: {} bytes",
                section.name,
                section.address,
                section.data.len()
            );
            image
                .sections
                .push(Section::new(section.address, section.data));
        }
        Ok(image)
    }

    fn walk(&mut self, program: &Program, pass: Pass) -> Result<Vec<SectionBuf>> {
        let mut sections: Vec<SectionBuf> = Vec::new();

        for (statement, line) in &program.statements {
            let line = *line;
            match statement {
                Statement::Directive(Directive::Sect { name, address }) => {
                    if sections.iter().any(|s| &s.name == name) {
                        return Err(CompileError::DuplicateSection {
                            name: name.clone(),
                            line,
                        });
                    }
                    let default = if name == "TEXT" { TEXT_BASE } else { DATA_BASE };
                    sections.push(SectionBuf::new(name.clone(), address.unwrap_or(default)));
                }
                Statement::Directive(Directive::Entry(_)) => {}
                Statement::Directive(Directive::Align(n)) => {
                    if *n == 0 {
                        return Err(CompileError::InvalidSize { value: *n, line });
                    }
                    let alignment = size(*n, line)?;
                    let section = current(&mut sections, line)?;
                    section.alignment = alignment;
                    section.pad();
                }
                Statement::Directive(Directive::Db(bytes)) => {
                    current(&mut sections, line)?.write(bytes);
                }
                Statement::Directive(Directive::Zero(n)) => {
                    let n = size(*n, line)?;
                    current(&mut sections, line)?.write(&vec![0u8; n]);
                }
                Statement::Directive(Directive::Str(bytes)) => {
                    let section = current(&mut sections, line)?;
                    let mut data = bytes.clone();
                    data.extend_from_slice(&[0, 0]);
                    section.write(&data);
                }
                Statement::Label(name) => {
                    let section = current(&mut sections, line)?;
                    if pass == Pass::Layout {
                        if let Some(&(_, first_line)) = self.symbol_table.get(name) {
                            return Err(CompileError::DuplicateLabel {
                                label: name.clone(),
                                line,
                                first_line,
                            });
                        }
                        self.symbol_table
                            .insert(name.clone(), (section.position(), line));
                    }
                }
                Statement::Instruction(inst) => {
                    let section = current(&mut sections, line)?;
                    let raw = match pass {
                        Pass::Layout => RawInstruction::default(),
                        Pass::Emit => self.encode(inst, section.position(), line)?,
                    };
                    section.write(&raw.to_bytes());
                }
            }
        }

        Ok(sections)
    }

    /// Encode one instruction placed at `address`.
    fn encode(&self, inst: &Instruction, address: u16, line: usize) -> Result<RawInstruction> {
        let opcode = match inst.mnemonic {
            Mnemonic::Jmp => {
                let [target] = inst.operands.as_slice() else {
                    return Err(mismatch("JMP", "a target", line));
                };
                let imm = self.relative(target, address, line)?;
                return Ok(RawInstruction::new(
                    Opcode::ADDI,
                    Register::IP,
                    Register::IP,
                    imm,
                ));
            }
            Mnemonic::Op(opcode) => opcode,
        };

        let shape = opcode.shape();
        let reg_count = shape.register_count();
        let expected = reg_count + shape.has_immediate() as usize;
        let expected_text = || describe_shape(reg_count, shape.has_immediate());

        if inst.operands.len() != expected {
            return Err(mismatch(opcode.name(), &expected_text(), line));
        }

        let mut regs = Vec::with_capacity(reg_count);
        for operand in &inst.operands[..reg_count] {
            match operand {
                Operand::Register(r) => regs.push(*r),
                _ => return Err(mismatch(opcode.name(), &expected_text(), line)),
            }
        }

        let dst = regs.first().copied().unwrap_or(Register::RA);
        let src = regs.get(1).copied().unwrap_or(Register::RA);

        let imm = if let Some(third) = regs.get(2) {
            third.index() as u16
        } else if shape.has_immediate() {
            let operand = &inst.operands[reg_count];
            if shape.is_relative() {
                self.relative(operand, address, line)?
            } else {
                self.absolute(operand, line)?
            }
        } else {
            0
        };

        Ok(RawInstruction::new(opcode, dst, src, imm))
    }

    /// Value operand. Symbols resolve to their address.
    fn absolute(&self, operand: &Operand, line: usize) -> Result<u16> {
        match operand {
            Operand::Number(n) => immediate(*n, line),
            Operand::Symbol { name, offset } => {
                let offset = immediate(*offset, line)?;
                Ok(self.resolve(name, line)?.wrapping_add(offset))
            }
            Operand::Register(_) => Err(mismatch("operand", "a number or $symbol", line)),
        }
    }

    /// Branch operand. Symbols resolve relative to the next instruction,
    /// numbers are taken as the raw offset.
    fn relative(&self, operand: &Operand, address: u16, line: usize) -> Result<u16> {
        match operand {
            Operand::Symbol { .. } => {
                let target = self.absolute(operand, line)?;
                Ok(target
                    .wrapping_sub(INSTRUCTION_SIZE as u16)
                    .wrapping_sub(address))
            }
            _ => self.absolute(operand, line),
        }
    }

    fn resolve(&self, name: &str, line: usize) -> Result<u16> {
        self.label(name).ok_or_else(|| CompileError::UndefinedLabel {
            label: name.to_string(),
            line,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn current(sections: &mut [SectionBuf], line: usize) -> Result<&mut SectionBuf> {
    sections.last_mut().ok_or(CompileError::NoSection { line })
}

/// Accept anything representable in 16 bits, signed or unsigned.
fn immediate(value: i64, line: usize) -> Result<u16> {
    if (i16::MIN as i64..=u16::MAX as i64).contains(&value) {
        Ok(value as u16)
    } else {
        Err(CompileError::ImmediateOutOfRange { value, line })
    }
}

fn size(value: i64, line: usize) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&n| n <= u16::MAX as usize)
        .ok_or(CompileError::InvalidSize { value, line })
}

fn mismatch(instruction: &str, expected: &str, line: usize) -> CompileError {
    CompileError::OperandMismatch {
        instruction: instruction.to_string(),
        expected: expected.to_string(),
        line,
    }
}

fn describe_shape(registers: usize, immediate: bool) -> String {
    match (registers, immediate) {
        (0, false) => "no operands".to_string(),
        (0, true) => "a value".to_string(),
        (n, false) => format!("{} registers", n),
        (n, true) => format!("{} register(s) and a value", n),
    }
}
